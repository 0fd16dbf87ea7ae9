//! Lowers the oxc AST of a transpiled unit into the owned [`crate::ir`] tree.
//!
//! Anything outside the interpreter's language subset is reported as
//! [`ExecutionError::Unsupported`] naming the construct.

use oxc_ast::ast::*;
use oxc_span::GetSpan;
use std::cell::Cell;
use std::rc::Rc;

use crate::error::ExecutionError;
use crate::interpreter::with_stack;
use crate::ir::{
    self, DeclKind, Expr, ForHead, ForInit, FunctionBody as IrBody, FunctionDef, ListItem,
    Literal, MemberProp, ObjectItem, Pattern, PropKey, Stmt, VarDecl,
};
use crate::regexp::CompiledRegExp;
use crate::value::format_number;

type LowerResult<T> = Result<T, ExecutionError>;

pub fn lower_program(program: &Program<'_>, max_depth: usize) -> LowerResult<Vec<Stmt>> {
    let lowerer = Lowerer {
        depth: Cell::new(0),
        max_depth,
    };
    lowerer.lower_statements(&program.body)
}

struct Lowerer {
    depth: Cell<usize>,
    max_depth: usize,
}

impl Lowerer {
    /// Lowers one level of nesting, failing once `max_depth` is exceeded.
    fn nested<T>(&self, f: impl FnOnce() -> LowerResult<T>) -> LowerResult<T> {
        let depth = self.depth.get() + 1;
        if depth > self.max_depth {
            return Err(ExecutionError::TooDeep {
                limit: self.max_depth,
            });
        }
        self.depth.set(depth);
        let result = with_stack(f);
        self.depth.set(depth - 1);
        result
    }

    fn lower_statements(&self, stmts: &[Statement<'_>]) -> LowerResult<Vec<Stmt>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            if let Some(lowered) = self.lower_statement(stmt)? {
                out.push(lowered);
            }
        }
        Ok(out)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Statements
    // ───────────────────────────────────────────────────────────────────────────

    fn lower_statement(&self, stmt: &Statement<'_>) -> LowerResult<Option<Stmt>> {
        self.nested(|| self.statement(stmt))
    }

    fn statement(&self, stmt: &Statement<'_>) -> LowerResult<Option<Stmt>> {
        let lowered = match stmt {
            Statement::ExpressionStatement(s) => Stmt::Expr(self.lower_expression(&s.expression)?),
            Statement::VariableDeclaration(decl) => Stmt::VarDecl(self.lower_var_decl(decl)?),
            Statement::FunctionDeclaration(func) => {
                if func.body.is_none() {
                    // Overload signature or `declare function`.
                    return Ok(None);
                }
                Stmt::FunctionDecl(self.lower_function(func)?)
            }
            Statement::ReturnStatement(s) => Stmt::Return(match &s.argument {
                Some(arg) => Some(self.lower_expression(arg)?),
                None => None,
            }),
            Statement::IfStatement(s) => Stmt::If {
                test: self.lower_expression(&s.test)?,
                consequent: Box::new(self.lower_required(&s.consequent)?),
                alternate: match &s.alternate {
                    Some(alt) => Some(Box::new(self.lower_required(alt)?)),
                    None => None,
                },
            },
            Statement::BlockStatement(block) => Stmt::Block(self.lower_statements(&block.body)?),
            Statement::ForStatement(s) => Stmt::For {
                init: match &s.init {
                    None => None,
                    Some(ForStatementInit::VariableDeclaration(decl)) => {
                        Some(ForInit::VarDecl(self.lower_var_decl(decl)?))
                    }
                    Some(init) => match init.as_expression() {
                        Some(expr) => Some(ForInit::Expr(self.lower_expression(expr)?)),
                        None => return Err(ExecutionError::unsupported("for-loop initializer")),
                    },
                },
                test: s.test.as_ref().map(|e| self.lower_expression(e)).transpose()?,
                update: s.update.as_ref().map(|e| self.lower_expression(e)).transpose()?,
                body: Box::new(self.lower_required(&s.body)?),
            },
            Statement::ForOfStatement(s) => {
                if s.r#await {
                    return Err(ExecutionError::unsupported("for await"));
                }
                Stmt::ForOf {
                    head: self.lower_for_head(&s.left)?,
                    right: self.lower_expression(&s.right)?,
                    body: Box::new(self.lower_required(&s.body)?),
                }
            }
            Statement::ForInStatement(s) => Stmt::ForIn {
                head: self.lower_for_head(&s.left)?,
                right: self.lower_expression(&s.right)?,
                body: Box::new(self.lower_required(&s.body)?),
            },
            Statement::WhileStatement(s) => Stmt::While {
                test: self.lower_expression(&s.test)?,
                body: Box::new(self.lower_required(&s.body)?),
            },
            Statement::DoWhileStatement(s) => Stmt::DoWhile {
                body: Box::new(self.lower_required(&s.body)?),
                test: self.lower_expression(&s.test)?,
            },
            Statement::BreakStatement(s) => {
                if s.label.is_some() {
                    return Err(ExecutionError::unsupported("labeled break"));
                }
                Stmt::Break
            }
            Statement::ContinueStatement(s) => {
                if s.label.is_some() {
                    return Err(ExecutionError::unsupported("labeled continue"));
                }
                Stmt::Continue
            }
            Statement::ThrowStatement(s) => Stmt::Throw(self.lower_expression(&s.argument)?),
            Statement::TryStatement(s) => {
                let (param, handler) = match &s.handler {
                    Some(clause) => (
                        match &clause.param {
                            Some(p) => Some(self.lower_binding_pattern(&p.pattern)?),
                            None => None,
                        },
                        Some(self.lower_statements(&clause.body.body)?),
                    ),
                    None => (None, None),
                };
                Stmt::Try {
                    block: self.lower_statements(&s.block.body)?,
                    param,
                    handler,
                    finalizer: match &s.finalizer {
                        Some(f) => Some(self.lower_statements(&f.body)?),
                        None => None,
                    },
                }
            }
            Statement::SwitchStatement(s) => {
                let mut cases = Vec::with_capacity(s.cases.len());
                for case in &s.cases {
                    cases.push(ir::SwitchCase {
                        test: case.test.as_ref().map(|e| self.lower_expression(e)).transpose()?,
                        body: self.lower_statements(&case.consequent)?,
                    });
                }
                Stmt::Switch {
                    discriminant: self.lower_expression(&s.discriminant)?,
                    cases,
                }
            }
            Statement::EmptyStatement(_) | Statement::DebuggerStatement(_) => Stmt::Empty,
            Statement::TSTypeAliasDeclaration(_)
            | Statement::TSInterfaceDeclaration(_)
            | Statement::TSModuleDeclaration(_) => return Ok(None),
            Statement::ClassDeclaration(_) => return Err(ExecutionError::unsupported("class")),
            Statement::LabeledStatement(_) => {
                return Err(ExecutionError::unsupported("labeled statement"))
            }
            Statement::WithStatement(_) => return Err(ExecutionError::unsupported("with")),
            Statement::ImportDeclaration(_) => {
                return Err(ExecutionError::unsupported("import declaration"))
            }
            Statement::ExportAllDeclaration(_)
            | Statement::ExportDefaultDeclaration(_)
            | Statement::ExportNamedDeclaration(_) => {
                return Err(ExecutionError::unsupported("export declaration"))
            }
            _ => return Err(ExecutionError::unsupported("TypeScript-only statement")),
        };
        Ok(Some(lowered))
    }

    fn lower_required(&self, stmt: &Statement<'_>) -> LowerResult<Stmt> {
        Ok(self.lower_statement(stmt)?.unwrap_or(Stmt::Empty))
    }

    fn lower_var_decl(&self, decl: &VariableDeclaration<'_>) -> LowerResult<VarDecl> {
        let mut declarators = Vec::with_capacity(decl.declarations.len());
        for d in &decl.declarations {
            let pattern = self.lower_binding_pattern(&d.id)?;
            let init = match &d.init {
                Some(init) => Some(name_anonymous(self.lower_expression(init)?, &pattern)),
                None => None,
            };
            declarators.push((pattern, init));
        }
        Ok(VarDecl {
            kind: decl_kind(decl.kind)?,
            declarators,
        })
    }

    fn lower_for_head(&self, left: &ForStatementLeft<'_>) -> LowerResult<ForHead> {
        match left {
            ForStatementLeft::VariableDeclaration(decl) => {
                let first = decl
                    .declarations
                    .first()
                    .ok_or_else(|| ExecutionError::unsupported("empty loop declaration"))?;
                Ok(ForHead::Decl {
                    kind: decl_kind(decl.kind)?,
                    pattern: self.lower_binding_pattern(&first.id)?,
                })
            }
            other => match other.as_assignment_target() {
                Some(target) => Ok(ForHead::Target(self.lower_assignment_target(target)?)),
                None => Err(ExecutionError::unsupported("loop head")),
            },
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Functions & patterns
    // ───────────────────────────────────────────────────────────────────────────

    fn lower_function(&self, func: &Function<'_>) -> LowerResult<Rc<FunctionDef>> {
        if func.generator {
            return Err(ExecutionError::unsupported("generator function"));
        }
        if func.r#async {
            return Err(ExecutionError::unsupported("async function"));
        }
        let (params, rest) = self.lower_params(&func.params)?;
        let body = match &func.body {
            Some(body) => self.lower_statements(&body.statements)?,
            None => Vec::new(),
        };
        Ok(Rc::new(FunctionDef {
            name: func.id.as_ref().map(|id| id.name.to_string()),
            params,
            rest,
            body: IrBody::Block(body),
            is_arrow: false,
        }))
    }

    fn lower_arrow(&self, arrow: &ArrowFunctionExpression<'_>) -> LowerResult<Rc<FunctionDef>> {
        if arrow.r#async {
            return Err(ExecutionError::unsupported("async arrow function"));
        }
        let (params, rest) = self.lower_params(&arrow.params)?;
        let body = if arrow.expression {
            match arrow.body.statements.first() {
                Some(Statement::ExpressionStatement(s)) => {
                    IrBody::Expr(Box::new(self.lower_expression(&s.expression)?))
                }
                _ => IrBody::Block(self.lower_statements(&arrow.body.statements)?),
            }
        } else {
            IrBody::Block(self.lower_statements(&arrow.body.statements)?)
        };
        Ok(Rc::new(FunctionDef {
            name: None,
            params,
            rest,
            body,
            is_arrow: true,
        }))
    }

    fn lower_params(
        &self,
        params: &FormalParameters<'_>,
    ) -> LowerResult<(Vec<Pattern>, Option<Pattern>)> {
        let mut out = Vec::with_capacity(params.items.len());
        for param in &params.items {
            let mut pattern = self.lower_binding_pattern(&param.pattern)?;
            if let Some(init) = &param.initializer {
                pattern = Pattern::Default {
                    target: Box::new(pattern),
                    default: self.lower_expression(init)?,
                };
            }
            out.push(pattern);
        }
        let rest = match &params.rest {
            Some(rest) => Some(self.lower_binding_pattern(&rest.rest.argument)?),
            None => None,
        };
        Ok((out, rest))
    }

    fn lower_binding_pattern(&self, pattern: &BindingPattern<'_>) -> LowerResult<Pattern> {
        self.nested(|| self.binding_pattern(pattern))
    }

    fn binding_pattern(&self, pattern: &BindingPattern<'_>) -> LowerResult<Pattern> {
        Ok(match pattern {
            BindingPattern::BindingIdentifier(id) => Pattern::Ident(id.name.to_string()),
            BindingPattern::ObjectPattern(obj) => {
                let mut props = Vec::with_capacity(obj.properties.len());
                for prop in &obj.properties {
                    props.push((
                        self.lower_property_key(&prop.key, prop.computed)?,
                        self.lower_binding_pattern(&prop.value)?,
                    ));
                }
                Pattern::Object {
                    props,
                    rest: match &obj.rest {
                        Some(r) => Some(Box::new(self.lower_binding_pattern(&r.argument)?)),
                        None => None,
                    },
                }
            }
            BindingPattern::ArrayPattern(arr) => {
                let mut elements = Vec::with_capacity(arr.elements.len());
                for el in &arr.elements {
                    elements.push(match el {
                        Some(p) => Some(self.lower_binding_pattern(p)?),
                        None => None,
                    });
                }
                Pattern::Array {
                    elements,
                    rest: match &arr.rest {
                        Some(r) => Some(Box::new(self.lower_binding_pattern(&r.argument)?)),
                        None => None,
                    },
                }
            }
            BindingPattern::AssignmentPattern(assign) => Pattern::Default {
                target: Box::new(self.lower_binding_pattern(&assign.left)?),
                default: self.lower_expression(&assign.right)?,
            },
        })
    }

    fn lower_assignment_target(&self, target: &AssignmentTarget<'_>) -> LowerResult<Pattern> {
        self.nested(|| self.assignment_target(target))
    }

    fn assignment_target(&self, target: &AssignmentTarget<'_>) -> LowerResult<Pattern> {
        if let Some(simple) = target.as_simple_assignment_target() {
            return self.lower_simple_target(simple);
        }
        match target {
            AssignmentTarget::ArrayAssignmentTarget(arr) => {
                let mut elements = Vec::with_capacity(arr.elements.len());
                for el in &arr.elements {
                    elements.push(match el {
                        Some(el) => Some(self.lower_target_maybe_default(el)?),
                        None => None,
                    });
                }
                Ok(Pattern::Array {
                    elements,
                    rest: match &arr.rest {
                        Some(r) => Some(Box::new(self.lower_assignment_target(&r.target)?)),
                        None => None,
                    },
                })
            }
            AssignmentTarget::ObjectAssignmentTarget(obj) => {
                let mut props = Vec::with_capacity(obj.properties.len());
                for prop in &obj.properties {
                    match prop {
                        AssignmentTargetProperty::AssignmentTargetPropertyIdentifier(p) => {
                            let name = p.binding.name.to_string();
                            let mut pattern = Pattern::Ident(name.clone());
                            if let Some(init) = &p.init {
                                pattern = Pattern::Default {
                                    target: Box::new(pattern),
                                    default: self.lower_expression(init)?,
                                };
                            }
                            props.push((PropKey::Static(name), pattern));
                        }
                        AssignmentTargetProperty::AssignmentTargetPropertyProperty(p) => {
                            props.push((
                                self.lower_property_key(&p.name, p.computed)?,
                                self.lower_target_maybe_default(&p.binding)?,
                            ));
                        }
                    }
                }
                Ok(Pattern::Object {
                    props,
                    rest: match &obj.rest {
                        Some(r) => Some(Box::new(self.lower_assignment_target(&r.target)?)),
                        None => None,
                    },
                })
            }
            _ => Err(ExecutionError::unsupported("assignment target")),
        }
    }

    fn lower_target_maybe_default(
        &self,
        target: &AssignmentTargetMaybeDefault<'_>,
    ) -> LowerResult<Pattern> {
        match target {
            AssignmentTargetMaybeDefault::AssignmentTargetWithDefault(d) => Ok(Pattern::Default {
                target: Box::new(self.lower_assignment_target(&d.binding)?),
                default: self.lower_expression(&d.init)?,
            }),
            other => match other.as_assignment_target() {
                Some(t) => self.lower_assignment_target(t),
                None => Err(ExecutionError::unsupported("assignment target")),
            },
        }
    }

    fn lower_simple_target(&self, target: &SimpleAssignmentTarget<'_>) -> LowerResult<Pattern> {
        match target {
            SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => {
                Ok(Pattern::Ident(id.name.to_string()))
            }
            SimpleAssignmentTarget::StaticMemberExpression(m) => Ok(Pattern::Member {
                object: Box::new(self.lower_expression(&m.object)?),
                property: MemberProp::Static(m.property.name.to_string()),
            }),
            SimpleAssignmentTarget::ComputedMemberExpression(m) => Ok(Pattern::Member {
                object: Box::new(self.lower_expression(&m.object)?),
                property: MemberProp::Computed(Box::new(self.lower_expression(&m.expression)?)),
            }),
            _ => Err(ExecutionError::unsupported("assignment target")),
        }
    }

    fn lower_property_key(&self, key: &PropertyKey<'_>, computed: bool) -> LowerResult<PropKey> {
        match key {
            PropertyKey::StaticIdentifier(id) => Ok(PropKey::Static(id.name.to_string())),
            PropertyKey::PrivateIdentifier(_) => Err(ExecutionError::unsupported("private field")),
            other => {
                let expr = other
                    .as_expression()
                    .ok_or_else(|| ExecutionError::unsupported("property key"))?;
                if !computed {
                    match expr {
                        Expression::StringLiteral(s) => return Ok(PropKey::Static(s.value.to_string())),
                        Expression::NumericLiteral(n) => {
                            return Ok(PropKey::Static(format_number(n.value)))
                        }
                        _ => {}
                    }
                }
                Ok(PropKey::Computed(self.lower_expression(expr)?))
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Expressions
    // ───────────────────────────────────────────────────────────────────────────

    fn lower_list(&self, items: &[Argument<'_>]) -> LowerResult<Vec<ListItem>> {
        let mut out = Vec::with_capacity(items.len());
        for arg in items {
            out.push(match arg {
                Argument::SpreadElement(s) => ListItem::Spread(self.lower_expression(&s.argument)?),
                other => match other.as_expression() {
                    Some(e) => ListItem::Item(self.lower_expression(e)?),
                    None => return Err(ExecutionError::unsupported("call argument")),
                },
            });
        }
        Ok(out)
    }

    fn boxed(&self, expr: &Expression<'_>) -> LowerResult<Box<Expr>> {
        Ok(Box::new(self.lower_expression(expr)?))
    }

    fn lower_expression(&self, expr: &Expression<'_>) -> LowerResult<Expr> {
        self.nested(|| self.expression(expr))
    }

    fn expression(&self, expr: &Expression<'_>) -> LowerResult<Expr> {
        Ok(match expr {
            Expression::BooleanLiteral(b) => Expr::Literal(Literal::Bool(b.value)),
            Expression::NullLiteral(_) => Expr::Literal(Literal::Null),
            Expression::NumericLiteral(n) => Expr::Literal(Literal::Number(n.value)),
            Expression::StringLiteral(s) => Expr::Literal(Literal::String(Rc::from(s.value.as_str()))),
            Expression::TemplateLiteral(t) => {
                let quasis = t
                    .quasis
                    .iter()
                    .map(|q| {
                        q.value
                            .cooked
                            .as_ref()
                            .map_or_else(|| q.value.raw.to_string(), |c| c.to_string())
                    })
                    .collect();
                let mut exprs = Vec::with_capacity(t.expressions.len());
                for e in &t.expressions {
                    exprs.push(self.lower_expression(e)?);
                }
                Expr::Template { quasis, exprs }
            }
            Expression::Identifier(id) => match id.name.as_str() {
                "undefined" => Expr::Literal(Literal::Undefined),
                name => Expr::Ident(name.to_string()),
            },
            Expression::ThisExpression(_) => Expr::This,
            Expression::ArrayExpression(arr) => {
                let mut items = Vec::with_capacity(arr.elements.len());
                for el in &arr.elements {
                    items.push(match el {
                        ArrayExpressionElement::SpreadElement(s) => {
                            ListItem::Spread(self.lower_expression(&s.argument)?)
                        }
                        ArrayExpressionElement::Elision(_) => ListItem::Hole,
                        other => match other.as_expression() {
                            Some(e) => ListItem::Item(self.lower_expression(e)?),
                            None => return Err(ExecutionError::unsupported("array element")),
                        },
                    });
                }
                Expr::Array(items)
            }
            Expression::ObjectExpression(obj) => {
                let mut items = Vec::with_capacity(obj.properties.len());
                for prop in &obj.properties {
                    match prop {
                        ObjectPropertyKind::SpreadProperty(s) => {
                            items.push(ObjectItem::Spread(self.lower_expression(&s.argument)?))
                        }
                        ObjectPropertyKind::ObjectProperty(p) => {
                            let key = self.lower_property_key(&p.key, p.computed)?;
                            match p.kind {
                                PropertyKind::Init => {
                                    let value = self.lower_expression(&p.value)?;
                                    let value = match &key {
                                        PropKey::Static(name) => {
                                            name_anonymous(value, &Pattern::Ident(name.clone()))
                                        }
                                        PropKey::Computed(_) => value,
                                    };
                                    items.push(ObjectItem::Prop(key, value));
                                }
                                PropertyKind::Get => match &p.value {
                                    Expression::FunctionExpression(f) => {
                                        items.push(ObjectItem::Getter(key, self.lower_function(f)?))
                                    }
                                    _ => return Err(ExecutionError::unsupported("getter")),
                                },
                                PropertyKind::Set => {
                                    return Err(ExecutionError::unsupported("setter"))
                                }
                            }
                        }
                    }
                }
                Expr::Object(items)
            }
            Expression::FunctionExpression(f) => Expr::Function(self.lower_function(f)?),
            Expression::ArrowFunctionExpression(a) => Expr::Function(self.lower_arrow(a)?),
            Expression::StaticMemberExpression(m) => Expr::Member {
                object: self.boxed(&m.object)?,
                property: MemberProp::Static(m.property.name.to_string()),
                optional: m.optional,
            },
            Expression::ComputedMemberExpression(m) => Expr::Member {
                object: self.boxed(&m.object)?,
                property: MemberProp::Computed(self.boxed(&m.expression)?),
                optional: m.optional,
            },
            Expression::CallExpression(c) => Expr::Call {
                callee: self.boxed(&c.callee)?,
                args: self.lower_list(&c.arguments)?,
                optional: c.optional,
            },
            Expression::NewExpression(n) => Expr::New {
                callee: self.boxed(&n.callee)?,
                args: self.lower_list(&n.arguments)?,
            },
            Expression::ChainExpression(chain) => {
                let inner = match &chain.expression {
                    ChainElement::CallExpression(c) => Expr::Call {
                        callee: self.boxed(&c.callee)?,
                        args: self.lower_list(&c.arguments)?,
                        optional: c.optional,
                    },
                    ChainElement::TSNonNullExpression(e) => self.lower_expression(&e.expression)?,
                    other => match other.as_member_expression() {
                        Some(m) => self.lower_member(m)?,
                        None => return Err(ExecutionError::unsupported("optional chain")),
                    },
                };
                Expr::Chain(Box::new(inner))
            }
            Expression::UnaryExpression(u) => Expr::Unary {
                op: u.operator,
                arg: self.boxed(&u.argument)?,
            },
            Expression::UpdateExpression(u) => Expr::Update {
                op: u.operator,
                prefix: u.prefix,
                target: Box::new(self.lower_simple_target(&u.argument)?),
            },
            Expression::BinaryExpression(b) => Expr::Binary {
                op: b.operator,
                left: self.boxed(&b.left)?,
                right: self.boxed(&b.right)?,
            },
            Expression::LogicalExpression(l) => Expr::Logical {
                op: l.operator,
                left: self.boxed(&l.left)?,
                right: self.boxed(&l.right)?,
            },
            Expression::ConditionalExpression(c) => Expr::Conditional {
                test: self.boxed(&c.test)?,
                consequent: self.boxed(&c.consequent)?,
                alternate: self.boxed(&c.alternate)?,
            },
            Expression::AssignmentExpression(a) => {
                let target = self.lower_assignment_target(&a.left)?;
                let value = name_anonymous(self.lower_expression(&a.right)?, &target);
                Expr::Assign {
                    op: a.operator,
                    target: Box::new(target),
                    value: Box::new(value),
                }
            }
            Expression::SequenceExpression(s) => {
                let mut exprs = Vec::with_capacity(s.expressions.len());
                for e in &s.expressions {
                    exprs.push(self.lower_expression(e)?);
                }
                Expr::Sequence(exprs)
            }
            Expression::ParenthesizedExpression(p) => self.lower_expression(&p.expression)?,
            Expression::TSAsExpression(e) => self.lower_expression(&e.expression)?,
            Expression::TSSatisfiesExpression(e) => self.lower_expression(&e.expression)?,
            Expression::TSNonNullExpression(e) => self.lower_expression(&e.expression)?,
            Expression::TSTypeAssertion(e) => self.lower_expression(&e.expression)?,
            Expression::TSInstantiationExpression(e) => self.lower_expression(&e.expression)?,
            Expression::ClassExpression(_) => return Err(ExecutionError::unsupported("class")),
            Expression::AwaitExpression(_) => return Err(ExecutionError::unsupported("await")),
            Expression::YieldExpression(_) => return Err(ExecutionError::unsupported("yield")),
            Expression::RegExpLiteral(r) => {
                let flags = r.regex.flags.to_string();
                CompiledRegExp::new(r.regex.pattern.text.as_str(), &flags)
                    .map(Expr::RegExp)
                    .map_err(|message| ExecutionError::Syntax { message })?
            }
            Expression::BigIntLiteral(_) => return Err(ExecutionError::unsupported("BigInt")),
            Expression::TaggedTemplateExpression(_) => {
                return Err(ExecutionError::unsupported("tagged template"))
            }
            Expression::ImportExpression(_) => {
                return Err(ExecutionError::unsupported("dynamic import"))
            }
            Expression::JSXElement(_) | Expression::JSXFragment(_) => {
                return Err(ExecutionError::unsupported("untranspiled JSX"))
            }
            other => {
                return Err(ExecutionError::unsupported(format!(
                    "expression at offset {}",
                    other.span().start
                )))
            }
        })
    }

    fn lower_member(&self, member: &MemberExpression<'_>) -> LowerResult<Expr> {
        match member {
            MemberExpression::StaticMemberExpression(m) => Ok(Expr::Member {
                object: self.boxed(&m.object)?,
                property: MemberProp::Static(m.property.name.to_string()),
                optional: m.optional,
            }),
            MemberExpression::ComputedMemberExpression(m) => Ok(Expr::Member {
                object: self.boxed(&m.object)?,
                property: MemberProp::Computed(self.boxed(&m.expression)?),
                optional: m.optional,
            }),
            MemberExpression::PrivateFieldExpression(_) => {
                Err(ExecutionError::unsupported("private field"))
            }
        }
    }
}

fn decl_kind(kind: VariableDeclarationKind) -> LowerResult<DeclKind> {
    match kind {
        VariableDeclarationKind::Var => Ok(DeclKind::Var),
        VariableDeclarationKind::Let => Ok(DeclKind::Let),
        VariableDeclarationKind::Const => Ok(DeclKind::Const),
        _ => Err(ExecutionError::unsupported("using declaration")),
    }
}

/// `const Foo = () => ...` gives the arrow the name `Foo`, which discovery
/// and component stacks report.
fn name_anonymous(expr: Expr, pattern: &Pattern) -> Expr {
    match (expr, pattern) {
        (Expr::Function(def), Pattern::Ident(name)) if def.name.is_none() => {
            match Rc::try_unwrap(def) {
                Ok(mut inner) => {
                    inner.name = Some(name.clone());
                    Expr::Function(Rc::new(inner))
                }
                Err(shared) => Expr::Function(shared),
            }
        }
        (expr, _) => expr,
    }
}
