//! JSX/TypeScript lowering for the transpiler.

use oxc_allocator::{Allocator, Box as oxc_box, CloneIn};
use oxc_ast::ast::*;
use oxc_ast::AstBuilder;
use oxc_ast_visit::walk_mut::{
    walk_arrow_function_expression, walk_call_expression, walk_catch_parameter, walk_expression,
    walk_formal_parameter, walk_formal_parameters, walk_function, walk_new_expression,
    walk_statements, walk_variable_declarator,
};
use oxc_ast_visit::VisitMut;
use oxc_span::SPAN;
use oxc_syntax::scope::ScopeFlags;

use crate::config::JsxOptions;

// ═══════════════════════════════════════════════════════════════════════════════
// JSX LOWERER
// Transforms JSX elements into React.createElement() calls
// ═══════════════════════════════════════════════════════════════════════════════

pub struct JsxLowerer<'a> {
    pub ast: AstBuilder<'a>,
    factory: Vec<String>,
    fragment: Vec<String>,
}

impl<'a> JsxLowerer<'a> {
    pub fn new(allocator: &'a Allocator, options: &JsxOptions) -> Self {
        let path = |s: &str| s.split('.').map(str::to_string).collect::<Vec<_>>();
        Self {
            ast: AstBuilder::new(allocator),
            factory: path(&options.factory),
            fragment: path(&options.fragment),
        }
    }

    fn alloc(&self, s: &str) -> &'a str {
        self.ast.allocator.alloc_str(s)
    }

    /// `a.b.c` as a static member chain.
    fn member_path(&self, segments: &[String]) -> Expression<'a> {
        let mut segments = segments.iter();
        let head = segments.next().map(String::as_str).unwrap_or("React");
        let mut expr = self.ast.expression_identifier(SPAN, self.alloc(head));
        for segment in segments {
            expr = Expression::from(self.ast.member_expression_static(
                SPAN,
                expr,
                self.ast.identifier_name(SPAN, self.alloc(segment)),
                false,
            ));
        }
        expr
    }

    fn create_element(
        &mut self,
        tag: Expression<'a>,
        props: Expression<'a>,
        children: oxc_allocator::Vec<'a, Argument<'a>>,
    ) -> Expression<'a> {
        let mut args = self.ast.vec();
        args.push(Argument::from(tag));
        args.push(Argument::from(props));
        for child in children {
            args.push(child);
        }

        let callee = self.member_path(&self.factory);
        self.ast.expression_call(
            SPAN,
            callee,
            None::<oxc_box<TSTypeParameterInstantiation>>,
            args,
            false,
        )
    }

    fn lower_jsx_element(&mut self, element: &JSXElement<'a>) -> Expression<'a> {
        let tag = self.lower_tag(&element.opening_element.name);

        let mut current_obj_props = self.ast.vec();

        for item in &element.opening_element.attributes {
            match item {
                JSXAttributeItem::Attribute(attr) => {
                    let name = match &attr.name {
                        JSXAttributeName::Identifier(id) => id.name.to_string(),
                        JSXAttributeName::NamespacedName(ns) => {
                            format!("{}:{}", ns.namespace.name, ns.name.name)
                        }
                    };
                    let key = self.property_key(&name);

                    let value = match &attr.value {
                        Some(JSXAttributeValue::StringLiteral(s)) => {
                            let decoded = decode_entities(&s.value);
                            self.ast
                                .expression_string_literal(SPAN, self.alloc(&decoded), None)
                        }
                        Some(JSXAttributeValue::Element(el)) => self.lower_jsx_element(el),
                        Some(JSXAttributeValue::ExpressionContainer(container)) => self
                            .lower_jsx_expression(&container.expression)
                            .unwrap_or_else(|| self.ast.expression_identifier(SPAN, "undefined")),
                        Some(JSXAttributeValue::Fragment(frag)) => self.lower_jsx_fragment(frag),
                        None => self.ast.expression_boolean_literal(SPAN, true),
                    };

                    current_obj_props.push(self.ast.object_property_kind_object_property(
                        SPAN,
                        PropertyKind::Init,
                        key,
                        value,
                        false,
                        false,
                        false,
                    ));
                }
                JSXAttributeItem::SpreadAttribute(spread) => {
                    let mut spread_expr = spread.argument.clone_in(self.ast.allocator);
                    self.visit_expression(&mut spread_expr);
                    current_obj_props.push(
                        self.ast
                            .object_property_kind_spread_property(SPAN, spread_expr),
                    );
                }
            }
        }

        let props_expr = if current_obj_props.is_empty() {
            self.ast.expression_null_literal(SPAN)
        } else {
            self.ast.expression_object(SPAN, current_obj_props)
        };

        let children = self.lower_children(&element.children);
        self.create_element(tag, props_expr, children)
    }

    fn lower_jsx_fragment(&mut self, fragment: &JSXFragment<'a>) -> Expression<'a> {
        let tag = self.member_path(&self.fragment);
        let props = self.ast.expression_null_literal(SPAN);
        let children = self.lower_children(&fragment.children);
        self.create_element(tag, props, children)
    }

    fn lower_children(
        &mut self,
        children: &oxc_allocator::Vec<'a, JSXChild<'a>>,
    ) -> oxc_allocator::Vec<'a, Argument<'a>> {
        let mut children_vec = self.ast.vec();
        for child in children {
            match child {
                JSXChild::Text(t) => {
                    if let Some(text) = clean_jsx_text(&t.value) {
                        children_vec.push(Argument::from(self.ast.expression_string_literal(
                            SPAN,
                            self.alloc(&text),
                            None,
                        )));
                    }
                }
                JSXChild::Element(el) => {
                    children_vec.push(Argument::from(self.lower_jsx_element(el)));
                }
                JSXChild::Fragment(frag) => {
                    children_vec.push(Argument::from(self.lower_jsx_fragment(frag)));
                }
                JSXChild::ExpressionContainer(container) => {
                    // `{/* comment */}` is not a child
                    if let Some(expr) = self.lower_jsx_expression(&container.expression) {
                        children_vec.push(Argument::from(expr));
                    }
                }
                JSXChild::Spread(spread) => {
                    let mut arg = spread.expression.clone_in(self.ast.allocator);
                    self.visit_expression(&mut arg);
                    children_vec.push(self.ast.argument_spread_element(SPAN, arg));
                }
            }
        }
        children_vec
    }

    /// Intrinsic (lowercase or dashed) tags become strings, everything else a
    /// reference.
    fn lower_tag(&self, name: &JSXElementName<'a>) -> Expression<'a> {
        match name {
            JSXElementName::Identifier(id) => self.tag_from_name(&id.name),
            JSXElementName::IdentifierReference(id) => self.tag_from_name(&id.name),
            JSXElementName::NamespacedName(ns) => {
                let name = format!("{}:{}", ns.namespace.name, ns.name.name);
                self.ast.expression_string_literal(SPAN, self.alloc(&name), None)
            }
            JSXElementName::MemberExpression(me) => self.lower_member(me),
            JSXElementName::ThisExpression(_) => self.ast.expression_this(SPAN),
        }
    }

    fn tag_from_name(&self, name: &str) -> Expression<'a> {
        let intrinsic = name.contains('-')
            || name.chars().next().map_or(false, |c| c.is_ascii_lowercase());
        if intrinsic {
            self.ast.expression_string_literal(SPAN, self.alloc(name), None)
        } else {
            self.ast.expression_identifier(SPAN, self.alloc(name))
        }
    }

    fn lower_member(&self, me: &JSXMemberExpression<'a>) -> Expression<'a> {
        let object = match &me.object {
            JSXMemberExpressionObject::IdentifierReference(id) => {
                self.ast.expression_identifier(SPAN, self.alloc(&id.name))
            }
            JSXMemberExpressionObject::MemberExpression(inner) => self.lower_member(inner),
            JSXMemberExpressionObject::ThisExpression(_) => self.ast.expression_this(SPAN),
        };
        Expression::from(self.ast.member_expression_static(
            SPAN,
            object,
            self.ast.identifier_name(SPAN, self.alloc(&me.property.name)),
            false,
        ))
    }

    /// Attribute names that are not identifiers (`aria-label`) need quoting.
    fn property_key(&self, name: &str) -> PropertyKey<'a> {
        let is_ident = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        if is_ident {
            self.ast.property_key_static_identifier(SPAN, self.alloc(name))
        } else {
            PropertyKey::StringLiteral(self.ast.alloc_string_literal(SPAN, self.alloc(name), None))
        }
    }

    fn lower_jsx_expression(&mut self, jsx_expr: &JSXExpression<'a>) -> Option<Expression<'a>> {
        let mut e = jsx_expr
            .as_expression()
            .map(|e| e.clone_in(self.ast.allocator))?;
        self.visit_expression(&mut e);
        Some(e)
    }
}

impl<'a> VisitMut<'a> for JsxLowerer<'a> {
    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        match expr {
            Expression::JSXElement(element) => {
                let lowered = self.lower_jsx_element(element);
                *expr = lowered;
            }
            Expression::JSXFragment(fragment) => {
                let lowered = self.lower_jsx_fragment(fragment);
                *expr = lowered;
            }
            _ => {
                walk_expression(self, expr);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSX TEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Whitespace rules for JSX text: lines are trimmed (except the outer edges
/// of the first and last line), blank lines dropped, the rest joined with a
/// single space. `None` when nothing is left.
pub fn clean_jsx_text(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw.split('\n').collect();
    let last = lines.len() - 1;
    let mut parts = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let line = line.trim_end_matches('\r');
        let mut trimmed = line;
        if i != 0 {
            trimmed = trimmed.trim_start_matches([' ', '\t']);
        }
        if i != last {
            trimmed = trimmed.trim_end_matches([' ', '\t']);
        }
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(decode_entities(&parts.join(" ")))
    }
}

pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &tail[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                "copy" => Some('©'),
                "hellip" => Some('…'),
                "mdash" => Some('—'),
                "ndash" => Some('–'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// TYPE STRIPPER
// Erases TypeScript-only syntax so the printed code is plain JavaScript
// ═══════════════════════════════════════════════════════════════════════════════

pub struct TypeStripper<'a> {
    pub ast: AstBuilder<'a>,
}

impl<'a> TypeStripper<'a> {
    pub fn new(allocator: &'a Allocator) -> Self {
        Self {
            ast: AstBuilder::new(allocator),
        }
    }

    fn is_ts_node(stmt: &Statement<'a>) -> bool {
        match stmt {
            Statement::TSTypeAliasDeclaration(_)
            | Statement::TSInterfaceDeclaration(_)
            | Statement::TSModuleDeclaration(_)
            | Statement::TSGlobalDeclaration(_)
            | Statement::TSImportEqualsDeclaration(_)
            | Statement::TSExportAssignment(_)
            | Statement::TSNamespaceExportDeclaration(_) => true,
            Statement::TSEnumDeclaration(e) => e.declare,
            Statement::VariableDeclaration(v) => v.declare,
            // overload signatures and `declare function`
            Statement::FunctionDeclaration(f) => f.declare || f.body.is_none(),
            Statement::ClassDeclaration(c) => c.declare,
            _ => false,
        }
    }

    /// `enum E { A, B = 5, C }` → `const E = { A: 0, B: 5, C: 6 };`
    fn lower_enum(&self, decl: &TSEnumDeclaration<'a>) -> Statement<'a> {
        let mut props = self.ast.vec();
        let mut next = 0f64;
        for member in &decl.body.members {
            let name: &str = match &member.id {
                TSEnumMemberName::Identifier(id) => &id.name,
                TSEnumMemberName::String(lit) | TSEnumMemberName::ComputedString(lit) => &lit.value,
                TSEnumMemberName::ComputedTemplateString(_) => continue,
            };
            let value = match &member.initializer {
                Some(Expression::NumericLiteral(n)) => {
                    next = n.value + 1.0;
                    self.number(n.value)
                }
                Some(init) => init.clone_in(self.ast.allocator),
                None => {
                    let value = self.number(next);
                    next += 1.0;
                    value
                }
            };
            let key = PropertyKey::StringLiteral(
                self.ast
                    .alloc_string_literal(SPAN, self.ast.allocator.alloc_str(name), None),
            );
            props.push(self.ast.object_property_kind_object_property(
                SPAN,
                PropertyKind::Init,
                key,
                value,
                false,
                false,
                false,
            ));
        }

        let declarator = self.ast.variable_declarator(
            SPAN,
            VariableDeclarationKind::Const,
            self.ast
                .binding_pattern_binding_identifier(SPAN, decl.id.name),
            None::<oxc_box<TSTypeAnnotation>>,
            Some(self.ast.expression_object(SPAN, props)),
            false,
        );
        Statement::from(self.ast.declaration_variable(
            SPAN,
            VariableDeclarationKind::Const,
            self.ast.vec1(declarator),
            false,
        ))
    }

    fn number(&self, value: f64) -> Expression<'a> {
        self.ast
            .expression_numeric_literal(SPAN, value, None, NumberBase::Decimal)
    }
}

impl<'a> VisitMut<'a> for TypeStripper<'a> {
    fn visit_statements(&mut self, it: &mut oxc_allocator::Vec<'a, Statement<'a>>) {
        it.retain(|stmt| !Self::is_ts_node(stmt));
        for stmt in it.iter_mut() {
            let lowered = match &*stmt {
                Statement::TSEnumDeclaration(decl) => Some(self.lower_enum(decl)),
                _ => None,
            };
            if let Some(lowered) = lowered {
                *stmt = lowered;
            }
        }
        walk_statements(self, it);
    }

    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        // Strip TS specific expressions
        let inner = match expr {
            Expression::TSAsExpression(e) => Some(e.expression.clone_in(self.ast.allocator)),
            Expression::TSSatisfiesExpression(e) => {
                Some(e.expression.clone_in(self.ast.allocator))
            }
            Expression::TSNonNullExpression(e) => Some(e.expression.clone_in(self.ast.allocator)),
            Expression::TSTypeAssertion(e) => Some(e.expression.clone_in(self.ast.allocator)),
            Expression::TSInstantiationExpression(e) => {
                Some(e.expression.clone_in(self.ast.allocator))
            }
            _ => None,
        };
        if let Some(inner) = inner {
            *expr = inner;
            self.visit_expression(expr);
            return;
        }
        walk_expression(self, expr);
    }

    fn visit_variable_declarator(&mut self, it: &mut VariableDeclarator<'a>) {
        it.type_annotation = None;
        it.definite = false;
        walk_variable_declarator(self, it);
    }

    fn visit_formal_parameters(&mut self, it: &mut FormalParameters<'a>) {
        if let Some(rest) = &mut it.rest {
            rest.type_annotation = None;
        }
        walk_formal_parameters(self, it);
    }

    fn visit_formal_parameter(&mut self, it: &mut FormalParameter<'a>) {
        it.type_annotation = None;
        it.optional = false;
        it.accessibility = None;
        it.readonly = false;
        it.r#override = false;
        walk_formal_parameter(self, it);
    }

    fn visit_function(&mut self, it: &mut Function<'a>, flags: ScopeFlags) {
        it.type_parameters = None;
        it.this_param = None;
        it.return_type = None;
        walk_function(self, it, flags);
    }

    fn visit_arrow_function_expression(&mut self, it: &mut ArrowFunctionExpression<'a>) {
        it.type_parameters = None;
        it.return_type = None;
        walk_arrow_function_expression(self, it);
    }

    fn visit_call_expression(&mut self, it: &mut CallExpression<'a>) {
        it.type_arguments = None;
        walk_call_expression(self, it);
    }

    fn visit_new_expression(&mut self, it: &mut NewExpression<'a>) {
        it.type_arguments = None;
        walk_new_expression(self, it);
    }

    fn visit_catch_parameter(&mut self, it: &mut CatchParameter<'a>) {
        it.type_annotation = None;
        walk_catch_parameter(self, it);
    }

    fn visit_jsx_opening_element(&mut self, it: &mut JSXOpeningElement<'a>) {
        it.type_arguments = None;
        oxc_ast_visit::walk_mut::walk_jsx_opening_element(self, it);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_jsx_text_collapses_lines() {
        assert_eq!(clean_jsx_text("\n    Hello\n    world  \n  "), Some("Hello world".into()));
        assert_eq!(clean_jsx_text("  a b  "), Some("  a b  ".into()));
        assert_eq!(clean_jsx_text("\n   \n  "), None);
        assert_eq!(clean_jsx_text("Count: "), Some("Count: ".into()));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt;"), "a & b <c>");
        assert_eq!(decode_entities("&#65;&#x42;&nbsp;"), "AB\u{a0}");
        assert_eq!(decode_entities("R&D &unknown; &"), "R&D &unknown; &");
    }
}
