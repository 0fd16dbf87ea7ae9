//! Owned program representation evaluated by the sandbox.
//!
//! The oxc AST lives in an arena tied to the source text; closures outlive
//! that arena, so the executable unit is lowered into this tree first.

use oxc_syntax::operator::{
    AssignmentOperator, BinaryOperator, LogicalOperator, UnaryOperator, UpdateOperator,
};
use std::rc::Rc;

use crate::regexp::CompiledRegExp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug)]
pub enum Stmt {
    Expr(Expr),
    VarDecl(VarDecl),
    FunctionDecl(Rc<FunctionDef>),
    Return(Option<Expr>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForOf {
        head: ForHead,
        right: Expr,
        body: Box<Stmt>,
    },
    ForIn {
        head: ForHead,
        right: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Break,
    Continue,
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        param: Option<Pattern>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Empty,
}

#[derive(Debug)]
pub struct VarDecl {
    pub kind: DeclKind,
    pub declarators: Vec<(Pattern, Option<Expr>)>,
}

#[derive(Debug)]
pub enum ForInit {
    VarDecl(VarDecl),
    Expr(Expr),
}

#[derive(Debug)]
pub enum ForHead {
    Decl { kind: DeclKind, pattern: Pattern },
    Target(Pattern),
}

#[derive(Debug)]
pub struct SwitchCase {
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

/// Binding and assignment targets share one shape; `Member` only appears in
/// assignment position.
#[derive(Debug)]
pub enum Pattern {
    Ident(String),
    Object {
        props: Vec<(PropKey, Pattern)>,
        rest: Option<Box<Pattern>>,
    },
    Array {
        elements: Vec<Option<Pattern>>,
        rest: Option<Box<Pattern>>,
    },
    Default {
        target: Box<Pattern>,
        default: Expr,
    },
    Member {
        object: Box<Expr>,
        property: MemberProp,
    },
}

#[derive(Debug)]
pub enum PropKey {
    Static(String),
    Computed(Expr),
}

#[derive(Debug)]
pub enum MemberProp {
    Static(String),
    Computed(Box<Expr>),
}

#[derive(Debug)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<Pattern>,
    pub rest: Option<Pattern>,
    pub body: FunctionBody,
    pub is_arrow: bool,
}

#[derive(Debug)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

#[derive(Debug)]
pub enum ListItem {
    Item(Expr),
    Spread(Expr),
    Hole,
}

#[derive(Debug)]
pub enum ObjectItem {
    Prop(PropKey, Expr),
    Getter(PropKey, Rc<FunctionDef>),
    Spread(Expr),
}

#[derive(Debug)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
}

#[derive(Debug)]
pub enum Expr {
    Literal(Literal),
    /// Each evaluation yields a fresh object with its own `lastIndex`.
    RegExp(CompiledRegExp),
    Template {
        quasis: Vec<String>,
        exprs: Vec<Expr>,
    },
    Ident(String),
    This,
    Array(Vec<ListItem>),
    Object(Vec<ObjectItem>),
    Function(Rc<FunctionDef>),
    Member {
        object: Box<Expr>,
        property: MemberProp,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<ListItem>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        args: Vec<ListItem>,
    },
    Unary {
        op: UnaryOperator,
        arg: Box<Expr>,
    },
    Update {
        op: UpdateOperator,
        prefix: bool,
        target: Box<Pattern>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        op: AssignmentOperator,
        target: Box<Pattern>,
        value: Box<Expr>,
    },
    Sequence(Vec<Expr>),
    /// Boundary of an optional chain (`a?.b.c`).
    Chain(Box<Expr>),
}

impl Pattern {
    /// Names bound by this pattern, in source order.
    pub fn bound_names(&self, out: &mut Vec<String>) {
        match self {
            Pattern::Ident(name) => out.push(name.clone()),
            Pattern::Object { props, rest } => {
                for (_, p) in props {
                    p.bound_names(out);
                }
                if let Some(r) = rest {
                    r.bound_names(out);
                }
            }
            Pattern::Array { elements, rest } => {
                for p in elements.iter().flatten() {
                    p.bound_names(out);
                }
                if let Some(r) = rest {
                    r.bound_names(out);
                }
            }
            Pattern::Default { target, .. } => target.bound_names(out),
            Pattern::Member { .. } => {}
        }
    }
}

/// Top-level declared names of a program body, in source order.
pub fn declared_names(body: &[Stmt]) -> Vec<String> {
    let mut names = Vec::new();
    for stmt in body {
        match stmt {
            Stmt::VarDecl(decl) => {
                for (pattern, _) in &decl.declarators {
                    pattern.bound_names(&mut names);
                }
            }
            Stmt::FunctionDecl(def) => {
                if let Some(name) = &def.name {
                    names.push(name.clone());
                }
            }
            _ => {}
        }
    }
    let mut seen = std::collections::HashSet::new();
    names.retain(|n| seen.insert(n.clone()));
    names
}
