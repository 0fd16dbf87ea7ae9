//! Key-in-spread guard.
//!
//! React warns (and the host runtime misbehaves) when `key` reaches an element
//! through a props spread. Two things happen here:
//!
//! - a declarator `const p = { key: k, ... }` whose binding is later spread on
//!   an element without its own `key` is rewritten statically: the property is
//!   dropped from the literal and `key={k}` is placed before the spread;
//! - every spread argument is wrapped in `__keySafeProps(...)` so shapes the
//!   static pass cannot see are still stripped at runtime.
//!
//! The pass only reads the AST. It returns span edits against the source.

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_span::GetSpan;
use oxc_syntax::scope::{ScopeFlags, ScopeId};
use rustc_hash::FxHashMap;
use std::cell::Cell;
use tracing::debug;

use crate::preprocess::Edit;

pub const KEY_SAFE_PROPS: &str = "__keySafeProps";

#[derive(Debug, Default)]
pub struct KeyGuardOutput {
    pub edits: Vec<Edit>,
    /// Declarations whose `key` property was moved onto elements.
    pub rewrites: usize,
}

pub fn guard_key_spreads(program: &Program<'_>, source: &str) -> KeyGuardOutput {
    let mut guard = KeyGuard {
        source,
        scopes: Vec::new(),
        decls: Vec::new(),
        edits: Vec::new(),
    };
    guard.visit_program(program);
    guard.finish()
}

// ═══════════════════════════════════════════════════════════════════════════════
// VISITOR
// ═══════════════════════════════════════════════════════════════════════════════

/// A declarator whose initializer is an object literal with a static `key`.
#[derive(Debug)]
struct KeyedDecl {
    name: String,
    /// Byte range removed from the literal to drop the property.
    removal: (u32, u32),
    key_text: String,
    /// Start offsets of the spread attributes that receive `key={..}`.
    sites: Vec<u32>,
}

struct KeyGuard<'s> {
    source: &'s str,
    /// Innermost last. `Some(i)` points into `decls`.
    scopes: Vec<FxHashMap<String, Option<usize>>>,
    decls: Vec<KeyedDecl>,
    edits: Vec<Edit>,
}

impl<'s> KeyGuard<'s> {
    fn declare(&mut self, name: &str, decl: Option<usize>) {
        if let Some(scope) = self.scopes.last_mut() {
            match decl {
                Some(_) => {
                    scope.insert(name.to_string(), decl);
                }
                None => {
                    scope.entry(name.to_string()).or_insert(None);
                }
            }
        }
    }

    fn resolve(&self, name: &str) -> Option<usize> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .copied()
            .flatten()
    }

    /// Registers the statement list's declarations before any of it is
    /// visited, so a spread that precedes the declarator textually (inside a
    /// closure) still resolves.
    fn predeclare(&mut self, statements: &[Statement<'_>]) {
        for stmt in statements {
            match stmt {
                Statement::VariableDeclaration(decl) => self.predeclare_variables(decl),
                Statement::ExportNamedDeclaration(export) => {
                    if let Some(Declaration::VariableDeclaration(decl)) = &export.declaration {
                        self.predeclare_variables(decl);
                    }
                }
                Statement::FunctionDeclaration(func) => {
                    if let Some(id) = &func.id {
                        self.declare(id.name.as_str(), None);
                    }
                }
                _ => {}
            }
        }
    }

    fn predeclare_variables(&mut self, decl: &VariableDeclaration<'_>) {
        for declarator in &decl.declarations {
            let keyed = match (&declarator.id, &declarator.init) {
                (BindingPattern::BindingIdentifier(id), Some(Expression::ObjectExpression(obj))) => {
                    self.keyed_literal(id.name.as_str(), obj)
                }
                _ => None,
            };
            match keyed {
                Some(keyed) => {
                    let index = self.decls.len();
                    let name = keyed.name.clone();
                    self.decls.push(keyed);
                    self.declare(&name, Some(index));
                }
                None => {
                    for id in declarator.id.get_binding_identifiers() {
                        self.declare(id.name.as_str(), None);
                    }
                }
            }
        }
    }

    fn keyed_literal(&self, name: &str, obj: &ObjectExpression<'_>) -> Option<KeyedDecl> {
        let props = &obj.properties;
        let index = props.iter().position(|item| match item {
            ObjectPropertyKind::ObjectProperty(prop) => {
                !prop.computed && !prop.method && prop.key.is_specific_static_name("key")
            }
            ObjectPropertyKind::SpreadProperty(_) => false,
        })?;
        let ObjectPropertyKind::ObjectProperty(prop) = &props[index] else {
            return None;
        };

        let value = prop.value.span();
        let key_text = self.source[value.start as usize..value.end as usize].to_string();

        // Take the separating comma with the property.
        let removal = if let Some(next) = props.get(index + 1) {
            (prop.span.start, next.span().start)
        } else if index > 0 {
            (props[index - 1].span().end, prop.span.end)
        } else {
            (prop.span.start, obj.span.end.saturating_sub(1))
        };

        Some(KeyedDecl {
            name: name.to_string(),
            removal,
            key_text,
            sites: Vec::new(),
        })
    }

    fn finish(mut self) -> KeyGuardOutput {
        let mut rewrites = 0;
        for decl in &self.decls {
            if decl.sites.is_empty() {
                continue;
            }
            debug!(binding = decl.name.as_str(), sites = decl.sites.len(), "moving key out of spread");
            rewrites += 1;
            self.edits
                .push(Edit::new(decl.removal.0, decl.removal.1, String::new()));
            for site in &decl.sites {
                self.edits
                    .push(Edit::insert(*site, format!("key={{{}}} ", decl.key_text)));
            }
        }
        KeyGuardOutput {
            edits: self.edits,
            rewrites,
        }
    }
}

impl<'a, 's> Visit<'a> for KeyGuard<'s> {
    fn enter_scope(&mut self, _flags: ScopeFlags, _scope_id: &Cell<Option<ScopeId>>) {
        self.scopes.push(FxHashMap::default());
    }

    fn leave_scope(&mut self) {
        self.scopes.pop();
    }

    fn visit_statements(&mut self, it: &oxc_allocator::Vec<'a, Statement<'a>>) {
        self.predeclare(it);
        walk::walk_statements(self, it);
    }

    // Params, catch params and loop heads. Declarators were already
    // registered by `predeclare`, which `or_insert` keeps intact.
    fn visit_binding_identifier(&mut self, it: &BindingIdentifier<'a>) {
        self.declare(it.name.as_str(), None);
    }

    fn visit_jsx_opening_element(&mut self, it: &JSXOpeningElement<'a>) {
        let has_key = it.attributes.iter().any(|item| match item {
            JSXAttributeItem::Attribute(attr) => {
                matches!(&attr.name, JSXAttributeName::Identifier(id) if id.name == "key")
            }
            JSXAttributeItem::SpreadAttribute(_) => false,
        });

        let mut placed = has_key;
        for item in &it.attributes {
            let JSXAttributeItem::SpreadAttribute(spread) = item else {
                continue;
            };
            let arg = spread.argument.span();
            self.edits
                .push(Edit::insert(arg.start, format!("{}(", KEY_SAFE_PROPS)));
            self.edits.push(Edit::insert(arg.end, ")".to_string()));

            if placed {
                continue;
            }
            if let Expression::Identifier(ident) = &spread.argument {
                if let Some(index) = self.resolve(ident.name.as_str()) {
                    self.decls[index].sites.push(spread.span.start);
                    placed = true;
                }
            }
        }

        walk::walk_jsx_opening_element(self, it);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::apply_edits;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn guard(source: &str) -> (String, usize) {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::tsx()).parse();
        assert!(ret.errors.is_empty());
        let out = guard_key_spreads(&ret.program, source);
        (apply_edits(source, out.edits), out.rewrites)
    }

    #[test]
    fn test_top_level_declaration_is_rewritten() {
        let (code, rewrites) =
            guard("const p = { key: 'a', title: 'x' };\nconst el = <Card {...p} />;");
        assert_eq!(rewrites, 1);
        assert_eq!(
            code,
            "const p = { title: 'x' };\nconst el = <Card key={'a'} {...__keySafeProps(p)} />;"
        );
    }

    #[test]
    fn test_nested_scope_is_rewritten() {
        let (code, rewrites) = guard(
            "function List() {\n  const props = { title: 't', key: id };\n  return items.map(() => <Item {...props} />);\n}",
        );
        assert_eq!(rewrites, 1);
        assert!(code.contains("const props = { title: 't' };"));
        assert!(code.contains("<Item key={id} {...__keySafeProps(props)} />"));
    }

    #[test]
    fn test_explicit_key_wins() {
        let (code, rewrites) = guard("const p = { key: 1 };\nconst el = <div key=\"x\" {...p} />;");
        assert_eq!(rewrites, 0);
        assert!(code.starts_with("const p = { key: 1 };"));
        assert!(code.contains("{...__keySafeProps(p)}"));
    }

    #[test]
    fn test_shadowed_binding_is_left_alone() {
        let (code, rewrites) = guard(
            "const p = { key: 1 };\nfunction F(p) { return <div {...p} />; }",
        );
        assert_eq!(rewrites, 0);
        assert!(code.starts_with("const p = { key: 1 };"));
    }

    #[test]
    fn test_other_spreads_only_get_runtime_guard() {
        let (code, rewrites) = guard("const el = <div {...props.inner} />;");
        assert_eq!(rewrites, 0);
        assert_eq!(code, "const el = <div {...__keySafeProps(props.inner)} />;");
    }

    #[test]
    fn test_sole_key_property_leaves_empty_literal() {
        let (code, _) = guard("const p = { key: 1, };\nconst el = <b {...p} />;");
        assert!(code.starts_with("const p = { };"));
    }
}
