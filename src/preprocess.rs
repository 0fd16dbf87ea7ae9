//! Source preprocessing.
//!
//! Rewrites the user's TSX into one self-contained unit the sandbox can run
//! as a plain function body: registry imports are inlined, host imports are
//! dropped (their names are injected), every `export` form is stripped and
//! the component to render is recorded as the entry identifier.
//!
//! All rewriting is span based. The source is parsed once with oxc and the
//! collected edits are applied back onto the original text, so everything
//! the pass does not touch survives byte for byte.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, warn};

use crate::bindings::{BINDING_LIBRARY, ICON_NAMES};
use crate::config::CompilerConfig;
use crate::error::{Diagnostic, PreprocessError, W_MISSING_DEFAULT_EXPORT};
use crate::key_guard::guard_key_spreads;
use crate::registry::RegistrySnapshot;

const MODULE_NOT_FOUND: &str = "__moduleNotFound";
const ICON_PACKAGE: &str = "lucide-react";
const RUNTIME_NAMESPACE: &str = "React";

// ═══════════════════════════════════════════════════════════════════════════════
// SPAN EDITS
// ═══════════════════════════════════════════════════════════════════════════════

/// Replace `start..end` of the source with `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: u32,
    pub end: u32,
    pub text: String,
}

impl Edit {
    pub fn new(start: u32, end: u32, text: String) -> Self {
        Self { start, end, text }
    }

    pub fn insert(at: u32, text: String) -> Self {
        Self::new(at, at, text)
    }

    pub fn remove(start: u32, end: u32) -> Self {
        Self::new(start, end, String::new())
    }
}

/// Applies edits in source order. Insertions at an offset go before a
/// replacement starting there; an edit overlapping an earlier one is dropped.
pub fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| (e.start, e.end));

    let mut out = String::with_capacity(source.len() + 64);
    let mut cursor = 0usize;
    for edit in edits {
        let (start, end) = (edit.start as usize, edit.end as usize);
        if start < cursor || end > source.len() {
            debug!(start, end, "dropping overlapping edit");
            continue;
        }
        out.push_str(&source[cursor..start]);
        out.push_str(&edit.text);
        cursor = end;
    }
    out.push_str(&source[cursor..]);
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreprocessOutput {
    pub code: String,
    /// Identifier of the component to render, when the source names one.
    pub entry: Option<String>,
    pub has_default_export: bool,
    /// Registry paths inlined, in the order they were first reached.
    pub inlined_modules: Vec<String>,
    /// Specifiers that resolved neither to the registry nor a host package.
    pub missing_modules: Vec<String>,
    pub host_imports: Vec<String>,
    pub key_rewrites: usize,
    pub warnings: Vec<Diagnostic>,
}

pub fn preprocess(
    source: &str,
    snapshot: &RegistrySnapshot,
    config: &CompilerConfig,
) -> Result<PreprocessOutput, PreprocessError> {
    if source.trim().is_empty() {
        return Err(PreprocessError::EmptySource);
    }

    let mut pre = Preprocessor {
        snapshot,
        config,
        visited: FxHashSet::default(),
        exports: FxHashMap::default(),
        module_count: 0,
        inlined: Vec::new(),
        missing: Vec::new(),
        host: Vec::new(),
        key_rewrites: 0,
    };
    let unit = pre.rewrite(source, Unit::Root);

    let mut warnings = Vec::new();
    let entry = if unit.has_default_export {
        unit.default_binding.clone().filter(|_| unit.named_default)
    } else if unit.parsed {
        let fallback = unit.component_candidates.last().cloned();
        let message = match &fallback {
            Some(name) => format!("no default export found, using `{}` as the component", name),
            None => "no default export found".to_string(),
        };
        warn!("{}", message);
        warnings.push(Diagnostic::new(W_MISSING_DEFAULT_EXPORT, message));
        fallback
    } else {
        None
    };

    info!(
        entry = entry.as_deref().unwrap_or("-"),
        inlined = pre.inlined.len(),
        missing = pre.missing.len(),
        "preprocessed source"
    );

    Ok(PreprocessOutput {
        code: unit.code,
        entry,
        has_default_export: unit.has_default_export,
        inlined_modules: pre.inlined,
        missing_modules: pre.missing,
        host_imports: pre.host,
        key_rewrites: pre.key_rewrites,
        warnings,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// UNIT REWRITING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
enum Unit {
    Root,
    /// An inlined registry module, numbered for its default-export slot.
    Module(usize),
}

/// What an inlined module makes visible to its importer.
#[derive(Debug, Clone, Default)]
struct ModuleExports {
    /// `(exported, local)`
    named: Vec<(String, String)>,
    default: Option<String>,
}

#[derive(Debug, Default)]
struct Rewritten {
    code: String,
    parsed: bool,
    has_default_export: bool,
    /// `export default Name` / `export default function Name` as opposed to
    /// an anonymous default written into a slot.
    named_default: bool,
    default_binding: Option<String>,
    named_exports: Vec<(String, String)>,
    /// Capitalised top-level bindings holding a function, in source order.
    component_candidates: Vec<String>,
}

/// One binding an import (or re-export) asks for.
enum Request {
    Named { imported: String, local: String },
    Default { local: String },
    Namespace { local: String },
}

struct Preprocessor<'r> {
    snapshot: &'r RegistrySnapshot,
    config: &'r CompilerConfig,
    visited: FxHashSet<String>,
    exports: FxHashMap<String, ModuleExports>,
    module_count: usize,
    inlined: Vec<String>,
    missing: Vec<String>,
    host: Vec<String>,
    key_rewrites: usize,
}

impl<'r> Preprocessor<'r> {
    fn rewrite(&mut self, source: &str, unit: Unit) -> Rewritten {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::tsx()).parse();
        if !ret.errors.is_empty() {
            debug!(errors = ret.errors.len(), "source does not parse, passing through");
            return Rewritten {
                code: source.to_string(),
                ..Rewritten::default()
            };
        }
        let program = &ret.program;

        let guarded = guard_key_spreads(program, source);
        self.key_rewrites += guarded.rewrites;
        let mut edits = guarded.edits;
        let mut out = Rewritten {
            parsed: true,
            ..Rewritten::default()
        };

        for stmt in &program.body {
            collect_component_candidates(stmt, &mut out.component_candidates);
            match stmt {
                Statement::ImportDeclaration(decl) => {
                    let text = self.rewrite_import(decl);
                    edits.push(Edit::new(decl.span.start, decl.span.end, text));
                }
                Statement::ExportDefaultDeclaration(decl) => {
                    self.rewrite_default_export(decl, unit, &mut out, &mut edits);
                }
                Statement::ExportNamedDeclaration(decl) => {
                    self.rewrite_named_export(decl, &mut out, &mut edits);
                }
                Statement::ExportAllDeclaration(decl) => {
                    let mut text = String::new();
                    if !decl.export_kind.is_type() {
                        let specifier = decl.source.value.as_str();
                        text = self.resolve(specifier, &[]);
                        if decl.exported.is_none() {
                            if let Some(inner) = self.exports_of(specifier) {
                                out.named_exports.extend(inner.named);
                            }
                        }
                    }
                    edits.push(Edit::new(decl.span.start, decl.span.end, text));
                }
                Statement::TSExportAssignment(decl) => {
                    edits.push(Edit::remove(decl.span.start, decl.span.end));
                }
                Statement::TSNamespaceExportDeclaration(decl) => {
                    edits.push(Edit::remove(decl.span.start, decl.span.end));
                }
                _ => {}
            }
        }

        out.code = apply_edits(source, edits);
        out
    }

    // ── imports ───────────────────────────────────────────────────────────────

    fn rewrite_import(&mut self, decl: &ImportDeclaration<'_>) -> String {
        if decl.import_kind.is_type() {
            return String::new();
        }

        let requests: Vec<Request> = match &decl.specifiers {
            None => Vec::new(),
            Some(specifiers) => {
                let requests: Vec<Request> = specifiers
                    .iter()
                    .filter_map(|specifier| match specifier {
                        ImportDeclarationSpecifier::ImportSpecifier(s) if s.import_kind.is_type() => None,
                        ImportDeclarationSpecifier::ImportSpecifier(s) => Some(Request::Named {
                            imported: s.imported.name().to_string(),
                            local: s.local.name.to_string(),
                        }),
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => Some(Request::Default {
                            local: s.local.name.to_string(),
                        }),
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            Some(Request::Namespace {
                                local: s.local.name.to_string(),
                            })
                        }
                    })
                    .collect();
                // `import { type A } from '..'` only named types.
                if requests.is_empty() && !specifiers.is_empty() {
                    return String::new();
                }
                requests
            }
        };

        self.resolve(decl.source.value.as_str(), &requests)
    }

    /// Text replacing an import (or re-export) of `specifier`.
    fn resolve(&mut self, specifier: &str, requests: &[Request]) -> String {
        if self.config.is_host_package(specifier) {
            if !self.host.iter().any(|p| p == specifier) {
                self.host.push(specifier.to_string());
            }
            let mut text = format!("/* provided by host: {} */", specifier);
            for alias in host_aliases(specifier, requests) {
                text.push('\n');
                text.push_str(&alias);
            }
            return text;
        }

        let resolved = self
            .snapshot
            .resolve(specifier)
            .map(|(path, code)| (path.to_string(), code.to_string()));
        let Some((path, code)) = resolved else {
            warn!(specifier, "module not found");
            if !self.missing.iter().any(|m| m == specifier) {
                self.missing.push(specifier.to_string());
            }
            return format!(
                "/* module not found: {} */ {}({});",
                specifier,
                MODULE_NOT_FOUND,
                js_string(specifier)
            );
        };

        let mut text = if self.visited.insert(path.clone()) {
            self.module_count += 1;
            self.inlined.push(path.clone());
            let inner = self.rewrite(&code, Unit::Module(self.module_count));
            self.exports.insert(
                path.clone(),
                ModuleExports {
                    named: inner.named_exports,
                    default: inner.default_binding,
                },
            );
            debug!(path = path.as_str(), "inlined module");
            format!(
                "/* inlined module: {} */\n{}\n/* end module: {} */",
                path, inner.code, path
            )
        } else {
            format!("/* module already inlined: {} */", path)
        };

        // Cycles reach a module before its exports are known; only direct
        // names are usable then.
        let exports = self.exports.get(&path).cloned().unwrap_or_default();
        for alias in module_aliases(&exports, requests) {
            text.push('\n');
            text.push_str(&alias);
        }
        text
    }

    fn exports_of(&self, specifier: &str) -> Option<ModuleExports> {
        let (path, _) = self.snapshot.resolve(specifier)?;
        self.exports.get(path).cloned()
    }

    // ── exports ───────────────────────────────────────────────────────────────

    fn rewrite_default_export(
        &mut self,
        decl: &ExportDefaultDeclaration<'_>,
        unit: Unit,
        out: &mut Rewritten,
        edits: &mut Vec<Edit>,
    ) {
        out.has_default_export = true;
        let inner = decl.declaration.span();

        let named = match &decl.declaration {
            ExportDefaultDeclarationKind::Identifier(ident) => {
                edits.push(Edit::remove(decl.span.start, decl.span.end));
                Some(ident.name.to_string())
            }
            ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                func.id.as_ref().map(|id| id.name.to_string())
            }
            ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                class.id.as_ref().map(|id| id.name.to_string())
            }
            ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => {
                edits.push(Edit::remove(decl.span.start, decl.span.end));
                out.has_default_export = false;
                return;
            }
            _ => None,
        };

        if let Some(name) = named {
            if !matches!(decl.declaration, ExportDefaultDeclarationKind::Identifier(_)) {
                edits.push(Edit::remove(decl.span.start, inner.start));
            }
            out.named_default = true;
            out.default_binding = Some(name);
            return;
        }

        // Anonymous: bind it to a slot.
        let slot = match unit {
            Unit::Root => self
                .config
                .default_export_slots
                .first()
                .cloned()
                .unwrap_or_else(|| "_default".to_string()),
            Unit::Module(n) => format!("__module_default_{}", n),
        };
        edits.push(Edit::new(
            decl.span.start,
            inner.start,
            format!("const {} = ", slot),
        ));
        if matches!(
            decl.declaration,
            ExportDefaultDeclarationKind::FunctionDeclaration(_)
                | ExportDefaultDeclarationKind::ClassDeclaration(_)
        ) {
            edits.push(Edit::insert(inner.end, ";".to_string()));
        }
        out.default_binding = Some(slot);
    }

    fn rewrite_named_export(
        &mut self,
        decl: &ExportNamedDeclaration<'_>,
        out: &mut Rewritten,
        edits: &mut Vec<Edit>,
    ) {
        if let Some(declaration) = &decl.declaration {
            edits.push(Edit::remove(decl.span.start, declaration.span().start));
            for name in declared_names(declaration) {
                out.named_exports.push((name.clone(), name));
            }
            return;
        }

        if decl.export_kind.is_type() {
            edits.push(Edit::remove(decl.span.start, decl.span.end));
            return;
        }

        let values = decl
            .specifiers
            .iter()
            .filter(|specifier| !specifier.export_kind.is_type());

        match &decl.source {
            // `export { a as b } from './m'`
            Some(source) => {
                let requests: Vec<Request> = values
                    .map(|specifier| {
                        let exported = specifier.exported.name().to_string();
                        out.named_exports.push((exported.clone(), exported.clone()));
                        Request::Named {
                            imported: specifier.local.name().to_string(),
                            local: exported,
                        }
                    })
                    .collect();
                let text = self.resolve(source.value.as_str(), &requests);
                edits.push(Edit::new(decl.span.start, decl.span.end, text));
            }
            None => {
                for specifier in values {
                    let local = specifier.local.name().to_string();
                    let exported = specifier.exported.name().to_string();
                    if exported == "default" {
                        out.has_default_export = true;
                        out.named_default = true;
                        out.default_binding = Some(local);
                    } else {
                        out.named_exports.push((exported, local));
                    }
                }
                edits.push(Edit::remove(decl.span.start, decl.span.end));
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(var) => var
            .declarations
            .iter()
            .flat_map(|d| d.id.get_binding_identifiers())
            .map(|id| id.name.to_string())
            .collect(),
        Declaration::FunctionDeclaration(func) => {
            func.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::ClassDeclaration(class) => {
            class.id.iter().map(|id| id.name.to_string()).collect()
        }
        _ => Vec::new(),
    }
}

fn is_capitalized(name: &str) -> bool {
    name.chars().next().map_or(false, |c| c.is_uppercase())
}

fn is_function_value(expr: &Expression<'_>) -> bool {
    match expr {
        Expression::ArrowFunctionExpression(_) | Expression::FunctionExpression(_) => true,
        Expression::ParenthesizedExpression(paren) => is_function_value(&paren.expression),
        Expression::TSAsExpression(e) => is_function_value(&e.expression),
        Expression::TSSatisfiesExpression(e) => is_function_value(&e.expression),
        _ => false,
    }
}

/// Capitalised function-valued declarations, for entry inference.
fn collect_component_candidates(stmt: &Statement<'_>, into: &mut Vec<String>) {
    let declaration = match stmt {
        Statement::ExportNamedDeclaration(export) => export.declaration.as_ref(),
        _ => stmt.as_declaration(),
    };
    match declaration {
        Some(Declaration::FunctionDeclaration(func)) => {
            if let Some(id) = func.id.as_ref().filter(|id| is_capitalized(&id.name)) {
                into.push(id.name.to_string());
            }
        }
        Some(Declaration::VariableDeclaration(var)) => {
            for d in &var.declarations {
                let (Some(name), Some(init)) = (d.id.get_identifier_name(), &d.init) else {
                    continue;
                };
                if is_capitalized(&name) && is_function_value(init) {
                    into.push(name.to_string());
                }
            }
        }
        _ => {}
    }
}

/// `const alias = name;` lines keeping injected host bindings reachable
/// under the importer's local names.
fn host_aliases(package: &str, requests: &[Request]) -> Vec<String> {
    let icons = package == ICON_PACKAGE;
    let mut aliases = Vec::new();
    for request in requests {
        match request {
            Request::Named { imported, local } => {
                let Some(binding) = host_binding(imported, icons) else {
                    continue;
                };
                if binding != *local {
                    aliases.push(format!("const {} = {};", local, binding));
                }
            }
            Request::Default { local } | Request::Namespace { local } => {
                if icons {
                    aliases.push(format!("const {} = {{ {} }};", local, ICON_NAMES.join(", ")));
                } else if local != RUNTIME_NAMESPACE {
                    aliases.push(format!("const {} = {};", local, RUNTIME_NAMESPACE));
                }
            }
        }
    }
    aliases
}

/// Name under which the binding library provides `imported`. Icon packages
/// export both `Play` and `PlayIcon`.
fn host_binding(imported: &str, icons: bool) -> Option<String> {
    let library = &*BINDING_LIBRARY;
    if library.contains(imported) {
        return Some(imported.to_string());
    }
    if !icons {
        return None;
    }
    if let Some(stem) = imported.strip_suffix("Icon") {
        if library.contains(stem) {
            return Some(stem.to_string());
        }
    }
    let suffixed = format!("{}Icon", imported);
    library.contains(&suffixed).then_some(suffixed)
}

fn module_aliases(exports: &ModuleExports, requests: &[Request]) -> Vec<String> {
    let mut aliases = Vec::new();
    for request in requests {
        match request {
            Request::Named { imported, local } => {
                let source = if imported == "default" {
                    exports.default.clone()
                } else {
                    exports
                        .named
                        .iter()
                        .find(|(exported, _)| exported == imported)
                        .map(|(_, l)| l.clone())
                }
                .unwrap_or_else(|| imported.clone());
                if source != *local {
                    aliases.push(format!("const {} = {};", local, source));
                }
            }
            Request::Default { local } => match &exports.default {
                Some(binding) if binding == local => {}
                Some(binding) => aliases.push(format!("const {} = {};", local, binding)),
                None => aliases.push(format!("const {} = undefined;", local)),
            },
            Request::Namespace { local } => {
                let mut fields: Vec<String> = exports
                    .named
                    .iter()
                    .map(|(exported, l)| format!("{}: {}", js_string(exported), l))
                    .collect();
                if let Some(binding) = &exports.default {
                    fields.push(format!("\"default\": {}", binding));
                }
                aliases.push(format!("const {} = {{ {} }};", local, fields.join(", ")));
            }
        }
    }
    aliases
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_edits_orders_and_drops_overlaps() {
        let source = "abcdef";
        let out = apply_edits(
            source,
            vec![
                Edit::new(1, 3, "X".into()),
                Edit::insert(1, "<".into()),
                Edit::new(2, 4, "Y".into()),
                Edit::insert(6, "!".into()),
            ],
        );
        assert_eq!(out, "a<Xdef!");
    }

    #[test]
    fn test_host_binding_icon_aliases() {
        assert_eq!(host_binding("Play", true), Some("Play".to_string()));
        assert_eq!(host_binding("PlayIcon", true), Some("Play".to_string()));
        assert_eq!(host_binding("Package", true), Some("PackageIcon".to_string()));
        assert_eq!(host_binding("Package", false), None);
        assert_eq!(host_binding("useState", false), Some("useState".to_string()));
    }

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string("./a\"b"), "\"./a\\\"b\"");
    }
}
