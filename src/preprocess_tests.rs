use crate::config::CompilerConfig;
use crate::error::{PreprocessError, W_MISSING_DEFAULT_EXPORT};
use crate::preprocess::{preprocess, PreprocessOutput};
use crate::registry::{Module, ModuleRegistry, RegistrySnapshot};
use pretty_assertions::assert_eq;

fn run(source: &str) -> PreprocessOutput {
    preprocess(source, &RegistrySnapshot::empty(), &CompilerConfig::default()).unwrap()
}

fn run_with(modules: &[(&str, &str)], source: &str) -> PreprocessOutput {
    let mut registry = ModuleRegistry::new();
    for (path, code) in modules {
        registry.add(Module::new(*path, *code)).unwrap();
    }
    preprocess(source, &registry.snapshot(), &CompilerConfig::default()).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY & EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_empty_source_is_rejected() {
    let err = preprocess("  \n\t", &RegistrySnapshot::empty(), &CompilerConfig::default()).unwrap_err();
    assert_eq!(err, PreprocessError::EmptySource);
    assert_eq!(err.to_string(), "Component code cannot be empty");
}

#[test]
fn test_default_export_identifier_is_entry() {
    let out = run("const X = () => null;\nexport default X;");
    assert_eq!(out.entry.as_deref(), Some("X"));
    assert!(out.has_default_export);
    assert!(!out.code.contains("export"));
    assert!(out.warnings.is_empty());
}

#[test]
fn test_default_export_function_keeps_declaration() {
    let out = run("export default function Counter() { return null; }");
    assert_eq!(out.entry.as_deref(), Some("Counter"));
    assert!(out.code.starts_with("function Counter()"));
}

#[test]
fn test_anonymous_default_goes_to_slot() {
    let out = run("export default () => <div />;");
    assert_eq!(out.entry, None);
    assert!(out.has_default_export);
    assert!(out.code.starts_with("const _default = () =>"));
}

#[test]
fn test_anonymous_default_function_is_terminated() {
    let out = run("export default function () { return null; }\nconst a = 1;");
    assert!(out.code.starts_with("const _default = function () { return null; };"));
}

#[test]
fn test_missing_default_export_warns_and_infers() {
    let out = run("const Helper = () => null;\nfunction Main() { return null; }\nconst n = 1;");
    assert_eq!(out.entry.as_deref(), Some("Main"));
    assert!(!out.has_default_export);
    assert_eq!(out.warnings.len(), 1);
    assert_eq!(out.warnings[0].code, W_MISSING_DEFAULT_EXPORT);
    assert!(out.warnings[0].message.contains("Main"));
}

#[test]
fn test_export_specifier_default() {
    let out = run("function Widget() { return null; }\nexport { Widget as default };");
    assert_eq!(out.entry.as_deref(), Some("Widget"));
    assert!(!out.code.contains("export"));
}

#[test]
fn test_named_exports_are_stripped() {
    let out = run("export const a = 1;\nexport function b() {}\nexport default b;");
    assert_eq!(out.code.trim(), "const a = 1;\nfunction b() {}");
}

#[test]
fn test_type_only_statements_removed() {
    let out = run(
        "import type { P } from './types';\nexport type { P };\nconst X = (p: P) => null;\nexport default X;",
    );
    assert!(out.missing_modules.is_empty());
    assert!(!out.code.contains("import"));
    assert!(!out.code.contains("export"));
}

#[test]
fn test_unparseable_source_passes_through() {
    let source = "const = ;";
    let out = run(source);
    assert_eq!(out.code, source);
    assert_eq!(out.entry, None);
    assert!(out.warnings.is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_host_imports_are_dropped() {
    let out = run(
        "import React, { useState } from 'react';\nimport { Play } from 'lucide-react';\nconst X = () => null;\nexport default X;",
    );
    assert_eq!(out.host_imports, vec!["react", "lucide-react"]);
    assert!(out.code.contains("/* provided by host: react */"));
    assert!(!out.code.contains("import"));
    assert!(!out.code.contains("const useState"));
    assert!(!out.code.contains("const Play"));
}

#[test]
fn test_host_import_aliases() {
    let out = run(
        "import * as R from 'react';\nimport { PlayIcon, Pause as P } from 'lucide-react';\nimport * as Icons from 'lucide-react';",
    );
    assert!(out.code.contains("const R = React;"));
    assert!(out.code.contains("const PlayIcon = Play;"));
    assert!(out.code.contains("const P = Pause;"));
    assert!(out.code.contains("const Icons = { Play, Pause,"));
}

#[test]
fn test_registry_module_is_inlined() {
    let out = run_with(
        &[("./helpers", "export const double = (n: number) => n * 2;")],
        "import { double } from './helpers';\nconst App = () => double(21);\nexport default App;",
    );
    assert_eq!(out.inlined_modules, vec!["./helpers"]);
    assert!(out.code.contains("/* inlined module: ./helpers */"));
    assert!(out.code.contains("const double = (n: number) => n * 2;"));
    assert!(out.code.contains("/* end module: ./helpers */"));
    assert!(!out.code.contains("import"));
}

#[test]
fn test_inlined_default_and_renamed_imports_get_aliases() {
    let out = run_with(
        &[(
            "./util.ts",
            "export const inc = (n) => n + 1;\nexport default function (n) { return n - 1; }",
        )],
        "import dec, { inc as plus } from './util';\nconst App = () => null;\nexport default App;",
    );
    assert!(out.code.contains("const __module_default_1 = function (n)"));
    assert!(out.code.contains("const dec = __module_default_1;"));
    assert!(out.code.contains("const plus = inc;"));
    assert_eq!(out.entry.as_deref(), Some("App"));
}

#[test]
fn test_namespace_import_of_module() {
    let out = run_with(
        &[("./m", "export const a = 1;\nconst b = 2;\nexport { b as c };")],
        "import * as M from './m';",
    );
    assert!(out.code.contains("const M = { \"a\": a, \"c\": b };"));
}

#[test]
fn test_module_inlined_once() {
    let out = run_with(
        &[
            ("./a", "import { c } from './c';\nexport const a = c;"),
            ("./b", "import { c } from './c';\nexport const b = c;"),
            ("./c", "export const c = 1;"),
        ],
        "import { a } from './a';\nimport { b } from './b';",
    );
    assert_eq!(out.inlined_modules, vec!["./a", "./c", "./b"]);
    assert_eq!(out.code.matches("/* inlined module: ./c */").count(), 1);
    assert!(out.code.contains("/* module already inlined: ./c */"));
}

#[test]
fn test_cyclic_imports_terminate() {
    let out = run_with(
        &[
            ("./a", "import { b } from './b';\nexport const a = () => b;"),
            ("./b", "import { a } from './a';\nexport const b = () => a;"),
        ],
        "import { a } from './a';",
    );
    assert_eq!(out.inlined_modules, vec!["./a", "./b"]);
    assert!(out.code.contains("/* module already inlined: ./a */"));
}

#[test]
fn test_export_star_is_flattened() {
    let out = run_with(
        &[
            ("./index", "export * from './leaf';"),
            ("./leaf", "export const leaf = 7;"),
        ],
        "import { leaf } from './index';",
    );
    assert_eq!(out.inlined_modules, vec!["./index", "./leaf"]);
    assert!(out.code.contains("const leaf = 7;"));
    assert!(!out.code.contains("const leaf = leaf"));
}

#[test]
fn test_missing_module_becomes_runtime_marker() {
    let out = run("import { x } from './missing';\nconst X = () => null;\nexport default X;");
    assert_eq!(out.missing_modules, vec!["./missing"]);
    assert!(out
        .code
        .contains("/* module not found: ./missing */ __moduleNotFound(\"./missing\");"));
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEY GUARD
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_key_spread_is_rewritten() {
    let out = run(
        "const props = { key: 'k', title: 't' };\nconst X = () => <Card {...props} />;\nexport default X;",
    );
    assert_eq!(out.key_rewrites, 1);
    assert!(out.code.contains("<Card key={'k'} {...__keySafeProps(props)} />"));
    assert!(out.code.contains("const props = { title: 't' };"));
}

#[test]
fn test_key_guard_runs_inside_inlined_modules() {
    let out = run_with(
        &[(
            "./row",
            "export const Row = () => { const p = { key: 1 }; return <li {...p} />; };",
        )],
        "import { Row } from './row';",
    );
    assert_eq!(out.key_rewrites, 1);
    assert!(out.code.contains("__keySafeProps(p)"));
}
