use crate::bindings::BINDING_LIBRARY;
use crate::config::{CompilerConfig, SandboxLimits};
use crate::discovery::{candidates, discover, DiscoveredComponent, DiscoveryStep};
use crate::error::ExecutionError;
use crate::executor::{execute, BindingTable};
use pretty_assertions::assert_eq;

fn table(code: &str) -> BindingTable {
    execute(code, &BINDING_LIBRARY, SandboxLimits::default())
        .unwrap()
        .table
}

fn find(code: &str, entry: Option<&str>) -> Result<DiscoveredComponent, ExecutionError> {
    discover(&table(code), entry, &BINDING_LIBRARY, &CompilerConfig::default())
}

fn found(code: &str, entry: Option<&str>) -> (String, DiscoveryStep) {
    let c = find(code, entry).unwrap();
    (c.name, c.step)
}

#[test]
fn test_entry_identifier_wins() {
    let code = "const App = () => null; const Mine = () => null;";
    assert_eq!(
        found(code, Some("Mine")),
        ("Mine".to_string(), DiscoveryStep::EntryIdentifier)
    );
}

#[test]
fn test_non_callable_entry_falls_through() {
    let code = "const Mine = 5; const Counter = () => null;";
    assert_eq!(
        found(code, Some("Mine")),
        ("Counter".to_string(), DiscoveryStep::ConventionalName)
    );
}

#[test]
fn test_conventional_names_in_configured_order() {
    let code = "const App = () => null; const Counter = () => null;";
    assert_eq!(
        found(code, None),
        ("Counter".to_string(), DiscoveryStep::ConventionalName)
    );
}

#[test]
fn test_default_slot() {
    let code = "const Zed = () => null; const _default = () => null;";
    assert_eq!(
        found(code, None),
        ("_default".to_string(), DiscoveryStep::DefaultExportSlot)
    );
}

#[test]
fn test_app_suffix_before_last_capitalized() {
    let code = "const MainApp = () => null; const Zeta = () => null;";
    assert_eq!(
        found(code, None),
        ("MainApp".to_string(), DiscoveryStep::AppSuffix)
    );
}

#[test]
fn test_last_capitalized() {
    let code = "const Alpha = () => null; function Beta() { return null; } const gamma = () => 1; const Delta = 4;";
    assert_eq!(
        found(code, None),
        ("Beta".to_string(), DiscoveryStep::LastCapitalized)
    );
}

#[test]
fn test_any_callable_skips_internal_and_library_names() {
    let code = "const _Hidden = () => null; const helper = () => 1; const other = () => 2;";
    assert_eq!(
        found(code, None),
        ("helper".to_string(), DiscoveryStep::AnyCallable)
    );
}

#[test]
fn test_library_bindings_are_not_candidates() {
    // A local alias of a host binding is still a top-level callable.
    let t = table("const Btn = Button; const n = 1;");
    let names: Vec<String> = candidates(&t, &BINDING_LIBRARY)
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Btn"]);
}

#[test]
fn test_custom_conventional_names() {
    let config = CompilerConfig::from_json(r#"{"conventionalNames": ["Widget"]}"#).unwrap();
    let t = table("const Counter = () => null; const Widget = () => null; const Zoo = () => null;");
    let c = discover(&t, None, &BINDING_LIBRARY, &config).unwrap();
    assert_eq!(c.name, "Widget");
    assert_eq!(c.step, DiscoveryStep::ConventionalName);
}

#[test]
fn test_no_component_lists_bindings() {
    let err = find("const a = 1; const b = 'x'; const c = [];", None).unwrap_err();
    match &err {
        ExecutionError::NoComponent {
            bindings,
            candidates,
        } => {
            assert_eq!(bindings.len(), 3);
            assert!(candidates.is_empty());
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(err.to_string(), "no component found");
    assert_eq!(
        err.detail(),
        "top-level bindings: [a: number, b: string, c: array]\ncandidates: []"
    );
}
