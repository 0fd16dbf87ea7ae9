use crate::config::CompilerConfig;
use crate::controller::{CompilationController, CompilationResult};
use crate::discovery::DiscoveryStep;
use crate::error::{Stage, W_MISSING_DEFAULT_EXPORT};
use crate::registry::Module;
use crate::value::Value;
use pretty_assertions::assert_eq;

const COUNTER: &str = r#"import React, { useState } from 'react';

interface Props { start?: number }

export default function Counter({ start = 0 }: Props) {
  const [count, setCount] = useState<number>(start);
  return (
    <Card title="Counter">
      <p>Count: {count}</p>
      <Button onClick={() => setCount(count + 1)}>Increment</Button>
    </Card>
  );
}
"#;

fn expect_error(result: &CompilationResult, stage: Stage) -> (String, String) {
    match result {
        CompilationResult::Error { error, .. } => {
            assert_eq!(error.stage, stage, "wrong stage: {}", error);
            (error.message.clone(), error.detail.clone())
        }
        other => panic!("expected {} error, got {}", stage, other.label()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// END TO END
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_counter_compiles_and_responds_to_clicks() {
    let mut controller = CompilationController::default();
    let result = controller.compile_now(COUNTER);
    let component = result.component().unwrap();
    assert_eq!(component.name, "Counter");
    assert_eq!(component.step, DiscoveryStep::EntryIdentifier);
    assert!(component.output.contains("<p>Count: 0</p>"));
    assert!(component.warnings.is_empty());

    let session = controller.session_mut().unwrap();
    let button = session.find_path(|n| n.tag() == Some("button")).unwrap();
    session.dispatch(&button, "click", Vec::new()).unwrap();
    assert!(session.to_markup().contains("<p>Count: 1</p>"));
}

#[test]
fn test_null_component_succeeds_with_empty_output() {
    let mut controller = CompilationController::default();
    let result = controller.compile_now("const X = () => null; export default X;");
    let component = result.component().unwrap();
    assert_eq!(component.name, "X");
    assert_eq!(component.output, "");
    assert!(component.session.is_empty());
}

#[test]
fn test_missing_module_fails_at_execute() {
    let mut controller = CompilationController::default();
    let result = controller.compile_now(
        "import { helper } from './missing';\nexport default function App() { return <p>{helper()}</p>; }",
    );
    let (message, detail) = expect_error(result, Stage::Execute);
    assert!(message.contains("./missing"));
    assert!(detail.contains("./missing"));
}

#[test]
fn test_no_callable_binding_fails_at_execute() {
    let mut controller = CompilationController::default();
    let result = controller.compile_now("const a = 1;\nconst b = 'two';");
    let (message, detail) = expect_error(result, Stage::Execute);
    assert_eq!(message, "no component found");
    assert!(detail.contains("a: number"));
    assert!(detail.ends_with("candidates: []"));
}

#[test]
fn test_registry_helper_is_inlined() {
    let mut controller = CompilationController::default();
    controller
        .registry()
        .borrow_mut()
        .add(Module::new(
            "./helpers",
            "export const double = (n: number): number => n * 2;",
        ))
        .unwrap();
    let result = controller.compile_now(
        "import { double } from './helpers';\nexport default function App() { return <span>{double(21)}</span>; }",
    );
    assert_eq!(result.component().unwrap().output, "<span>42</span>");
}

#[test]
fn test_helper_component_without_default_export() {
    let mut controller = CompilationController::default();
    controller
        .registry()
        .borrow_mut()
        .add(Module::new("./helpers", "export const double = n => n*2;"))
        .unwrap();
    let result = controller.compile_now("import { double } from './helpers'; const App = () => double(21);");
    let component = result.component().unwrap();
    assert_eq!(component.name, "App");
    assert_eq!(component.step, DiscoveryStep::ConventionalName);
    assert_eq!(component.output, "42");
    assert!(component
        .warnings
        .iter()
        .any(|w| w.code == W_MISSING_DEFAULT_EXPORT));

    let session = controller.session_mut().unwrap();
    let out = session.invoke_component(Value::object(Default::default())).unwrap();
    assert_eq!(out, Value::from(42.0));
}

#[test]
fn test_syntax_error_fails_at_transpile() {
    let mut controller = CompilationController::default();
    let result = controller.compile_now("export default function App() { return <div>; }");
    let (message, detail) = expect_error(result, Stage::Transpile);
    assert!(!message.is_empty());
    assert!(detail.starts_with(&message));
}

#[test]
fn test_render_throw_fails_at_render() {
    let mut controller = CompilationController::default();
    let result = controller.compile_now(
        "export default function App() { const items = undefined; return <ul>{items.map(i => <li>{i}</li>)}</ul>; }",
    );
    let (message, detail) = expect_error(result, Stage::Render);
    assert!(message.starts_with("TypeError"));
    assert_eq!(detail, "App");
}

#[test]
fn test_missing_default_export_is_a_warning() {
    let mut controller = CompilationController::default();
    let result = controller.compile_now("function Panel() { return <p>hi</p>; }");
    let component = result.component().unwrap();
    assert_eq!(component.name, "Panel");
    assert_eq!(component.warnings.len(), 1);
    assert_eq!(component.warnings[0].code, W_MISSING_DEFAULT_EXPORT);
}

#[test]
fn test_fingerprints_are_deterministic() {
    let mut first = CompilationController::default();
    let mut second = CompilationController::default();
    let a = first.compile_now(COUNTER).component().unwrap().fingerprints.clone();
    let b = second.compile_now(COUNTER).component().unwrap().fingerprints.clone();
    assert_eq!(a, b);

    let c = first
        .compile_now(&COUNTER.replace("Count:", "Total:"))
        .component()
        .unwrap()
        .fingerprints
        .clone();
    assert_ne!(a.source, c.source);
    assert_ne!(a.transpiled, c.transpiled);
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEDULING
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_empty_source_goes_idle() {
    let mut controller = CompilationController::default();
    controller.compile_now("const X = () => null; export default X;");
    assert!(controller.current_result().is_success());

    let result = controller.compile_now("   \n");
    assert!(matches!(result, CompilationResult::Idle));
    assert!(controller.last_compile_time().is_some());
}

#[test]
fn test_compile_is_lazy_until_polled() {
    let mut controller = CompilationController::default();
    controller.compile(COUNTER);
    assert!(controller.is_compiling());
    assert!(controller.last_started_at().is_none());

    // The poll that runs the render stage reports no remaining work.
    let mut polls = 0;
    while controller.poll() {
        polls += 1;
    }
    assert_eq!(polls, 4);
    assert!(controller.current_result().is_success());
}

#[test]
fn test_newer_request_supersedes_in_flight_job() {
    let mut controller = CompilationController::default();
    controller.compile("export default function First() { return <p>1</p>; }");
    controller.poll();
    controller.poll();

    controller.compile("export default function Second() { return <p>2</p>; }");
    controller.run_until_idle();
    let component = controller.current_result().component().unwrap();
    assert_eq!(component.name, "Second");
    assert_eq!(component.output, "<p>2</p>");
}

#[test]
fn test_only_latest_queued_request_runs() {
    let mut controller = CompilationController::default();
    controller.compile("export default function A() { return null; }");
    controller.compile("export default function B() { return null; }");
    controller.compile("export default function C() { return null; }");
    controller.run_until_idle();
    assert_eq!(controller.current_result().component().unwrap().name, "C");
}

#[test]
fn test_empty_request_discards_in_flight_result() {
    let mut controller = CompilationController::default();
    controller.compile("export default function A() { return null; }");
    controller.poll();
    controller.poll();
    controller.compile("");
    controller.run_until_idle();
    assert!(matches!(controller.current_result(), CompilationResult::Idle));
}

#[test]
fn test_registry_change_recompiles_last_source() {
    let mut controller = CompilationController::default();
    let source =
        "import { label } from './text';\nexport default function App() { return <p>{label}</p>; }";
    let (_, detail) = expect_error(controller.compile_now(source), Stage::Execute);
    assert!(detail.contains("./text"));

    controller
        .registry()
        .borrow_mut()
        .add(Module::new("./text.ts", "export const label = 'hello';"))
        .unwrap();
    controller.run_until_idle();
    assert_eq!(
        controller.current_result().component().unwrap().output,
        "<p>hello</p>"
    );

    controller
        .registry()
        .borrow_mut()
        .update(Module::new("./text.ts", "export const label = 'bye';"));
    controller.run_until_idle();
    assert_eq!(
        controller.current_result().component().unwrap().output,
        "<p>bye</p>"
    );
}

#[test]
fn test_in_flight_job_keeps_its_registry_snapshot() {
    let mut controller = CompilationController::default();
    controller.compile("import { label } from './b';\nexport default function App() { return <p>{label}</p>; }");
    assert!(controller.poll());

    controller
        .registry()
        .borrow_mut()
        .add(Module::new("./b", "export const label = 'B';"))
        .unwrap();
    while controller.is_compiling() {
        controller.poll();
    }
    let (message, _) = expect_error(controller.current_result(), Stage::Execute);
    assert_eq!(message, "Error: Cannot find module './b'");

    controller.run_until_idle();
    assert_eq!(
        controller.current_result().component().unwrap().output,
        "<p>B</p>"
    );
}

#[test]
fn test_added_module_supersedes_current_success() {
    let mut controller = CompilationController::default();
    controller
        .registry()
        .borrow_mut()
        .add(Module::new("./parts.ts", "export const a = 'A';\nexport const b = '';"))
        .unwrap();
    let first = controller
        .compile_now("import { a, b } from './parts';\nexport default function App() { return <p>{a}{b}</p>; }")
        .component()
        .unwrap();
    assert_eq!(first.output, "<p>A</p>");
    let first_at = first.timestamp;

    // The exact specifier now wins over the `.ts` file.
    controller
        .registry()
        .borrow_mut()
        .add(Module::new("./parts", "export const a = 'A';\nexport const b = 'B';"))
        .unwrap();
    assert!(controller.poll());
    assert!(controller.is_compiling());
    controller.run_until_idle();

    let second = controller.current_result().component().unwrap();
    assert_eq!(second.output, "<p>AB</p>");
    assert!(second.timestamp >= first_at);
}

#[test]
fn test_registry_change_without_source_does_nothing() {
    let mut controller = CompilationController::default();
    controller
        .registry()
        .borrow_mut()
        .add(Module::new("./a", "export const a = 1;"))
        .unwrap();
    assert!(!controller.poll());
    assert!(matches!(controller.current_result(), CompilationResult::Idle));
}

#[test]
fn test_custom_config_changes_jsx_factory() {
    let config = CompilerConfig::from_json(r#"{"jsx": {"factory": "h", "fragment": "Frag"}}"#).unwrap();
    let mut controller = CompilationController::new(config);
    let result = controller.compile_now("export default function App() { return <p />; }");
    let (message, _) = expect_error(result, Stage::Render);
    assert_eq!(message, "ReferenceError: h is not defined");
}
