use crate::bindings::BINDING_LIBRARY;
use crate::config::CompilerConfig;
use crate::discovery::discover;
use crate::error::{RuntimeError, W_KEY_IN_SPREAD};
use crate::executor::execute;
use crate::preprocess::preprocess;
use crate::registry::RegistrySnapshot;
use crate::render::{first_render, synthetic_event, RenderNode, RenderSession};
use crate::transpile::transpile;
use crate::value::{Value, ValueKind};
use pretty_assertions::assert_eq;

fn try_mount(source: &str) -> Result<RenderSession, RuntimeError> {
    let config = CompilerConfig::default();
    let pre = preprocess(source, &RegistrySnapshot::empty(), &config).unwrap();
    let js = transpile(&pre.code, &config).unwrap();
    let unit = execute(&js.code, &BINDING_LIBRARY, config.sandbox).unwrap();
    let found = discover(&unit.table, pre.entry.as_deref(), &BINDING_LIBRARY, &config).unwrap();
    first_render(found.value, unit.interpreter)
}

fn mount(source: &str) -> RenderSession {
    try_mount(source).unwrap()
}

fn path_of(session: &RenderSession, tag: &str) -> Vec<usize> {
    session
        .find_path(|n| n.tag() == Some(tag))
        .unwrap_or_else(|| panic!("no <{}> in {}", tag, session.to_markup()))
}

fn text_of(session: &RenderSession, tag: &str) -> String {
    let path = path_of(session, tag);
    session.node(&path).map(RenderNode::text).unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKUP
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_component_returning_null_renders_nothing() {
    let session = mount("const X = () => null;\nexport default X;");
    assert!(session.is_empty());
    assert_eq!(session.to_markup(), "");
}

#[test]
fn test_fragment_children_are_flattened() {
    let session = mount("export default function F() { return <><b>1</b><i>2</i></>; }");
    assert_eq!(session.tree().len(), 2);
    assert_eq!(session.to_markup(), "<b>1</b><i>2</i>");
}

#[test]
fn test_keyed_list() {
    let session = mount(
        "const items = ['a', 'b'];\nexport default function L() { return <ul>{items.map(i => <li key={i}>{i}</li>)}</ul>; }",
    );
    assert_eq!(session.to_markup(), "<ul><li>a</li><li>b</li></ul>");
    match session.node(&[0, 1]) {
        Some(RenderNode::Element { key, attributes, .. }) => {
            assert_eq!(key.as_deref(), Some("b"));
            assert!(!attributes.contains_key("key"));
        }
        other => panic!("unexpected node: {:?}", other),
    }
}

#[test]
fn test_ui_primitives_render_host_markup() {
    let session = mount("export default () => <Card title=\"T\"><Button>Go</Button></Card>;");
    let markup = session.to_markup();
    assert!(markup.contains("<h3 class=\"text-xl font-bold mb-4\">T</h3>"));
    assert!(markup
        .contains("<button class=\"px-4 py-2 bg-blue-500 text-white rounded hover:bg-blue-600\">Go</button>"));
}

#[test]
fn test_icons_render_as_svg() {
    let session = mount("import { Play } from 'lucide-react';\nexport default () => <Play size={16} />;");
    let markup = session.to_markup();
    assert!(markup.starts_with("<svg data-icon=\"Play\" width=\"16\" height=\"16\""));
}

#[test]
fn test_attribute_whitespace_is_preserved() {
    let session = mount(
        "export default () => <div><input placeholder=\"  spaced  \" /><Text>t</Text><Text className=\"  lead \">u</Text></div>;",
    );
    let markup = session.to_markup();
    assert!(markup.contains("<input placeholder=\"  spaced  \" />"), "{}", markup);
    assert!(markup.contains("<p class=\"text-base font-normal\">t</p>"), "{}", markup);
    assert!(markup.contains("<p class=\"text-base font-normal lead\">u</p>"), "{}", markup);
}

#[test]
fn test_style_object_becomes_css() {
    let session = mount("export default () => <div style={{ marginTop: 4, color: 'red' }} />;");
    assert_eq!(session.to_markup(), "<div style=\"margin-top: 4; color: red\"></div>");
}

#[test]
fn test_entities_and_whitespace_in_text() {
    let session = mount(
        "export default function T() {\n  return (\n    <p>\n      a &amp; b\n      &lt;c&gt;\n    </p>\n  );\n}",
    );
    assert_eq!(session.text(), "a & b <c>");
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOOKS & EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_click_updates_state() {
    let mut session = mount(
        r#"import { useState } from 'react';
export default function Counter() {
  const [count, setCount] = useState(0);
  return (
    <div>
      <p>Count: {count}</p>
      <button onClick={() => setCount(c => c + 1)}>+</button>
    </div>
  );
}"#,
    );
    assert_eq!(session.to_markup(), "<div><p>Count: 0</p><button>+</button></div>");

    let button = path_of(&session, "button");
    session.dispatch(&button, "click", Vec::new()).unwrap();
    session.dispatch(&button, "onClick", Vec::new()).unwrap();
    assert_eq!(text_of(&session, "p"), "Count: 2");
}

#[test]
fn test_change_event_carries_target_value() {
    let mut session = mount(
        "const Echo = () => { const [v, setV] = useState(''); return <div><input value={v} onChange={e => setV(e.target.value)} /><span>{v}</span></div>; };\nexport default Echo;",
    );
    let input = path_of(&session, "input");
    session
        .dispatch(&input, "change", vec![synthetic_event(Some("hey"))])
        .unwrap();
    assert_eq!(text_of(&session, "span"), "hey");
    assert_eq!(
        session.node(&input).and_then(|n| n.attribute("value")),
        Some(&Value::from("hey"))
    );
}

#[test]
fn test_missing_handler_is_error() {
    let mut session = mount("export default () => <p>x</p>;");
    let err = session.dispatch(&[0], "click", Vec::new()).unwrap_err();
    assert!(err.message.contains("no onClick handler"));
}

#[test]
fn test_mount_effect_settles_in_second_pass() {
    let session = mount(
        "export default function Loader() {\n  const [status, setStatus] = useState('loading');\n  useEffect(() => { setStatus('ready'); }, []);\n  return <p>{status}</p>;\n}",
    );
    assert_eq!(session.text(), "ready");
    assert_eq!(session.passes(), 2);
}

#[test]
fn test_interval_ticks_on_virtual_clock() {
    let mut session = mount(
        r#"const Clock = () => {
  const [ticks, setTicks] = useState(0);
  useEffect(() => {
    const id = setInterval(() => setTicks(t => t + 1), 1000);
    return () => clearInterval(id);
  }, []);
  return <span>{ticks}</span>;
};
export default Clock;"#,
    );
    assert_eq!(session.text(), "0");
    assert_eq!(session.pending_timers(), 1);

    assert_eq!(session.advance_timers(3500.0).unwrap(), 3);
    assert_eq!(session.text(), "3");
}

#[test]
fn test_unmount_runs_effect_cleanup() {
    let mut session = mount(
        r#"function Child() {
  useEffect(() => { console.log('mount'); return () => console.log('unmount'); }, []);
  return <i>child</i>;
}
export default function Toggle() {
  const [on, setOn] = useState(true);
  return <div><button onClick={() => setOn(!on)}>t</button>{on ? <Child /> : null}</div>;
}"#,
    );
    assert_eq!(session.interpreter().console_output(), ["mount"]);

    let button = path_of(&session, "button");
    session.dispatch(&button, "click", Vec::new()).unwrap();
    assert_eq!(session.to_markup(), "<div><button>t</button></div>");
    assert_eq!(session.interpreter().console_output(), ["mount", "unmount"]);
}

#[test]
fn test_memo_callback_and_ref_persist() {
    let mut session = mount(
        r#"export default function M() {
  const [n, setN] = useState(0);
  const cb = useCallback(() => 1, []);
  const first = useRef(cb);
  const doubled = useMemo(() => n * 2, [n]);
  return (
    <div>
      <button onClick={() => setN(n + 1)}>inc</button>
      <span>{doubled}</span>
      <em>{first.current === cb ? 'same' : 'new'}</em>
    </div>
  );
}"#,
    );
    let button = path_of(&session, "button");
    session.dispatch(&button, "click", Vec::new()).unwrap();
    assert_eq!(text_of(&session, "span"), "2");
    assert_eq!(text_of(&session, "em"), "same");
}

#[test]
fn test_key_in_spread_is_dropped_with_warning() {
    let session = mount(
        r#"const rows = [{ key: 'x', label: 'X' }];
function Row(props) { return <li>{props.label}{props.key === undefined ? '' : '!'}</li>; }
export default function T() { return <ul>{rows.map(r => <Row {...r} />)}</ul>; }"#,
    );
    assert_eq!(session.to_markup(), "<ul><li>X</li></ul>");
    assert!(session
        .interpreter()
        .diagnostics()
        .iter()
        .any(|d| d.code == W_KEY_IN_SPREAD));
}

#[test]
fn test_invoke_component_with_props() {
    let mut session = mount("export default function Greet({ name = 'you' }) { return <b>hi {name}</b>; }");
    assert_eq!(session.to_markup(), "<b>hi you</b>");
    let out = session
        .invoke_component(Value::object_from([("name", Value::from("Ann"))]))
        .unwrap();
    assert_eq!(out.kind(), ValueKind::Element);
}

// ═══════════════════════════════════════════════════════════════════════════════
// FAILURES
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_render_error_names_component_stack() {
    let err = try_mount(
        "function Broken() { throw new Error('bad'); }\nexport default function App() { return <div><Broken /></div>; }",
    )
    .unwrap_err();
    assert_eq!(err.message, "Error: bad");
    assert_eq!(err.detail, "App > Broken");
}

#[test]
fn test_state_loop_is_reported() {
    let err = try_mount(
        "export default function Loop() { const [n, setN] = useState(0); setN(n + 1); return <p>{n}</p>; }",
    )
    .unwrap_err();
    assert!(err.message.starts_with("Too many re-renders"));
    assert_eq!(err.detail, "Loop");
}

#[test]
fn test_object_child_is_rejected() {
    let err = try_mount("export default () => <p>{{ a: 1 }}</p>;").unwrap_err();
    assert!(err.message.contains("Objects are not valid as a child"));
}

#[test]
fn test_deep_component_tree_is_bounded() {
    let nest = "function Nest({ n }) { return n === 0 ? <i>end</i> : <b><Nest n={n - 1} /></b>; }";
    let session = mount(&format!(
        "{}\nexport default function App() {{ return <Nest n={{300}} />; }}",
        nest
    ));
    assert_eq!(text_of(&session, "i"), "end");

    let err = try_mount(&format!(
        "{}\nexport default function App() {{ return <Nest n={{600}} />; }}",
        nest
    ))
    .unwrap_err();
    assert_eq!(err.message, "RangeError: render tree nests deeper than 1000 levels");
    assert!(err.detail.starts_with("App > Nest > Nest"));
}

#[test]
fn test_dropping_session_frees_realm() {
    let config = CompilerConfig::default();
    let source = "export default function Tally() { const [n, setN] = useState(0); const bump = () => setN(n + 1); return <button onClick={bump}>{n}</button>; }";
    let pre = preprocess(source, &RegistrySnapshot::empty(), &config).unwrap();
    let js = transpile(&pre.code, &config).unwrap();
    let unit = execute(&js.code, &BINDING_LIBRARY, config.sandbox).unwrap();
    let found = discover(&unit.table, pre.entry.as_deref(), &BINDING_LIBRARY, &config).unwrap();
    let alive = unit.scope.liveness();

    let mut session = first_render(found.value, unit.interpreter).unwrap();
    drop(unit.table);
    drop(unit.scope);
    let button = path_of(&session, "button");
    session.dispatch(&button, "click", Vec::new()).unwrap();
    assert_eq!(session.text(), "1");
    assert!(alive());

    drop(session);
    assert!(!alive());
}

#[test]
fn test_non_callable_component_is_rejected() {
    let interpreter = crate::interpreter::Interpreter::new(Default::default());
    let err = first_render(Value::from(3.0), interpreter).unwrap_err();
    assert!(err.message.ends_with("is not a component"));
}
