use crate::bindings::BINDING_LIBRARY;
use crate::config::SandboxLimits;
use crate::error::{ExecutionError, W_CONSOLE};
use crate::executor::{execute, ExecutedUnit};
use crate::value::Value;

fn run(code: &str) -> ExecutedUnit {
    match execute(code, &BINDING_LIBRARY, SandboxLimits::default()) {
        Ok(unit) => unit,
        Err(err) => panic!("execution failed: {} ({})", err, err.detail()),
    }
}

fn value(code: &str, name: &str) -> Value {
    run(code)
        .table
        .get(name)
        .cloned()
        .unwrap_or_else(|| panic!("no binding `{}`", name))
}

fn text(code: &str, name: &str) -> String {
    value(code, name).to_js_string()
}

fn thrown(code: &str) -> String {
    match execute(code, &BINDING_LIBRARY, SandboxLimits::default()) {
        Err(ExecutionError::Thrown { message, .. }) => message,
        Err(other) => panic!("expected a throw, got {:?}", other),
        Ok(_) => panic!("expected a throw"),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BINDINGS & SCOPES
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_function_declarations_are_hoisted() {
    assert_eq!(value("const r = f(); function f() { return 3; }", "r"), Value::from(3.0));
}

#[test]
fn test_closures_capture_per_iteration_bindings() {
    let code = "const fs = []; for (let i = 0; i < 3; i++) { fs.push(() => i); } const r = fs.map(f => f()).join(',');";
    assert_eq!(text(code, "r"), "0,1,2");
}

#[test]
fn test_const_reassignment_throws() {
    assert_eq!(
        thrown("const a = 1; a = 2;"),
        "TypeError: Assignment to constant variable."
    );
}

#[test]
fn test_typeof_undeclared_is_undefined() {
    assert_eq!(text("const t = typeof window;", "t"), "undefined");
}

#[test]
fn test_let_before_declaration_throws() {
    assert!(thrown("const r = x; let x = 1;").starts_with("ReferenceError"));
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_destructuring_with_defaults_and_rest() {
    let code = "const { a, b: [c = 3, ...rest] = [], ...others } = { a: 1, x: 9, y: 8 }; const r = [a, c, rest.length, Object.keys(others).join('')].join(' ');";
    assert_eq!(text(code, "r"), "1 3 0 xy");
}

#[test]
fn test_optional_chaining_and_nullish() {
    let code = "const o = null; const a = o?.x.y ?? 'd'; const f = o?.(); const n = { v: 0 }; const b = n.v ?? 5; const c = n.v || 5;";
    let unit = run(code);
    assert_eq!(unit.table.get("a"), Some(&Value::from("d")));
    assert_eq!(unit.table.get("f"), Some(&Value::Undefined));
    assert_eq!(unit.table.get("b"), Some(&Value::from(0.0)));
    assert_eq!(unit.table.get("c"), Some(&Value::from(5.0)));
}

#[test]
fn test_template_literals_and_string_methods() {
    let code = "const n = 'ada'; const r = `hi ${n.toUpperCase()} ${[1, 2]}`.padEnd(14, '.');";
    assert_eq!(text(code, "r"), "hi ADA 1,2....");
}

#[test]
fn test_string_length_and_indexing_agree() {
    let code = "const s = 'a😀'; const r = [s.length, s[s.length - 1], s.at(-1), s.slice(1), s.indexOf('😀'), [...s].length].join('|');";
    assert_eq!(text(code, "r"), "2|😀|😀|😀|1|2");
}

#[test]
fn test_regexp_literals() {
    let code = r#"const re = /(\d+)-(\w+)/;
const m = re.exec('id 42-abc');
const r = [re.test('x'), m[1], m[2], typeof re, re.source, String(/a\/b/gi)].join('|');"#;
    assert_eq!(text(code, "r"), "false|42|abc|object|(\\d+)-(\\w+)|/a\\/b/gi");
}

#[test]
fn test_string_methods_accept_regexps() {
    let code = r#"const s = 'Hello World';
const r = [
  s.replace(/o/g, '0'),
  s.replace(/(\w+) (\w+)/, '$2 $1'),
  'a-b_c'.split(/[-_]/).join(','),
  s.match(/l+/g).join(','),
  s.search(/W/),
  'x1y22'.replace(/\d+/g, d => `[${d.length}]`),
  [...'a1b2'.matchAll(/\d/g)].map(m => m[0]).join(''),
].join('|');"#;
    assert_eq!(text(code, "r"), "Hell0 W0rld|World Hello|a,b,c|ll,l|6|x[1]y[2]|12");
}

#[test]
fn test_global_regexp_test_is_stateful() {
    let code = "const re = /a/g; const r = [re.test('aa'), re.lastIndex, re.test('aa'), re.test('aa'), re.lastIndex].join(',');";
    assert_eq!(text(code, "r"), "true,1,true,false,0");
}

#[test]
fn test_regexp_constructor_and_bad_patterns() {
    assert_eq!(text("const r = new RegExp('b+', 'i').test('aBBc');", "r"), "true");
    assert!(thrown("const r = new RegExp('(');").starts_with("SyntaxError: Invalid regular expression"));
    assert!(thrown("const r = 'a'.replaceAll(/a/, 'b');").starts_with("TypeError"));
    match execute("const r = /(?<=a)b/;", &BINDING_LIBRARY, SandboxLimits::default()) {
        Err(ExecutionError::Syntax { message }) => {
            assert!(message.starts_with("Invalid regular expression: /(?<=a)b/"))
        }
        Err(other) => panic!("unexpected: {:?}", other),
        Ok(_) => panic!("look-behind should be rejected"),
    }
}

#[test]
fn test_spread_in_calls_arrays_and_objects() {
    let code = "const xs = [1, 2]; const m = Math.max(...xs, 0); const ys = [0, ...xs]; const o = { ...{ a: 1 }, b: 2 }; const r = `${m} ${ys} ${o.a + o.b}`;";
    assert_eq!(text(code, "r"), "2 0,1,2 3");
}

#[test]
fn test_array_pipeline() {
    let code = "const r = [3, 1, 2].sort((a, b) => a - b).map(x => x * 2).filter(x => x > 2).reduce((s, x) => s + x, 0);";
    assert_eq!(value(code, "r"), Value::from(10.0));
}

#[test]
fn test_loose_and_strict_equality() {
    let code = "const r = [1 == '1', 1 === '1', null == undefined, null === undefined, NaN === NaN].join();";
    assert_eq!(text(code, "r"), "true,false,true,false,false");
}

#[test]
fn test_number_to_string() {
    let code = "const r = [0.1 + 0.2, 1 / 0, -0, 1e21, (1.005).toFixed(2), 255 .toString(16)].join(' ');";
    assert_eq!(text(code, "r"), "0.30000000000000004 Infinity 0 1e+21 1.00 ff");
}

#[test]
fn test_json_round_trip() {
    let code = "const r = JSON.stringify(JSON.parse('{\"a\":[1,true,null],\"b\":\"x\"}'));";
    assert_eq!(text(code, "r"), "{\"a\":[1,true,null],\"b\":\"x\"}");
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTROL FLOW
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_try_catch_finally() {
    let code = "const log = []; try { null.x; } catch (e) { log.push(e.name); } finally { log.push('f'); } const r = log.join();";
    assert_eq!(text(code, "r"), "TypeError,f");
}

#[test]
fn test_switch_falls_through() {
    let code = "let r = ''; switch (2) { case 1: r += 'a'; case 2: r += 'b'; case 3: r += 'c'; break; default: r += 'd'; }";
    assert_eq!(text(code, "r"), "bc");
}

#[test]
fn test_for_of_and_for_in() {
    let code = "let s = 0; for (const x of [1, 2, 3]) { if (x === 2) continue; s += x; } let k = ''; for (const key in { a: 1, b: 2 }) k += key;";
    let unit = run(code);
    assert_eq!(unit.table.get("s"), Some(&Value::from(4.0)));
    assert_eq!(unit.table.get("k"), Some(&Value::from("ab")));
}

#[test]
fn test_thrown_error_object_message() {
    assert_eq!(thrown("throw new Error('boom');"), "Error: boom");
}

#[test]
fn test_calling_non_function_is_type_error() {
    assert!(thrown("const o = {}; o.missing();").starts_with("TypeError"));
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIMITS & HOST
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_unbounded_recursion_is_range_error() {
    let message = thrown("function f() { return f(); } f();");
    assert!(message.starts_with("RangeError"), "{}", message);
}

#[test]
fn test_recursion_up_to_call_limit_completes() {
    let code = "function depth(n) { return n === 0 ? 0 : 1 + depth(n - 1); } const d = depth(250);";
    assert_eq!(value(code, "d"), Value::from(250.0));
}

#[test]
fn test_long_expression_chain_evaluates() {
    let code = format!("const n = {};", vec!["1"; 900].join(" + "));
    assert_eq!(value(&code, "n"), Value::from(900.0));
}

#[test]
fn test_excessive_nesting_is_rejected_before_running() {
    let code = format!("const n = {};", vec!["1"; 1_500].join(" + "));
    match execute(&code, &BINDING_LIBRARY, SandboxLimits::default()) {
        Err(err @ ExecutionError::TooDeep { limit: 1_000 }) => {
            assert!(err.detail().contains("maxNestingDepth"));
        }
        Err(other) => panic!("unexpected: {:?}", other),
        Ok(_) => panic!("nesting should be rejected"),
    }
}

#[test]
fn test_oversized_arrays_are_range_errors() {
    assert_eq!(
        thrown("const a = []; a[4000000000] = 1;"),
        "RangeError: Invalid array length: 4000000001 exceeds the sandbox limit of 4194304"
    );
    assert!(thrown("const a = Array(1e10);").starts_with("RangeError: Invalid array length"));
    assert!(thrown("const a = []; a.length = -1;").starts_with("RangeError: Invalid array length"));
    assert_eq!(value("const a = Array(3); const n = a.length;", "n"), Value::from(3.0));
}

#[test]
fn test_oversized_strings_are_range_errors() {
    assert_eq!(thrown("const s = 'ab'.repeat(1e11);"), "RangeError: Invalid string length");
    assert_eq!(thrown("const s = 'x'.padStart(1e12);"), "RangeError: Invalid string length");
    assert_eq!(thrown("const s = 'ab'.repeat(2 ** 28);"), "RangeError: Invalid string length");
    assert_eq!(text("const s = 'ab'.repeat(NaN) + '|';", "s"), "|");
}

#[test]
fn test_console_is_captured() {
    let unit = run("console.log('a', 1, { b: 2 }); console.warn('careful');");
    assert_eq!(unit.interpreter.console_output().len(), 2);
    assert!(unit.interpreter.console_output()[0].starts_with("a 1"));
    let warnings: Vec<_> = unit
        .interpreter
        .diagnostics()
        .iter()
        .filter(|d| d.code == W_CONSOLE)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("careful"));
}

#[test]
fn test_library_values_are_fresh_per_execution() {
    let first = run("React.marker = 1; const r = React.marker;");
    assert_eq!(first.table.get("r"), Some(&Value::from(1.0)));
    let second = run("const r = React.marker;");
    assert_eq!(second.table.get("r"), Some(&Value::Undefined));
}

#[test]
fn test_library_helpers_are_reachable() {
    let code = "const c = classNames('a', false, 'b', null); const el = React.createElement('div', null); const p = typeof useState;";
    let unit = run(code);
    assert_eq!(unit.table.get("c"), Some(&Value::from("a b")));
    assert_eq!(unit.table.get("p"), Some(&Value::from("function")));
}
