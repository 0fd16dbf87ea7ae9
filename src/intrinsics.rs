//! Built-in globals and prototype methods available to every program.

use rustc_hash::FxHashMap;
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::error::{Diagnostic, W_CONSOLE};
use crate::interpreter::{
    own_keys, relative_index, to_property_key, trace_call, EvalResult, Interpreter,
};
use crate::regexp::{self, CompiledRegExp, RegExpObject};
use crate::scope::Scope;
use crate::value::{format_number, make_error, PropertyMap, Value, MAX_STRING_LENGTH};

/// `Date.now()` reads the virtual clock offset from this epoch.
const VIRTUAL_EPOCH_MS: f64 = 1_700_000_000_000.0;

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn props<'k>(entries: impl IntoIterator<Item = (&'k str, Value)>) -> PropertyMap {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn number_fn(name: &'static str, f: fn(f64) -> f64) -> (&'static str, Value) {
    (
        name,
        Value::native(name, move |_, _, args| Ok(Value::Number(f(arg(&args, 0).to_number())))),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// GLOBALS
// ═══════════════════════════════════════════════════════════════════════════════

/// Declares the language globals in the outermost realm scope.
pub fn install_globals(scope: &Scope) {
    scope.declare("undefined", Value::Undefined, false);
    scope.declare("NaN", Value::Number(f64::NAN), false);
    scope.declare("Infinity", Value::Number(f64::INFINITY), false);
    scope.declare("Math", math(), false);
    scope.declare("JSON", json(), false);
    scope.declare("console", console(), false);
    scope.declare("Object", object_constructor(), false);
    scope.declare("Array", array_constructor(), false);
    scope.declare("String", string_constructor(), false);
    scope.declare("Number", number_constructor(), false);
    scope.declare(
        "Boolean",
        Value::native("Boolean", |_, _, args| Ok(Value::Bool(arg(&args, 0).is_truthy()))),
        false,
    );
    for name in [
        "Error",
        "TypeError",
        "RangeError",
        "ReferenceError",
        "SyntaxError",
    ] {
        scope.declare(name, error_constructor(name), false);
    }
    scope.declare(
        "parseInt",
        Value::native("parseInt", |_, _, args| {
            Ok(Value::Number(parse_int(&arg(&args, 0).to_js_string(), &arg(&args, 1))))
        }),
        false,
    );
    scope.declare(
        "parseFloat",
        Value::native("parseFloat", |_, _, args| {
            Ok(Value::Number(parse_float(&arg(&args, 0).to_js_string())))
        }),
        false,
    );
    scope.declare(
        "isNaN",
        Value::native("isNaN", |_, _, args| Ok(Value::Bool(arg(&args, 0).to_number().is_nan()))),
        false,
    );
    scope.declare(
        "isFinite",
        Value::native("isFinite", |_, _, args| {
            Ok(Value::Bool(arg(&args, 0).to_number().is_finite()))
        }),
        false,
    );
    scope.declare("Date", date_constructor(), false);
    scope.declare("RegExp", regexp::constructor(), false);
    scope.declare("setTimeout", timer_fn("setTimeout", false), false);
    scope.declare("setInterval", timer_fn("setInterval", true), false);
    scope.declare("clearTimeout", clear_timer_fn("clearTimeout"), false);
    scope.declare("clearInterval", clear_timer_fn("clearInterval"), false);
}

fn math() -> Value {
    thread_local! {
        static SEED: Cell<u64> = const { Cell::new(0x2545_f491_4f6c_dd1d) };
    }

    let mut entries = vec![
        ("PI", Value::Number(std::f64::consts::PI)),
        ("E", Value::Number(std::f64::consts::E)),
        number_fn("abs", f64::abs),
        number_fn("floor", f64::floor),
        number_fn("ceil", f64::ceil),
        number_fn("trunc", f64::trunc),
        number_fn("sqrt", f64::sqrt),
        number_fn("cbrt", f64::cbrt),
        number_fn("exp", f64::exp),
        number_fn("log", f64::ln),
        number_fn("log2", f64::log2),
        number_fn("log10", f64::log10),
        number_fn("sin", f64::sin),
        number_fn("cos", f64::cos),
        number_fn("tan", f64::tan),
        number_fn("round", |n| (n + 0.5).floor()),
        number_fn("sign", |n| {
            if n.is_nan() || n == 0.0 {
                n
            } else {
                n.signum()
            }
        }),
    ];
    entries.push((
        "pow",
        Value::native("pow", |_, _, args| {
            Ok(Value::Number(arg(&args, 0).to_number().powf(arg(&args, 1).to_number())))
        }),
    ));
    entries.push((
        "atan2",
        Value::native("atan2", |_, _, args| {
            Ok(Value::Number(arg(&args, 0).to_number().atan2(arg(&args, 1).to_number())))
        }),
    ));
    entries.push((
        "hypot",
        Value::native("hypot", |_, _, args| {
            Ok(Value::Number(args.iter().map(|v| v.to_number().powi(2)).sum::<f64>().sqrt()))
        }),
    ));
    entries.push((
        "min",
        Value::native("min", |_, _, args| {
            Ok(Value::Number(args.iter().map(Value::to_number).fold(
                f64::INFINITY,
                |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.min(n) },
            )))
        }),
    ));
    entries.push((
        "max",
        Value::native("max", |_, _, args| {
            Ok(Value::Number(args.iter().map(Value::to_number).fold(
                f64::NEG_INFINITY,
                |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(n) },
            )))
        }),
    ));
    // Deterministic xorshift so renders are reproducible.
    entries.push((
        "random",
        Value::native("random", |_, _, _| {
            let next = SEED.with(|seed| {
                let mut x = seed.get();
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                seed.set(x);
                x
            });
            Ok(Value::Number((next >> 11) as f64 / (1u64 << 53) as f64))
        }),
    ));
    Value::object_from(entries)
}

fn console() -> Value {
    fn level(name: &'static str) -> (&'static str, Value) {
        (
            name,
            Value::native(name, move |interp, _, args| {
                let line = args
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.to_string(),
                        other => other.inspect(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                match name {
                    "warn" | "error" => {
                        warn!(target: "sandbox::console", level = name, "{}", line);
                        interp.push_diagnostic(Diagnostic::new(
                            W_CONSOLE,
                            format!("console.{}: {}", name, line),
                        ));
                    }
                    "debug" => debug!(target: "sandbox::console", "{}", line),
                    _ => info!(target: "sandbox::console", level = name, "{}", line),
                }
                interp.record_console(line);
                Ok(Value::Undefined)
            }),
        )
    }
    Value::object_from([
        level("log"),
        level("info"),
        level("debug"),
        level("warn"),
        level("error"),
    ])
}

fn error_constructor(name: &'static str) -> Value {
    Value::native(name, move |_, _, args| {
        let message = match arg(&args, 0) {
            Value::Undefined => String::new(),
            other => other.to_js_string(),
        };
        Ok(make_error(name, &message))
    })
}

fn object_constructor() -> Value {
    let statics = props([
        (
            "keys",
            Value::native("keys", |_, _, args| {
                Ok(Value::array(own_keys(&arg(&args, 0)).into_iter().map(Value::from).collect()))
            }),
        ),
        (
            "values",
            Value::native("values", |interp, _, args| {
                let target = arg(&args, 0);
                let mut out = Vec::new();
                for key in own_keys(&target) {
                    out.push(interp.get_property(&target, &key)?);
                }
                Ok(Value::array(out))
            }),
        ),
        (
            "entries",
            Value::native("entries", |interp, _, args| {
                let target = arg(&args, 0);
                let mut out = Vec::new();
                for key in own_keys(&target) {
                    let v = interp.get_property(&target, &key)?;
                    out.push(Value::array(vec![Value::from(key), v]));
                }
                Ok(Value::array(out))
            }),
        ),
        (
            "assign",
            Value::native("assign", |interp, _, args| {
                let target = arg(&args, 0);
                for source in args.iter().skip(1) {
                    for key in own_keys(source) {
                        let v = interp.get_property(source, &key)?;
                        interp.set_property(&target, &key, v)?;
                    }
                }
                Ok(target)
            }),
        ),
        (
            "fromEntries",
            Value::native("fromEntries", |interp, _, args| {
                let out = Value::object(PropertyMap::new());
                for entry in interp.iterate(&arg(&args, 0))? {
                    let key = interp.get_property(&entry, "0")?;
                    let value = interp.get_property(&entry, "1")?;
                    interp.set_property(&out, &to_property_key(&key), value)?;
                }
                Ok(out)
            }),
        ),
        (
            "freeze",
            Value::native("freeze", |_, _, args| Ok(arg(&args, 0))),
        ),
        (
            "is",
            Value::native("is", |_, _, args| {
                Ok(Value::Bool(arg(&args, 0).same_value(&arg(&args, 1))))
            }),
        ),
        (
            "create",
            Value::native("create", |_, _, _| Ok(Value::object(PropertyMap::new()))),
        ),
    ]);
    Value::native_with_props(
        "Object",
        |_, _, args| {
            Ok(match arg(&args, 0) {
                v @ (Value::Object(_) | Value::Array(_) | Value::Function(_)) => v,
                _ => Value::object(PropertyMap::new()),
            })
        },
        statics,
    )
}

fn array_constructor() -> Value {
    let statics = props([
        (
            "isArray",
            Value::native("isArray", |_, _, args| {
                Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_))))
            }),
        ),
        (
            "of",
            Value::native("of", |_, _, args| Ok(Value::array(args))),
        ),
        (
            "from",
            Value::native("from", |interp, _, args| {
                let source = arg(&args, 0);
                let items = match &source {
                    Value::Array(_) | Value::String(_) => interp.iterate(&source)?,
                    Value::Object(_) => {
                        let len = interp.get_property(&source, "length")?.to_number();
                        let len = if len.is_finite() && len > 0.0 {
                            interp.array_length(len.trunc())?
                        } else {
                            0
                        };
                        let mut items = Vec::with_capacity(len);
                        for i in 0..len {
                            items.push(interp.get_property(&source, &i.to_string())?);
                        }
                        items
                    }
                    _ => Vec::new(),
                };
                let map_fn = arg(&args, 1);
                if !map_fn.is_callable() {
                    return Ok(Value::array(items));
                }
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    out.push(interp.call(&map_fn, Value::Undefined, vec![item, Value::Number(i as f64)])?);
                }
                Ok(Value::array(out))
            }),
        ),
    ]);
    Value::native_with_props(
        "Array",
        |interp, _, args| {
            if let [Value::Number(n)] = args.as_slice() {
                let len = interp.array_length(*n)?;
                return Ok(Value::array(vec![Value::Undefined; len]));
            }
            Ok(Value::array(args))
        },
        statics,
    )
}

fn string_constructor() -> Value {
    let statics = props([(
        "fromCharCode",
        Value::native("fromCharCode", |_, _, args| {
            let s: String = args
                .iter()
                .filter_map(|v| char::from_u32(v.to_number() as u32))
                .collect();
            Ok(Value::from(s))
        }),
    )]);
    Value::native_with_props(
        "String",
        |_, _, args| {
            Ok(Value::from(match args.first() {
                Some(v) => v.to_js_string(),
                None => String::new(),
            }))
        },
        statics,
    )
}

fn number_constructor() -> Value {
    let statics = props([
        ("MAX_SAFE_INTEGER", Value::Number(9_007_199_254_740_991.0)),
        ("MIN_SAFE_INTEGER", Value::Number(-9_007_199_254_740_991.0)),
        ("EPSILON", Value::Number(f64::EPSILON)),
        ("MAX_VALUE", Value::Number(f64::MAX)),
        ("POSITIVE_INFINITY", Value::Number(f64::INFINITY)),
        ("NEGATIVE_INFINITY", Value::Number(f64::NEG_INFINITY)),
        ("NaN", Value::Number(f64::NAN)),
        (
            "isInteger",
            Value::native("isInteger", |_, _, args| {
                Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0)))
            }),
        ),
        (
            "isSafeInteger",
            Value::native("isSafeInteger", |_, _, args| {
                Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n)
                    if n.is_finite() && n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0)))
            }),
        ),
        (
            "isNaN",
            Value::native("isNaN", |_, _, args| {
                Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_nan())))
            }),
        ),
        (
            "isFinite",
            Value::native("isFinite", |_, _, args| {
                Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_finite())))
            }),
        ),
        (
            "parseFloat",
            Value::native("parseFloat", |_, _, args| {
                Ok(Value::Number(parse_float(&arg(&args, 0).to_js_string())))
            }),
        ),
        (
            "parseInt",
            Value::native("parseInt", |_, _, args| {
                Ok(Value::Number(parse_int(&arg(&args, 0).to_js_string(), &arg(&args, 1))))
            }),
        ),
    ]);
    Value::native_with_props(
        "Number",
        |_, _, args| Ok(Value::Number(args.first().map_or(0.0, Value::to_number))),
        statics,
    )
}

fn date_constructor() -> Value {
    fn date_object(ms: f64) -> Value {
        Value::object_from([
            ("getTime", Value::native("getTime", move |_, _, _| Ok(Value::Number(ms)))),
            ("valueOf", Value::native("valueOf", move |_, _, _| Ok(Value::Number(ms)))),
            (
                "toISOString",
                Value::native("toISOString", move |_, _, _| Ok(Value::from(format!("@{}", format_number(ms))))),
            ),
        ])
    }
    let statics = props([(
        "now",
        Value::native("now", |interp, _, _| {
            Ok(Value::Number(VIRTUAL_EPOCH_MS + interp.host.timers.now()))
        }),
    )]);
    Value::native_with_props(
        "Date",
        |interp, _, args| {
            let ms = match args.first() {
                Some(v) => v.to_number(),
                None => VIRTUAL_EPOCH_MS + interp.host.timers.now(),
            };
            Ok(date_object(ms))
        },
        statics,
    )
}

fn timer_fn(name: &'static str, repeat: bool) -> Value {
    Value::native(name, move |interp, _, args| {
        let callback = arg(&args, 0);
        if !callback.is_callable() {
            return Err(interp.error(
                "TypeError",
                format!("{}: callback must be a function", name),
            ));
        }
        let delay = arg(&args, 1).to_number();
        let extra = args.get(2..).map(|s| s.to_vec()).unwrap_or_default();
        let id = interp.host.timers.schedule(callback, delay, repeat, extra);
        Ok(Value::Number(id as f64))
    })
}

fn clear_timer_fn(name: &'static str) -> Value {
    Value::native(name, |interp, _, args| {
        let id = arg(&args, 0).to_number();
        if id.is_finite() && id >= 0.0 {
            interp.host.timers.cancel(id as u32);
        }
        Ok(Value::Undefined)
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSON
// ═══════════════════════════════════════════════════════════════════════════════

fn json() -> Value {
    Value::object_from([
        (
            "stringify",
            Value::native("stringify", |interp, _, args| {
                let Some(json) = to_json(&arg(&args, 0), 0) else {
                    return Ok(Value::Undefined);
                };
                let indent = match arg(&args, 2) {
                    Value::Number(n) if n >= 1.0 => " ".repeat((n as usize).min(10)),
                    Value::String(s) => s.chars().take(10).collect(),
                    _ => String::new(),
                };
                let text = if indent.is_empty() {
                    serde_json::to_string(&json)
                } else {
                    let mut buf = Vec::new();
                    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
                    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
                    serde::Serialize::serialize(&json, &mut ser)
                        .map(|_| String::from_utf8_lossy(&buf).into_owned())
                };
                text.map(Value::from)
                    .map_err(|e| interp.error("TypeError", e.to_string()))
            }),
        ),
        (
            "parse",
            Value::native("parse", |interp, _, args| {
                let text = arg(&args, 0).to_js_string();
                match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(json) => Ok(from_json(&json)),
                    Err(e) => Err(interp.error("SyntaxError", format!("JSON.parse: {}", e))),
                }
            }),
        ),
    ])
}

fn to_json(value: &Value, depth: usize) -> Option<serde_json::Value> {
    if depth > 64 {
        return Some(serde_json::Value::Null);
    }
    Some(match value {
        Value::Undefined | Value::Function(_) => return None,
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) if !n.is_finite() => serde_json::Value::Null,
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 => {
            serde_json::Value::from(*n as i64)
        }
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.to_string()),
        Value::Array(items) => serde_json::Value::Array(
            items
                .borrow()
                .iter()
                .map(|v| to_json(v, depth + 1).unwrap_or(serde_json::Value::Null))
                .collect(),
        ),
        Value::Object(map) => serde_json::Value::Object(
            map.borrow()
                .iter()
                .filter_map(|(k, v)| to_json(v, depth + 1).map(|j| (k.clone(), j)))
                .collect(),
        ),
        Value::Element(_) | Value::RegExp(_) => serde_json::Value::Object(Default::default()),
    })
}

fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::string(s),
        serde_json::Value::Array(items) => Value::array(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => Value::object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_json(v)))
                .collect(),
        ),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NUMBER PARSING
// ═══════════════════════════════════════════════════════════════════════════════

fn parse_int(text: &str, radix: &Value) -> f64 {
    let mut s = text.trim_start();
    let negative = s.starts_with('-');
    if s.starts_with('-') || s.starts_with('+') {
        s = &s[1..];
    }
    let requested = match radix {
        Value::Undefined => 0,
        other => other.to_number() as u32,
    };
    let mut radix = if requested == 0 { 10 } else { requested };
    if (requested == 0 || requested == 16) && (s.starts_with("0x") || s.starts_with("0X")) {
        radix = 16;
        s = &s[2..];
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: String = s.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * radix as f64 + d as f64);
    if negative {
        -value
    } else {
        value
    }
}

fn parse_float(text: &str) -> f64 {
    let s = text.trim_start();
    for prefix in ["Infinity", "+Infinity"] {
        if s.starts_with(prefix) {
            return f64::INFINITY;
        }
    }
    if s.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = s.as_bytes();
    while end < bytes.len() {
        let c = bytes[end];
        let ok = match c {
            b'0'..=b'9' => true,
            b'+' | b'-' => end == 0 || matches!(bytes[end - 1], b'e' | b'E'),
            b'.' if !seen_dot && !seen_exp => {
                seen_dot = true;
                true
            }
            b'e' | b'E' if !seen_exp && end > 0 => {
                seen_exp = true;
                true
            }
            _ => false,
        };
        if !ok {
            break;
        }
        end += 1;
    }
    let mut candidate = &s[..end];
    while !candidate.is_empty() {
        if let Ok(n) = candidate.parse::<f64>() {
            return n;
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    f64::NAN
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOTYPE METHODS
// ═══════════════════════════════════════════════════════════════════════════════

thread_local! {
    static ARRAY_METHODS: FxHashMap<&'static str, Value> = array_methods();
    static STRING_METHODS: FxHashMap<&'static str, Value> = string_methods();
    static NUMBER_METHODS: FxHashMap<&'static str, Value> = number_methods();
    static OBJECT_METHODS: FxHashMap<&'static str, Value> = object_methods();
    static FUNCTION_METHODS: FxHashMap<&'static str, Value> = function_methods();
    static REGEXP_METHODS: FxHashMap<&'static str, Value> = regexp_methods();
}

pub fn array_method(key: &str) -> Option<Value> {
    ARRAY_METHODS.with(|m| m.get(key).cloned())
}

pub fn string_method(key: &str) -> Option<Value> {
    STRING_METHODS.with(|m| m.get(key).cloned())
}

pub fn number_method(key: &str) -> Option<Value> {
    NUMBER_METHODS.with(|m| m.get(key).cloned())
}

pub fn object_method(key: &str) -> Option<Value> {
    OBJECT_METHODS.with(|m| m.get(key).cloned())
}

pub fn function_method(key: &str) -> Option<Value> {
    FUNCTION_METHODS.with(|m| m.get(key).cloned())
}

pub fn regexp_method(key: &str) -> Option<Value> {
    REGEXP_METHODS.with(|m| m.get(key).cloned())
}

type Method = fn(&mut Interpreter, Value, Vec<Value>) -> EvalResult<Value>;

fn m(name: &'static str, f: Method) -> (&'static str, Method) {
    (name, f)
}

fn table(methods: &[(&'static str, Method)]) -> FxHashMap<&'static str, Value> {
    methods
        .iter()
        .map(|(name, f)| {
            let f = *f;
            let name = *name;
            (
                name,
                Value::native(name, move |interp, this, args| {
                    trace_call(name, &args);
                    f(interp, this, args)
                }),
            )
        })
        .collect()
}

fn this_array(interp: &Interpreter, this: &Value, method: &str) -> EvalResult<Rc<std::cell::RefCell<Vec<Value>>>> {
    match this {
        Value::Array(items) => Ok(items.clone()),
        other => Err(interp.error(
            "TypeError",
            format!("Array.prototype.{} called on {}", method, other.inspect()),
        )),
    }
}

fn callback(interp: &Interpreter, args: &[Value], method: &str) -> EvalResult<Value> {
    let f = arg(args, 0);
    if f.is_callable() {
        Ok(f)
    } else {
        Err(interp.error(
            "TypeError",
            format!("{} is not a function (in Array.prototype.{})", f.inspect(), method),
        ))
    }
}

/// Calls `f(item, index, array)` for each element of a snapshot of `this`.
fn each<F>(interp: &mut Interpreter, this: &Value, args: &[Value], method: &str, mut visit: F) -> EvalResult<()>
where
    F: FnMut(usize, &Value, Value) -> bool,
{
    let items = this_array(interp, this, method)?.borrow().clone();
    let f = callback(interp, args, method)?;
    for (i, item) in items.into_iter().enumerate() {
        let result = interp.call(&f, Value::Undefined, vec![item.clone(), Value::Number(i as f64), this.clone()])?;
        if !visit(i, &item, result) {
            break;
        }
    }
    Ok(())
}

fn flatten_into(out: &mut Vec<Value>, items: &[Value], depth: f64) {
    for item in items {
        match item {
            Value::Array(inner) if depth >= 1.0 => flatten_into(out, &inner.borrow(), depth - 1.0),
            other => out.push(other.clone()),
        }
    }
}

fn default_compare(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => std::cmp::Ordering::Equal,
        (Value::Undefined, _) => std::cmp::Ordering::Greater,
        (_, Value::Undefined) => std::cmp::Ordering::Less,
        _ => a.to_js_string().cmp(&b.to_js_string()),
    }
}

/// Stable merge sort with a comparator that may throw.
fn merge_sort(interp: &mut Interpreter, items: Vec<Value>, compare: &Value) -> EvalResult<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(interp, left, compare)?;
    let right = merge_sort(interp, right, compare)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let (mut l, mut r) = (left.into_iter().peekable(), right.into_iter().peekable());
    loop {
        let (a, b) = match (l.peek(), r.peek()) {
            (Some(a), Some(b)) => (a.clone(), b.clone()),
            _ => break,
        };
        let take_right = if compare.is_callable() {
            let ordering = interp.call(compare, Value::Undefined, vec![a, b])?;
            ordering.to_number() > 0.0
        } else {
            default_compare(&a, &b) == std::cmp::Ordering::Greater
        };
        let next = if take_right { r.next() } else { l.next() };
        out.extend(next);
    }
    out.extend(l);
    out.extend(r);
    Ok(out)
}

fn array_methods() -> FxHashMap<&'static str, Value> {
    table(&[
        m("push", |interp, this, args| {
            let items = this_array(interp, &this, "push")?;
            let mut items = items.borrow_mut();
            items.extend(args);
            Ok(Value::Number(items.len() as f64))
        }),
        m("pop", |interp, this, _| {
            Ok(this_array(interp, &this, "pop")?.borrow_mut().pop().unwrap_or(Value::Undefined))
        }),
        m("shift", |interp, this, _| {
            let items = this_array(interp, &this, "shift")?;
            let mut items = items.borrow_mut();
            Ok(if items.is_empty() { Value::Undefined } else { items.remove(0) })
        }),
        m("unshift", |interp, this, args| {
            let items = this_array(interp, &this, "unshift")?;
            let mut items = items.borrow_mut();
            let tail = std::mem::replace(&mut *items, args);
            items.extend(tail);
            Ok(Value::Number(items.len() as f64))
        }),
        m("slice", |interp, this, args| {
            let items = this_array(interp, &this, "slice")?;
            let items = items.borrow();
            let start = relative_index(args.first(), items.len(), 0);
            let end = relative_index(args.get(1), items.len(), items.len());
            Ok(Value::array(if start < end { items[start..end].to_vec() } else { Vec::new() }))
        }),
        m("splice", |interp, this, args| {
            let items = this_array(interp, &this, "splice")?;
            let mut items = items.borrow_mut();
            let len = items.len();
            let start = relative_index(args.first(), len, 0);
            let count = match args.get(1) {
                None => len - start,
                Some(v) => {
                    let n = v.to_number();
                    if n.is_nan() || n < 0.0 { 0 } else { (n as usize).min(len - start) }
                }
            };
            let inserted = args.get(2..).map(|s| s.to_vec()).unwrap_or_default();
            let removed: Vec<Value> = items.splice(start..start + count, inserted).collect();
            Ok(Value::array(removed))
        }),
        m("concat", |interp, this, args| {
            let mut out = this_array(interp, &this, "concat")?.borrow().clone();
            for a in args {
                match a {
                    Value::Array(inner) => out.extend(inner.borrow().iter().cloned()),
                    other => out.push(other),
                }
            }
            interp.array_length(out.len() as f64)?;
            Ok(Value::array(out))
        }),
        m("join", |interp, this, args| {
            let items = this_array(interp, &this, "join")?;
            let sep = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(v) => v.to_js_string(),
            };
            let parts: Vec<String> = items
                .borrow()
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_js_string() })
                .collect();
            let total: usize = parts.iter().map(String::len).sum::<usize>()
                + sep.len() * parts.len().saturating_sub(1);
            interp.string_length(total)?;
            Ok(Value::from(parts.join(&sep)))
        }),
        m("toString", |interp, this, _| {
            let items = this_array(interp, &this, "toString")?;
            Ok(Value::from(Value::Array(items).to_js_string()))
        }),
        m("map", |interp, this, args| {
            let mut out = Vec::new();
            each(interp, &this, &args, "map", |_, _, r| {
                out.push(r);
                true
            })?;
            Ok(Value::array(out))
        }),
        m("flatMap", |interp, this, args| {
            let mut out = Vec::new();
            each(interp, &this, &args, "flatMap", |_, _, r| {
                flatten_into(&mut out, std::slice::from_ref(&r), 1.0);
                true
            })?;
            Ok(Value::array(out))
        }),
        m("filter", |interp, this, args| {
            let mut out = Vec::new();
            each(interp, &this, &args, "filter", |_, item, r| {
                if r.is_truthy() {
                    out.push(item.clone());
                }
                true
            })?;
            Ok(Value::array(out))
        }),
        m("forEach", |interp, this, args| {
            each(interp, &this, &args, "forEach", |_, _, _| true)?;
            Ok(Value::Undefined)
        }),
        m("find", |interp, this, args| {
            let mut found = Value::Undefined;
            each(interp, &this, &args, "find", |_, item, r| {
                if r.is_truthy() {
                    found = item.clone();
                    return false;
                }
                true
            })?;
            Ok(found)
        }),
        m("findIndex", |interp, this, args| {
            let mut found = -1.0;
            each(interp, &this, &args, "findIndex", |i, _, r| {
                if r.is_truthy() {
                    found = i as f64;
                    return false;
                }
                true
            })?;
            Ok(Value::Number(found))
        }),
        m("some", |interp, this, args| {
            let mut any = false;
            each(interp, &this, &args, "some", |_, _, r| {
                any = r.is_truthy();
                !any
            })?;
            Ok(Value::Bool(any))
        }),
        m("every", |interp, this, args| {
            let mut all = true;
            each(interp, &this, &args, "every", |_, _, r| {
                all = r.is_truthy();
                all
            })?;
            Ok(Value::Bool(all))
        }),
        m("reduce", |interp, this, args| {
            let items = this_array(interp, &this, "reduce")?.borrow().clone();
            let f = callback(interp, &args, "reduce")?;
            let mut iter = items.into_iter().enumerate();
            let mut acc = match args.get(1) {
                Some(init) => init.clone(),
                None => match iter.next() {
                    Some((_, first)) => first,
                    None => {
                        return Err(interp.error("TypeError", "Reduce of empty array with no initial value"))
                    }
                },
            };
            for (i, item) in iter {
                acc = interp.call(&f, Value::Undefined, vec![acc, item, Value::Number(i as f64), this.clone()])?;
            }
            Ok(acc)
        }),
        m("includes", |interp, this, args| {
            let needle = arg(&args, 0);
            let found = this_array(interp, &this, "includes")?
                .borrow()
                .iter()
                .any(|v| v.same_value_zero(&needle));
            Ok(Value::Bool(found))
        }),
        m("indexOf", |interp, this, args| {
            let needle = arg(&args, 0);
            let pos = this_array(interp, &this, "indexOf")?
                .borrow()
                .iter()
                .position(|v| v.strict_equals(&needle));
            Ok(Value::Number(pos.map_or(-1.0, |p| p as f64)))
        }),
        m("lastIndexOf", |interp, this, args| {
            let needle = arg(&args, 0);
            let pos = this_array(interp, &this, "lastIndexOf")?
                .borrow()
                .iter()
                .rposition(|v| v.strict_equals(&needle));
            Ok(Value::Number(pos.map_or(-1.0, |p| p as f64)))
        }),
        m("reverse", |interp, this, _| {
            this_array(interp, &this, "reverse")?.borrow_mut().reverse();
            Ok(this)
        }),
        m("sort", |interp, this, args| {
            let items = this_array(interp, &this, "sort")?;
            let snapshot = items.borrow().clone();
            let sorted = merge_sort(interp, snapshot, &arg(&args, 0))?;
            *items.borrow_mut() = sorted;
            Ok(this)
        }),
        m("flat", |interp, this, args| {
            let depth = match args.first() {
                None | Some(Value::Undefined) => 1.0,
                Some(v) => v.to_number(),
            };
            let items = this_array(interp, &this, "flat")?.borrow().clone();
            let mut out = Vec::new();
            flatten_into(&mut out, &items, depth);
            Ok(Value::array(out))
        }),
        m("fill", |interp, this, args| {
            let items = this_array(interp, &this, "fill")?;
            {
                let mut items = items.borrow_mut();
                let len = items.len();
                let start = relative_index(args.get(1), len, 0);
                let end = relative_index(args.get(2), len, len);
                for slot in items.iter_mut().take(end).skip(start) {
                    *slot = arg(&args, 0);
                }
            }
            Ok(this)
        }),
        m("at", |interp, this, args| {
            let items = this_array(interp, &this, "at")?;
            let items = items.borrow();
            let n = arg(&args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            let index = if n < 0.0 { items.len() as f64 + n } else { n };
            Ok(if index >= 0.0 {
                items.get(index as usize).cloned().unwrap_or(Value::Undefined)
            } else {
                Value::Undefined
            })
        }),
    ])
}

fn this_string(this: &Value) -> String {
    this.to_js_string()
}

fn char_slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}

fn char_index_of(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let byte_from = haystack.char_indices().nth(from).map_or(haystack.len(), |(b, _)| b);
    haystack[byte_from..]
        .find(needle)
        .map(|b| haystack[..byte_from + b].chars().count())
}

fn pad(interp: &mut Interpreter, this: &Value, args: &[Value], at_start: bool) -> EvalResult<Value> {
    let s = this_string(this);
    let target = arg(args, 0).to_number();
    let filler = match args.get(1) {
        None | Some(Value::Undefined) => " ".to_string(),
        Some(v) => v.to_js_string(),
    };
    let len = s.chars().count();
    if target.is_nan() || target <= len as f64 || filler.is_empty() {
        return Ok(Value::from(s));
    }
    if target > MAX_STRING_LENGTH as f64 {
        return Err(interp.error("RangeError", "Invalid string length"));
    }
    let fill: String = filler.chars().cycle().take(target as usize - len).collect();
    interp.string_length(s.len() + fill.len())?;
    Ok(Value::from(if at_start { fill + &s } else { s + &fill }))
}

/// A `RegExp` argument as is, anything else compiled as a pattern source.
fn pattern_arg(interp: &Interpreter, args: &[Value]) -> EvalResult<Rc<RegExpObject>> {
    match arg(args, 0) {
        Value::RegExp(re) => Ok(re),
        other => {
            let source = match other {
                Value::Undefined => "(?:)".to_string(),
                v => v.to_js_string(),
            };
            CompiledRegExp::new(&source, "")
                .map(|compiled| Rc::new(RegExpObject::new(compiled)))
                .map_err(|message| interp.error("SyntaxError", message))
        }
    }
}

fn replace(interp: &mut Interpreter, this: &Value, args: &[Value], all: bool) -> EvalResult<Value> {
    let s = this_string(this);
    let replacement = arg(args, 1);
    if let Value::RegExp(re) = arg(args, 0) {
        return regexp::replace(interp, &s, &re, &replacement, all);
    }
    let pattern = arg(args, 0).to_js_string();
    let mut out = String::new();
    let mut rest = s.as_str();
    let mut offset = 0;
    loop {
        let Some(pos) = rest.find(&pattern) else {
            break;
        };
        out.push_str(&rest[..pos]);
        let with = if replacement.is_callable() {
            interp
                .call(
                    &replacement,
                    Value::Undefined,
                    vec![
                        Value::string(&pattern),
                        Value::Number(s[..offset + pos].chars().count() as f64),
                        Value::string(&s),
                    ],
                )?
                .to_js_string()
        } else {
            replacement.to_js_string().replace("$&", &pattern)
        };
        interp.string_length(out.len() + with.len())?;
        out.push_str(&with);
        let advance = pos + pattern.len();
        if pattern.is_empty() {
            // An empty pattern matches between every character.
            match rest[advance..].chars().next() {
                Some(c) => {
                    out.push(c);
                    offset += advance + c.len_utf8();
                    rest = &rest[advance + c.len_utf8()..];
                }
                None => {
                    rest = "";
                    break;
                }
            }
        } else {
            offset += advance;
            rest = &rest[advance..];
        }
        if !all {
            break;
        }
    }
    out.push_str(rest);
    Ok(Value::from(out))
}

fn string_methods() -> FxHashMap<&'static str, Value> {
    table(&[
        m("toUpperCase", |_, this, _| Ok(Value::from(this_string(&this).to_uppercase()))),
        m("toLowerCase", |_, this, _| Ok(Value::from(this_string(&this).to_lowercase()))),
        m("trim", |_, this, _| Ok(Value::string(this_string(&this).trim()))),
        m("trimStart", |_, this, _| Ok(Value::string(this_string(&this).trim_start()))),
        m("trimEnd", |_, this, _| Ok(Value::string(this_string(&this).trim_end()))),
        m("toString", |_, this, _| Ok(Value::from(this_string(&this)))),
        m("valueOf", |_, this, _| Ok(Value::from(this_string(&this)))),
        m("split", |_, this, args| {
            let s = this_string(&this);
            let limit = match args.get(1) {
                None | Some(Value::Undefined) => usize::MAX,
                Some(v) => v.to_number().max(0.0) as usize,
            };
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Undefined) => vec![Value::from(s)],
                Some(Value::RegExp(re)) => return Ok(regexp::split(&s, re, limit)),
                Some(sep) => {
                    let sep = sep.to_js_string();
                    if sep.is_empty() {
                        s.chars().map(|c| Value::from(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::from).collect()
                    }
                }
            };
            Ok(Value::array(parts.into_iter().take(limit).collect()))
        }),
        m("includes", |_, this, args| {
            Ok(Value::Bool(this_string(&this).contains(&arg(&args, 0).to_js_string())))
        }),
        m("startsWith", |_, this, args| {
            Ok(Value::Bool(this_string(&this).starts_with(&arg(&args, 0).to_js_string())))
        }),
        m("endsWith", |_, this, args| {
            Ok(Value::Bool(this_string(&this).ends_with(&arg(&args, 0).to_js_string())))
        }),
        m("indexOf", |_, this, args| {
            let s = this_string(&this);
            let from = relative_index(args.get(1), s.chars().count(), 0);
            Ok(Value::Number(
                char_index_of(&s, &arg(&args, 0).to_js_string(), from).map_or(-1.0, |i| i as f64),
            ))
        }),
        m("lastIndexOf", |_, this, args| {
            let s = this_string(&this);
            let needle = arg(&args, 0).to_js_string();
            Ok(Value::Number(
                s.rfind(&needle).map_or(-1.0, |b| s[..b].chars().count() as f64),
            ))
        }),
        m("slice", |_, this, args| {
            let s = this_string(&this);
            let len = s.chars().count();
            let start = relative_index(args.first(), len, 0);
            let end = relative_index(args.get(1), len, len);
            Ok(Value::from(char_slice(&s, start, end)))
        }),
        m("substring", |_, this, args| {
            let s = this_string(&this);
            let len = s.chars().count();
            let clamp = |v: Option<&Value>, default: usize| match v {
                None | Some(Value::Undefined) => default,
                Some(v) => {
                    let n = v.to_number();
                    if n.is_nan() || n < 0.0 { 0 } else { (n as usize).min(len) }
                }
            };
            let (a, b) = (clamp(args.first(), 0), clamp(args.get(1), len));
            Ok(Value::from(char_slice(&s, a.min(b), a.max(b))))
        }),
        m("match", |interp, this, args| {
            let re = pattern_arg(interp, &args)?;
            Ok(regexp::match_text(&this_string(&this), &re))
        }),
        m("matchAll", |interp, this, args| {
            let re = pattern_arg(interp, &args)?;
            regexp::match_all(interp, &this_string(&this), &re)
        }),
        m("search", |interp, this, args| {
            let re = pattern_arg(interp, &args)?;
            Ok(regexp::search(&this_string(&this), &re))
        }),
        m("replace", |interp, this, args| replace(interp, &this, &args, false)),
        m("replaceAll", |interp, this, args| replace(interp, &this, &args, true)),
        m("repeat", |interp, this, args| {
            let n = arg(&args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            if n < 0.0 || !n.is_finite() {
                return Err(interp.error("RangeError", format!("Invalid count value: {}", format_number(n))));
            }
            let s = this_string(&this);
            let count = n as usize;
            if !s.is_empty() {
                interp.string_length(s.len().saturating_mul(count))?;
            }
            Ok(Value::from(s.repeat(count)))
        }),
        m("padStart", |interp, this, args| pad(interp, &this, &args, true)),
        m("padEnd", |interp, this, args| pad(interp, &this, &args, false)),
        m("charAt", |_, this, args| {
            let i = arg(&args, 0).to_number();
            let i = if i.is_nan() { 0 } else { i as usize };
            Ok(Value::from(
                this_string(&this).chars().nth(i).map(String::from).unwrap_or_default(),
            ))
        }),
        m("charCodeAt", |_, this, args| {
            let i = arg(&args, 0).to_number();
            let i = if i.is_nan() { 0 } else { i as usize };
            Ok(Value::Number(
                this_string(&this).chars().nth(i).map_or(f64::NAN, |c| c as u32 as f64),
            ))
        }),
        m("at", |_, this, args| {
            let s = this_string(&this);
            let len = s.chars().count() as f64;
            let n = arg(&args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            let index = if n < 0.0 { len + n } else { n };
            Ok(if index >= 0.0 {
                s.chars()
                    .nth(index as usize)
                    .map_or(Value::Undefined, |c| Value::from(c.to_string()))
            } else {
                Value::Undefined
            })
        }),
        m("concat", |interp, this, args| {
            let mut s = this_string(&this);
            for a in &args {
                let part = a.to_js_string();
                interp.string_length(s.len() + part.len())?;
                s.push_str(&part);
            }
            Ok(Value::from(s))
        }),
        m("localeCompare", |_, this, args| {
            let ordering = this_string(&this).cmp(&arg(&args, 0).to_js_string());
            Ok(Value::Number(ordering as i8 as f64))
        }),
    ])
}

fn group_thousands(integer: &str) -> String {
    let (sign, digits) = match integer.strip_prefix('-') {
        Some(d) => ("-", d),
        None => ("", integer),
    };
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    format!("{}{}", sign, out)
}

fn number_methods() -> FxHashMap<&'static str, Value> {
    table(&[
        m("toFixed", |interp, this, args| {
            let digits = arg(&args, 0).to_number();
            let digits = if digits.is_nan() { 0.0 } else { digits };
            if !(0.0..=100.0).contains(&digits) {
                return Err(interp.error("RangeError", "toFixed() digits argument must be between 0 and 100"));
            }
            let n = this.to_number();
            if !n.is_finite() {
                return Ok(Value::from(format_number(n)));
            }
            Ok(Value::from(format!("{:.*}", digits as usize, n)))
        }),
        m("toString", |interp, this, args| {
            let n = this.to_number();
            let radix = match args.first() {
                None | Some(Value::Undefined) => 10,
                Some(v) => v.to_number() as u32,
            };
            if !(2..=36).contains(&radix) {
                return Err(interp.error("RangeError", "toString() radix must be between 2 and 36"));
            }
            if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
                return Ok(Value::from(format_number(n)));
            }
            let mut value = n.abs() as u64;
            let mut digits = Vec::new();
            loop {
                digits.push(std::char::from_digit((value % radix as u64) as u32, radix).unwrap_or('0'));
                value /= radix as u64;
                if value == 0 {
                    break;
                }
            }
            if n < 0.0 {
                digits.push('-');
            }
            Ok(Value::from(digits.iter().rev().collect::<String>()))
        }),
        m("toLocaleString", |_, this, _| {
            let n = this.to_number();
            if !n.is_finite() {
                return Ok(Value::from(format_number(n)));
            }
            let rounded = format!("{:.3}", n);
            let rounded = rounded.trim_end_matches('0').trim_end_matches('.');
            let (integer, fraction) = rounded.split_once('.').unwrap_or((rounded, ""));
            let mut out = group_thousands(integer);
            if !fraction.is_empty() {
                out.push('.');
                out.push_str(fraction);
            }
            Ok(Value::from(out))
        }),
        m("valueOf", |_, this, _| Ok(Value::Number(this.to_number()))),
    ])
}

fn object_methods() -> FxHashMap<&'static str, Value> {
    table(&[
        m("hasOwnProperty", |_, this, args| {
            let key = to_property_key(&arg(&args, 0));
            Ok(Value::Bool(own_keys(&this).contains(&key)))
        }),
        m("toString", |_, this, _| {
            Ok(Value::from(match this {
                Value::Bool(b) => b.to_string(),
                _ => "[object Object]".to_string(),
            }))
        }),
        m("valueOf", |_, this, _| Ok(this)),
    ])
}

fn function_methods() -> FxHashMap<&'static str, Value> {
    table(&[
        m("call", |interp, this, args| {
            let mut args = args.into_iter();
            let this_arg = args.next().unwrap_or(Value::Undefined);
            interp.call(&this, this_arg, args.collect())
        }),
        m("apply", |interp, this, args| {
            let this_arg = arg(&args, 0);
            let list = match arg(&args, 1) {
                Value::Undefined | Value::Null => Vec::new(),
                other => interp.iterate(&other)?,
            };
            interp.call(&this, this_arg, list)
        }),
        m("bind", |_, this, args| {
            let mut args = args.into_iter();
            let bound_this = args.next().unwrap_or(Value::Undefined);
            let bound_args: Vec<Value> = args.collect();
            let name = match &this {
                Value::Function(f) => format!("bound {}", f.name),
                _ => "bound".to_string(),
            };
            let target = this.clone();
            Ok(Value::native(&name, move |interp, _, args| {
                let mut all = bound_args.clone();
                all.extend(args);
                interp.call(&target, bound_this.clone(), all)
            }))
        }),
    ])
}

fn this_regexp(interp: &Interpreter, this: &Value, method: &str) -> EvalResult<Rc<RegExpObject>> {
    match this {
        Value::RegExp(re) => Ok(re.clone()),
        other => Err(interp.error(
            "TypeError",
            format!("RegExp.prototype.{} called on {}", method, other.inspect()),
        )),
    }
}

fn regexp_methods() -> FxHashMap<&'static str, Value> {
    table(&[
        m("test", |interp, this, args| {
            let re = this_regexp(interp, &this, "test")?;
            Ok(regexp::test(&re, &arg(&args, 0).to_js_string()))
        }),
        m("exec", |interp, this, args| {
            let re = this_regexp(interp, &this, "exec")?;
            Ok(regexp::exec(&re, &arg(&args, 0).to_js_string()))
        }),
        m("toString", |interp, this, _| {
            Ok(Value::from(this_regexp(interp, &this, "toString")?.to_js_string()))
        }),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_and_float() {
        assert_eq!(parse_int("42px", &Value::Undefined), 42.0);
        assert_eq!(parse_int("  -17", &Value::Undefined), -17.0);
        assert_eq!(parse_int("ff", &Value::Number(16.0)), 255.0);
        assert!(parse_int("abc", &Value::Undefined).is_nan());
        assert_eq!(parse_float("3.25rem"), 3.25);
        assert_eq!(parse_float("1e3"), 1000.0);
        assert!(parse_float(".").is_nan());
    }

    #[test]
    fn test_json_number_rendering() {
        let v = Value::array(vec![Value::Number(1.0), Value::Number(1.5), Value::Undefined]);
        let json = to_json(&v, 0).unwrap();
        assert_eq!(serde_json::to_string(&json).unwrap(), "[1,1.5,null]");
    }

    #[test]
    fn test_thousands_grouping() {
        assert_eq!(group_thousands("1234567"), "1,234,567");
        assert_eq!(group_thousands("-999"), "-999");
    }
}
