//! Runtime values of the sandbox interpreter.

use indexmap::IndexMap;
use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::interpreter::{with_stack, Interpreter, Throw};
use crate::ir::FunctionDef;
use crate::regexp::RegExpObject;
use crate::scope::Scope;

pub type PropertyMap = IndexMap<String, Value>;

/// Host function: `(interpreter, this, arguments)`.
pub type NativeFn = Rc<dyn Fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value, Throw>>;

/// Longest string, in UTF-8 bytes, the sandbox will build. Matches the
/// V8 limit of 2^29 - 24 code units.
pub const MAX_STRING_LENGTH: usize = (1 << 29) - 24;

/// Element type marker used for `React.Fragment`.
pub const FRAGMENT_MARKER: &str = "#fragment";

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<PropertyMap>>),
    Function(Rc<FunctionObject>),
    Element(Rc<Element>),
    RegExp(Rc<RegExpObject>),
}

pub struct FunctionObject {
    pub name: String,
    pub kind: FunctionKind,
    pub properties: RefCell<PropertyMap>,
}

pub enum FunctionKind {
    Closure { def: Rc<FunctionDef>, scope: Scope },
    Native(NativeFn),
}

#[derive(Clone)]
pub enum ElementType {
    Intrinsic(Rc<str>),
    Fragment,
    Component(Value),
}

/// Result of `createElement`. Props never contain `key`.
pub struct Element {
    pub element_type: ElementType,
    pub key: Option<String>,
    pub props: Rc<RefCell<PropertyMap>>,
}

impl Element {
    pub fn type_name(&self) -> String {
        match &self.element_type {
            ElementType::Intrinsic(tag) => tag.to_string(),
            ElementType::Fragment => "Fragment".to_string(),
            ElementType::Component(Value::Function(f)) if !f.name.is_empty() => f.name.clone(),
            ElementType::Component(_) => "Anonymous".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
    Function,
    Element,
    RegExp,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Undefined => "undefined",
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
            ValueKind::Function => "function",
            ValueKind::Element => "element",
            ValueKind::RegExp => "regexp",
        };
        f.write_str(s)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTRUCTORS
// ═══════════════════════════════════════════════════════════════════════════════

impl Value {
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(props: PropertyMap) -> Value {
        Value::Object(Rc::new(RefCell::new(props)))
    }

    pub fn object_from<'k>(entries: impl IntoIterator<Item = (&'k str, Value)>) -> Value {
        Value::object(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    pub fn native<F>(name: &str, f: F) -> Value
    where
        F: Fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value, Throw> + 'static,
    {
        Value::Function(Rc::new(FunctionObject {
            name: name.to_string(),
            kind: FunctionKind::Native(Rc::new(f)),
            properties: RefCell::new(IndexMap::new()),
        }))
    }

    /// A native function that also carries static properties
    /// (`Number.isInteger`, `Array.isArray`, ...).
    pub fn native_with_props<F>(name: &str, f: F, props: PropertyMap) -> Value
    where
        F: Fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value, Throw> + 'static,
    {
        Value::Function(Rc::new(FunctionObject {
            name: name.to_string(),
            kind: FunctionKind::Native(Rc::new(f)),
            properties: RefCell::new(props),
        }))
    }

    pub fn closure(name: String, def: Rc<FunctionDef>, scope: Scope) -> Value {
        Value::Function(Rc::new(FunctionObject {
            name,
            kind: FunctionKind::Closure { def, scope },
            properties: RefCell::new(IndexMap::new()),
        }))
    }
}

/// Builds an error object the way `new Error(message)` would.
pub fn make_error(name: &str, message: &str) -> Value {
    Value::object_from([
        ("name", Value::string(name)),
        ("message", Value::string(message)),
    ])
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSPECTION & CONVERSION
// ═══════════════════════════════════════════════════════════════════════════════

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Undefined => ValueKind::Undefined,
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
            Value::Function(_) => ValueKind::Function,
            Value::Element(_) => ValueKind::Element,
            Value::RegExp(_) => ValueKind::RegExp,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Array(_) | Value::Object(_) | Value::Element(_) | Value::RegExp(_) => "object",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Own property lookup on plain objects; `None` for everything else.
    pub fn get_own(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(map) => map.borrow().get(key).cloned(),
            Value::Function(f) => f.properties.borrow().get(key).cloned(),
            _ => None,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(_) => string_to_number(&self.to_js_string()),
            _ => f64::NAN,
        }
    }

    pub fn to_js_string(&self) -> String {
        self.to_js_string_in(&mut Vec::new())
    }

    /// `seen` holds the arrays being joined; a cycle joins as `""`.
    fn to_js_string_in(&self, seen: &mut Vec<*const RefCell<Vec<Value>>>) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Array(items) => {
                let ptr = Rc::as_ptr(items);
                if seen.contains(&ptr) {
                    return String::new();
                }
                seen.push(ptr);
                let joined = with_stack(|| {
                    items
                        .borrow()
                        .iter()
                        .map(|v| {
                            if v.is_nullish() {
                                String::new()
                            } else {
                                v.to_js_string_in(seen)
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(",")
                });
                seen.pop();
                joined
            }
            Value::Object(_) | Value::Element(_) => "[object Object]".to_string(),
            Value::Function(f) => format!("function {}() {{ [code] }}", f.name),
            Value::RegExp(re) => re.to_js_string(),
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Element(a), Value::Element(b)) => Rc::ptr_eq(a, b),
            (Value::RegExp(a), Value::RegExp(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => {
                if matches!(self, Value::Array(_) | Value::Object(_))
                    || matches!(other, Value::Array(_) | Value::Object(_))
                {
                    self.to_js_string() == other.to_js_string()
                } else {
                    self.to_number() == other.to_number()
                }
            }
            _ => self.strict_equals(other),
        }
    }

    /// `Object.is`: like strict equality, but NaN equals itself.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    /// Used by `includes`: NaN matches NaN.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        self.same_value(other)
    }

    /// Node-style rendering used by `console.*` and error details.
    pub fn inspect(&self) -> String {
        self.inspect_depth(0, false)
    }

    fn inspect_depth(&self, depth: usize, nested: bool) -> String {
        if depth > 4 {
            return "[...]".to_string();
        }
        match self {
            Value::String(s) if nested => format!("'{}'", s),
            Value::Array(items) => {
                let parts: Vec<String> = items
                    .borrow()
                    .iter()
                    .map(|v| v.inspect_depth(depth + 1, true))
                    .collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Object(map) => {
                let map = map.borrow();
                if map.is_empty() {
                    return "{}".to_string();
                }
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.inspect_depth(depth + 1, true)))
                    .collect();
                format!("{{ {} }}", parts.join(", "))
            }
            Value::Function(f) => {
                if f.name.is_empty() {
                    "[Function (anonymous)]".to_string()
                } else {
                    format!("[Function: {}]", f.name)
                }
            }
            Value::Element(el) => format!("<{} />", el.type_name()),
            other => other.to_js_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect_depth(0, true))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    match t {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => {
            // Rust accepts "inf"/"nan" spellings that JS does not.
            if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
                return f64::NAN;
            }
            t.parse::<f64>().unwrap_or(f64::NAN)
        }
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        let s = format!("{:e}", n);
        match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        }
    } else if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number(" 12 "), 12.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1f"), 31.0);
        assert!(string_to_number("12px").is_nan());
        assert!(string_to_number("inf").is_nan());
    }

    #[test]
    fn test_equality_rules() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
        assert!(Value::string("1").loose_equals(&Value::Number(1.0)));
        assert!(Value::Number(f64::NAN).same_value(&Value::Number(f64::NAN)));
        let a = Value::array(vec![]);
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&Value::array(vec![])));
    }

    #[test]
    fn test_cyclic_array_joins_as_empty() {
        let outer = Value::array(vec![1.0.into()]);
        if let Value::Array(items) = &outer {
            items.borrow_mut().push(outer.clone());
            items.borrow_mut().push(2.0.into());
        }
        assert_eq!(outer.to_js_string(), "1,,2");
        if let Value::Array(items) = &outer {
            items.borrow_mut().clear();
        }
    }

    #[test]
    fn test_array_to_string_skips_nullish() {
        let v = Value::array(vec![1.0.into(), Value::Null, "x".into()]);
        assert_eq!(v.to_js_string(), "1,,x");
    }
}
