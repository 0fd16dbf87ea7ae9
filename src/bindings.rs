//! The fixed set of names injected into every executed unit.
//!
//! The table is built once; each compilation materialises fresh runtime
//! values from it so no state leaks between compilations.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde::Serialize;
use std::fmt;

use crate::error::{Diagnostic, W_KEY_IN_SPREAD};
use crate::interpreter::{EvalResult, Interpreter};
use crate::render;
use crate::scope::Scope;
use crate::value::{PropertyMap, Value, FRAGMENT_MARKER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BindingKind {
    Hook,
    HostRuntime,
    UiPrimitive,
    Icon,
    Helper,
    Internal,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BindingKind::Hook => "hook",
            BindingKind::HostRuntime => "host runtime",
            BindingKind::UiPrimitive => "ui primitive",
            BindingKind::Icon => "icon",
            BindingKind::Helper => "helper",
            BindingKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy)]
enum BindingFactory {
    Native(fn() -> Value),
    Icon,
}

#[derive(Clone, Copy)]
pub struct BindingEntry {
    pub name: &'static str,
    pub kind: BindingKind,
    factory: BindingFactory,
}

impl BindingEntry {
    pub fn materialize(&self) -> Value {
        match self.factory {
            BindingFactory::Native(make) => make(),
            BindingFactory::Icon => icon(self.name),
        }
    }
}

pub const ICON_NAMES: &[&str] = &[
    "Play", "Pause", "Upload", "Download", "FileVideo", "Loader", "Camera", "Video", "Image",
    "File", "Mic", "Speaker", "Volume2", "Mail", "Send", "Calendar", "Clock", "Search", "Menu",
    "Home", "Settings", "User", "Users", "Heart", "Star", "Bookmark", "Share", "Edit", "Trash",
    "ChevronDown", "ChevronUp", "ChevronLeft", "ChevronRight", "ArrowUp", "ArrowDown",
    "ArrowLeft", "ArrowRight", "PackageIcon",
];

pub struct BindingLibrary {
    entries: IndexMap<&'static str, BindingEntry>,
}

lazy_static! {
    pub static ref BINDING_LIBRARY: BindingLibrary = BindingLibrary::standard();
}

impl BindingLibrary {
    pub fn standard() -> Self {
        let mut entries = IndexMap::new();
        let mut add = |name: &'static str, kind: BindingKind, factory: BindingFactory| {
            entries.insert(name, BindingEntry { name, kind, factory });
        };

        add("React", BindingKind::HostRuntime, BindingFactory::Native(react));
        add("useState", BindingKind::Hook, BindingFactory::Native(|| Value::native("useState", render::use_state)));
        add("useEffect", BindingKind::Hook, BindingFactory::Native(|| Value::native("useEffect", render::use_effect)));
        add("useRef", BindingKind::Hook, BindingFactory::Native(|| Value::native("useRef", render::use_ref)));
        add("useMemo", BindingKind::Hook, BindingFactory::Native(|| Value::native("useMemo", render::use_memo)));
        add("useCallback", BindingKind::Hook, BindingFactory::Native(|| Value::native("useCallback", render::use_callback)));

        add("Button", BindingKind::UiPrimitive, BindingFactory::Native(|| Value::native("Button", button)));
        add("Card", BindingKind::UiPrimitive, BindingFactory::Native(|| Value::native("Card", card)));
        add("Text", BindingKind::UiPrimitive, BindingFactory::Native(|| Value::native("Text", text)));
        add("Flex", BindingKind::UiPrimitive, BindingFactory::Native(|| Value::native("Flex", flex)));
        add("Input", BindingKind::UiPrimitive, BindingFactory::Native(|| Value::native("Input", input)));

        for name in ICON_NAMES {
            add(*name, BindingKind::Icon, BindingFactory::Icon);
        }

        add("classNames", BindingKind::Helper, BindingFactory::Native(|| Value::native("classNames", class_names)));
        add("__keySafeProps", BindingKind::Internal, BindingFactory::Native(|| Value::native("__keySafeProps", key_safe_props)));
        add("__moduleNotFound", BindingKind::Internal, BindingFactory::Native(|| Value::native("__moduleNotFound", module_not_found)));

        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&BindingEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn kind(&self, name: &str) -> Option<BindingKind> {
        self.entries.get(name).map(|e| e.kind)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declares a fresh value for every entry in `scope`.
    pub fn install(&self, scope: &Scope) {
        for entry in self.entries.values() {
            scope.declare(entry.name, entry.materialize(), false);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOST RUNTIME
// ═══════════════════════════════════════════════════════════════════════════════

fn react() -> Value {
    Value::object_from([
        ("createElement", Value::native("createElement", render::create_element)),
        ("Fragment", Value::string(FRAGMENT_MARKER)),
        ("useState", Value::native("useState", render::use_state)),
        ("useEffect", Value::native("useEffect", render::use_effect)),
        ("useRef", Value::native("useRef", render::use_ref)),
        ("useMemo", Value::native("useMemo", render::use_memo)),
        ("useCallback", Value::native("useCallback", render::use_callback)),
    ])
}

// ═══════════════════════════════════════════════════════════════════════════════
// UI PRIMITIVES
// ═══════════════════════════════════════════════════════════════════════════════

fn prop(props: &Value, name: &str) -> Value {
    props.get_own(name).unwrap_or(Value::Undefined)
}

/// Prop value with a default for `undefined`, the way destructuring
/// defaults behave.
fn prop_or(props: &Value, name: &str, default: Value) -> Value {
    match prop(props, name) {
        Value::Undefined => default,
        v => v,
    }
}

fn h(interp: &mut Interpreter, tag: &str, attrs: Vec<(&str, Value)>, children: Vec<Value>) -> EvalResult<Value> {
    let mut args = vec![Value::from(tag), Value::object_from(attrs)];
    args.extend(children);
    render::create_element(interp, Value::Undefined, args)
}

/// Space-joins the non-empty class fragments of a primitive.
fn join_classes(parts: &[&str]) -> Value {
    let parts: Vec<&str> = parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    Value::from(parts.join(" "))
}

fn first_arg(args: Vec<Value>) -> Value {
    args.into_iter().next().unwrap_or(Value::Undefined)
}

fn button(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> EvalResult<Value> {
    let props = first_arg(args);
    let color = prop_or(&props, "color", Value::from("blue")).to_js_string();
    h(
        interp,
        "button",
        vec![
            ("onClick", prop(&props, "onClick")),
            (
                "className",
                Value::from(format!(
                    "px-4 py-2 bg-{c}-500 text-white rounded hover:bg-{c}-600",
                    c = color
                )),
            ),
        ],
        vec![prop(&props, "children")],
    )
}

fn card(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> EvalResult<Value> {
    let props = first_arg(args);
    let title = prop(&props, "title");
    let heading = if title.is_truthy() {
        h(
            interp,
            "h3",
            vec![("className", Value::from("text-xl font-bold mb-4"))],
            vec![title],
        )?
    } else {
        title
    };
    h(
        interp,
        "div",
        vec![("className", Value::from("p-6 max-w-sm mx-auto bg-white rounded-xl shadow-md"))],
        vec![heading, prop(&props, "children")],
    )
}

fn text(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> EvalResult<Value> {
    let props = first_arg(args);
    let size = match prop_or(&props, "size", Value::from("md")).to_js_string().as_str() {
        "sm" => "text-sm",
        "md" => "text-base",
        "lg" => "text-lg",
        "xl" => "text-xl",
        _ => "undefined",
    };
    let weight = match prop_or(&props, "weight", Value::from("normal")).to_js_string().as_str() {
        "normal" => "font-normal",
        "bold" => "font-bold",
        _ => "undefined",
    };
    let class_name = prop_or(&props, "className", Value::from("")).to_js_string();
    h(
        interp,
        "p",
        vec![("className", join_classes(&[size, weight, &class_name]))],
        vec![prop(&props, "children")],
    )
}

fn flex(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> EvalResult<Value> {
    let props = first_arg(args);
    let direction = prop_or(&props, "direction", Value::from("row")).to_js_string();
    let align = prop_or(&props, "align", Value::from("center")).to_js_string();
    let justify = prop_or(&props, "justify", Value::from("start")).to_js_string();
    let gap = prop_or(&props, "gap", Value::Number(2.0)).to_js_string();
    let class_name = prop_or(&props, "className", Value::from("")).to_js_string();
    h(
        interp,
        "div",
        vec![(
            "className",
            join_classes(&[
                &format!(
                    "flex flex-{} items-{} justify-{} gap-{}",
                    direction, align, justify, gap
                ),
                &class_name,
            ]),
        )],
        vec![prop(&props, "children")],
    )
}

fn input(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> EvalResult<Value> {
    let props = first_arg(args);
    let disabled = prop_or(&props, "disabled", Value::Bool(false));
    let class_name = prop_or(&props, "className", Value::from("")).to_js_string();
    let class = join_classes(&[
        "border p-2 rounded focus:outline-none focus:ring-2 focus:ring-blue-500 focus:border-transparent",
        if disabled.is_truthy() { "bg-gray-100 cursor-not-allowed" } else { "" },
        &class_name,
    ]);
    h(
        interp,
        "input",
        vec![
            ("type", prop_or(&props, "type", Value::from("text"))),
            ("value", prop(&props, "value")),
            ("onChange", prop(&props, "onChange")),
            ("onKeyPress", prop(&props, "onKeyPress")),
            ("placeholder", prop(&props, "placeholder")),
            ("disabled", disabled),
            ("min", prop(&props, "min")),
            ("max", prop(&props, "max")),
            ("step", prop(&props, "step")),
            ("autoFocus", prop_or(&props, "autoFocus", Value::Bool(false))),
            ("name", prop(&props, "name")),
            ("className", class),
        ],
        Vec::new(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// ICONS & HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn icon(name: &'static str) -> Value {
    Value::native(name, move |interp, _this, args| {
        let props = first_arg(args);
        let size = prop_or(&props, "size", Value::Number(24.0));
        h(
            interp,
            "svg",
            vec![
                ("data-icon", Value::from(name)),
                ("width", size.clone()),
                ("height", size),
                ("viewBox", Value::from("0 0 24 24")),
                ("fill", Value::from("none")),
                ("stroke", prop_or(&props, "color", Value::from("currentColor"))),
                ("className", prop(&props, "className")),
            ],
            Vec::new(),
        )
    })
}

fn class_names(_interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> EvalResult<Value> {
    let parts: Vec<String> = args
        .iter()
        .filter(|v| v.is_truthy())
        .map(Value::to_js_string)
        .collect();
    Ok(Value::from(parts.join(" ")))
}

/// Runtime half of the key-in-spread guard: strips `key` from spread props.
fn key_safe_props(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> EvalResult<Value> {
    let value = first_arg(args);
    let has_key = matches!(&value, Value::Object(map) if map.borrow().contains_key("key"));
    if !has_key {
        return Ok(value);
    }
    interp.push_diagnostic(Diagnostic::new(
        W_KEY_IN_SPREAD,
        "a props object containing \"key\" was spread into JSX; the key was dropped",
    ));
    let copy: PropertyMap = match &value {
        Value::Object(map) => map
            .borrow()
            .iter()
            .filter(|(k, _)| k.as_str() != "key")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => PropertyMap::new(),
    };
    Ok(Value::object(copy))
}

fn module_not_found(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> EvalResult<Value> {
    let specifier = first_arg(args).to_js_string();
    Err(interp.error("Error", format!("Cannot find module '{}'", specifier)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxLimits;

    #[test]
    fn test_library_kinds() {
        let lib = &*BINDING_LIBRARY;
        assert_eq!(lib.kind("useState"), Some(BindingKind::Hook));
        assert_eq!(lib.kind("React"), Some(BindingKind::HostRuntime));
        assert_eq!(lib.kind("Card"), Some(BindingKind::UiPrimitive));
        assert_eq!(lib.kind("PackageIcon"), Some(BindingKind::Icon));
        assert_eq!(lib.kind("classNames"), Some(BindingKind::Helper));
        assert_eq!(lib.kind("__moduleNotFound"), Some(BindingKind::Internal));
        assert!(!lib.contains("App"));
    }

    #[test]
    fn test_materialized_values_are_fresh() {
        let lib = &*BINDING_LIBRARY;
        let entry = lib.get("React").unwrap();
        assert_ne!(entry.materialize(), entry.materialize());
    }

    #[test]
    fn test_class_names_skips_falsy() {
        let mut interp = Interpreter::new(SandboxLimits::default());
        let out = class_names(
            &mut interp,
            Value::Undefined,
            vec![Value::from("a"), Value::Bool(false), Value::Null, Value::from("b")],
        )
        .unwrap();
        assert_eq!(out, Value::from("a b"));
    }

    #[test]
    fn test_key_safe_props_strips_key() {
        let mut interp = Interpreter::new(SandboxLimits::default());
        let props = Value::object_from([("key", Value::from(1.0)), ("id", Value::from("x"))]);
        let out = key_safe_props(&mut interp, Value::Undefined, vec![props]).unwrap();
        assert_eq!(out.get_own("key"), None);
        assert_eq!(out.get_own("id"), Some(Value::from("x")));
        assert_eq!(interp.diagnostics()[0].code, W_KEY_IN_SPREAD);
    }
}
