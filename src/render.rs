//! Host element model, hook runtime and first-render.
//!
//! Elements produced by `createElement` are expanded into a [`RenderNode`]
//! tree. Function components are called with their props inside a hook
//! frame identified by the component's position in the tree, so state
//! survives re-renders as long as the tree shape does.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::{Cell, RefCell};
use std::fmt::Write as _;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::error::RuntimeError;
use crate::interpreter::{with_stack, EvalResult, Interpreter, Throw};
use crate::value::{Element, ElementType, PropertyMap, Value, FRAGMENT_MARKER};

// ═══════════════════════════════════════════════════════════════════════════════
// ELEMENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// `createElement(type, props, ...children)`.
///
/// `key` is lifted out of props; children land in `props.children`, a single
/// child unwrapped.
pub fn create_element(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = args.into_iter();
    let element_type = match args.next().unwrap_or(Value::Undefined) {
        Value::String(tag) if &*tag == FRAGMENT_MARKER => ElementType::Fragment,
        Value::String(tag) => ElementType::Intrinsic(tag),
        f @ Value::Function(_) => ElementType::Component(f),
        other => {
            return Err(interp.error(
                "TypeError",
                format!(
                    "Element type is invalid: expected a string or a function but got: {}",
                    other.kind()
                ),
            ))
        }
    };

    let mut props = PropertyMap::new();
    let mut key = None;
    match args.next().unwrap_or(Value::Null) {
        Value::Object(map) => {
            for (k, v) in map.borrow().iter() {
                if k == "key" {
                    if !v.is_nullish() {
                        key = Some(v.to_js_string());
                    }
                } else {
                    props.insert(k.clone(), v.clone());
                }
            }
        }
        Value::Null | Value::Undefined => {}
        other => {
            return Err(interp.error(
                "TypeError",
                format!("createElement props must be an object, got {}", other.kind()),
            ))
        }
    }

    let mut children: Vec<Value> = args.collect();
    match children.len() {
        0 => {}
        1 => {
            props.insert("children".to_string(), children.remove(0));
        }
        _ => {
            props.insert("children".to_string(), Value::array(children));
        }
    }

    Ok(Value::Element(Rc::new(Element {
        element_type,
        key,
        props: Rc::new(RefCell::new(props)),
    })))
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderNode {
    Text(String),
    Element {
        tag: String,
        key: Option<String>,
        attributes: IndexMap<String, Value>,
        children: Vec<RenderNode>,
    },
}

impl RenderNode {
    pub fn tag(&self) -> Option<&str> {
        match self {
            RenderNode::Element { tag, .. } => Some(tag),
            RenderNode::Text(_) => None,
        }
    }

    pub fn children(&self) -> &[RenderNode] {
        match self {
            RenderNode::Element { children, .. } => children,
            RenderNode::Text(_) => &[],
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        match self {
            RenderNode::Element { attributes, .. } => attributes.get(name),
            RenderNode::Text(_) => None,
        }
    }

    /// Concatenated text content of this subtree.
    pub fn text(&self) -> String {
        match self {
            RenderNode::Text(t) => t.clone(),
            RenderNode::Element { children, .. } => children.iter().map(|c| c.text()).collect(),
        }
    }

    fn write_markup(&self, out: &mut String) {
        match self {
            RenderNode::Text(t) => out.push_str(&escape_html(t)),
            RenderNode::Element {
                tag,
                attributes,
                children,
                ..
            } => {
                let _ = write!(out, "<{}", tag);
                for (name, value) in attributes {
                    write_attribute(out, name, value);
                }
                if children.is_empty() && is_void_tag(tag) {
                    out.push_str(" />");
                    return;
                }
                out.push('>');
                for child in children {
                    child.write_markup(out);
                }
                let _ = write!(out, "</{}>", tag);
            }
        }
    }
}

fn is_void_tag(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta" | "source" | "track" | "wbr"
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn write_attribute(out: &mut String, name: &str, value: &Value) {
    let name = match name {
        "className" => "class",
        "htmlFor" => "for",
        other => other,
    };
    match value {
        Value::Undefined | Value::Null | Value::Bool(false) | Value::Function(_) => {}
        Value::Bool(true) => {
            let _ = write!(out, " {}", name);
        }
        Value::Object(map) if name == "style" => {
            let css: Vec<String> = map
                .borrow()
                .iter()
                .filter(|(_, v)| !v.is_nullish())
                .map(|(k, v)| format!("{}: {}", kebab_case(k), v.to_js_string()))
                .collect();
            let _ = write!(out, " style=\"{}\"", escape_html(&css.join("; ")).replace('"', "&quot;"));
        }
        other => {
            let text = other.to_js_string();
            let _ = write!(out, " {}=\"{}\"", name, escape_html(&text).replace('"', "&quot;"));
        }
    }
}

fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOOK RUNTIME
// ═══════════════════════════════════════════════════════════════════════════════

enum HookSlot {
    State {
        cell: Rc<RefCell<Value>>,
        setter: Value,
    },
    Ref(Value),
    Effect {
        deps: Option<Vec<Value>>,
        cleanup: Option<Value>,
    },
    Memo {
        deps: Option<Vec<Value>>,
        value: Value,
    },
}

#[derive(Clone)]
struct HookFrame {
    path: String,
    cursor: usize,
}

struct PendingEffect {
    path: String,
    index: usize,
    callback: Value,
}

#[derive(Default)]
pub(crate) struct HookStore {
    slots: FxHashMap<String, Vec<HookSlot>>,
    frame: Option<HookFrame>,
    pending: Vec<PendingEffect>,
    rendered: FxHashSet<String>,
    dirty: Rc<Cell<bool>>,
}

impl HookStore {
    fn begin(&mut self, path: String) -> Option<HookFrame> {
        self.rendered.insert(path.clone());
        self.frame.replace(HookFrame { path, cursor: 0 })
    }

    fn end(&mut self, previous: Option<HookFrame>) {
        self.frame = previous;
    }

    fn next_slot(&mut self, hook: &str) -> EvalResult<(String, usize)> {
        match &mut self.frame {
            Some(frame) => {
                let index = frame.cursor;
                frame.cursor += 1;
                Ok((frame.path.clone(), index))
            }
            None => Err(Throw::error(
                "Error",
                format!(
                    "Invalid hook call: {} can only be called inside the body of a function component",
                    hook
                ),
            )),
        }
    }

    fn slot(&self, path: &str, index: usize) -> Option<&HookSlot> {
        self.slots.get(path).and_then(|s| s.get(index))
    }

    fn slot_mut(&mut self, path: &str, index: usize) -> Option<&mut HookSlot> {
        self.slots.get_mut(path).and_then(|s| s.get_mut(index))
    }

    fn store(&mut self, path: &str, index: usize, slot: HookSlot) {
        let slots = self.slots.entry(path.to_string()).or_default();
        if index < slots.len() {
            slots[index] = slot;
        } else {
            slots.push(slot);
        }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.get()
    }
}

fn hook_order_error() -> Throw {
    Throw::error("Error", "Rendered hooks in a different order than the previous render")
}

fn deps_of(value: Option<&Value>) -> Option<Vec<Value>> {
    match value {
        Some(Value::Array(items)) => Some(items.borrow().clone()),
        _ => None,
    }
}

fn deps_changed(prev: &Option<Vec<Value>>, next: &Option<Vec<Value>>) -> bool {
    match (prev, next) {
        (Some(a), Some(b)) => a.len() != b.len() || a.iter().zip(b).any(|(x, y)| !x.same_value(y)),
        _ => true,
    }
}

pub(crate) fn use_state(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> EvalResult<Value> {
    let (path, index) = interp.host.hooks.next_slot("useState")?;
    if let Some(slot) = interp.host.hooks.slot(&path, index) {
        return match slot {
            HookSlot::State { cell, setter } => {
                Ok(Value::array(vec![cell.borrow().clone(), setter.clone()]))
            }
            _ => Err(hook_order_error()),
        };
    }

    let initial = match args.into_iter().next() {
        Some(init) if init.is_callable() => interp.call(&init, Value::Undefined, Vec::new())?,
        Some(init) => init,
        None => Value::Undefined,
    };
    let cell = Rc::new(RefCell::new(initial.clone()));
    let dirty = interp.host.hooks.dirty.clone();
    let state = cell.clone();
    let setter = Value::native("setState", move |interp, _this, args| {
        let next = args.into_iter().next().unwrap_or(Value::Undefined);
        let prev = state.borrow().clone();
        let next = if next.is_callable() {
            interp.call(&next, Value::Undefined, vec![prev.clone()])?
        } else {
            next
        };
        if !prev.same_value(&next) {
            *state.borrow_mut() = next;
            dirty.set(true);
        }
        Ok(Value::Undefined)
    });
    interp.host.hooks.store(
        &path,
        index,
        HookSlot::State {
            cell,
            setter: setter.clone(),
        },
    );
    Ok(Value::array(vec![initial, setter]))
}

pub(crate) fn use_ref(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> EvalResult<Value> {
    let (path, index) = interp.host.hooks.next_slot("useRef")?;
    if let Some(slot) = interp.host.hooks.slot(&path, index) {
        return match slot {
            HookSlot::Ref(r) => Ok(r.clone()),
            _ => Err(hook_order_error()),
        };
    }
    let initial = args.into_iter().next().unwrap_or(Value::Undefined);
    let r = Value::object_from([("current", initial)]);
    interp.host.hooks.store(&path, index, HookSlot::Ref(r.clone()));
    Ok(r)
}

pub(crate) fn use_effect(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> EvalResult<Value> {
    let (path, index) = interp.host.hooks.next_slot("useEffect")?;
    let callback = args.first().cloned().unwrap_or(Value::Undefined);
    let deps = deps_of(args.get(1));

    let changed = match interp.host.hooks.slot_mut(&path, index) {
        Some(HookSlot::Effect { deps: prev, .. }) => {
            let changed = deps_changed(prev, &deps);
            if changed {
                *prev = deps;
            }
            changed
        }
        Some(_) => return Err(hook_order_error()),
        None => {
            interp
                .host
                .hooks
                .store(&path, index, HookSlot::Effect { deps, cleanup: None });
            true
        }
    };
    if changed && callback.is_callable() {
        interp.host.hooks.pending.push(PendingEffect {
            path,
            index,
            callback,
        });
    }
    Ok(Value::Undefined)
}

pub(crate) fn use_memo(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> EvalResult<Value> {
    let (path, index) = interp.host.hooks.next_slot("useMemo")?;
    let factory = args.first().cloned().unwrap_or(Value::Undefined);
    let deps = deps_of(args.get(1));
    if let Some(slot) = interp.host.hooks.slot(&path, index) {
        match slot {
            HookSlot::Memo { deps: prev, value } if !deps_changed(prev, &deps) => {
                return Ok(value.clone())
            }
            HookSlot::Memo { .. } => {}
            _ => return Err(hook_order_error()),
        }
    }
    let value = interp.call(&factory, Value::Undefined, Vec::new())?;
    interp.host.hooks.store(
        &path,
        index,
        HookSlot::Memo {
            deps,
            value: value.clone(),
        },
    );
    Ok(value)
}

pub(crate) fn use_callback(interp: &mut Interpreter, _this: Value, args: Vec<Value>) -> EvalResult<Value> {
    let (path, index) = interp.host.hooks.next_slot("useCallback")?;
    let callback = args.first().cloned().unwrap_or(Value::Undefined);
    let deps = deps_of(args.get(1));
    if let Some(slot) = interp.host.hooks.slot(&path, index) {
        match slot {
            HookSlot::Memo { deps: prev, value } if !deps_changed(prev, &deps) => {
                return Ok(value.clone())
            }
            HookSlot::Memo { .. } => {}
            _ => return Err(hook_order_error()),
        }
    }
    interp.host.hooks.store(
        &path,
        index,
        HookSlot::Memo {
            deps,
            value: callback.clone(),
        },
    );
    Ok(callback)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TIMERS
// ═══════════════════════════════════════════════════════════════════════════════

struct Timer {
    id: u32,
    due: f64,
    interval: Option<f64>,
    callback: Value,
    args: Vec<Value>,
}

/// Virtual clock; timers only fire when the host advances it.
#[derive(Default)]
pub(crate) struct TimerQueue {
    now: f64,
    next_id: u32,
    timers: Vec<Timer>,
}

impl TimerQueue {
    pub(crate) fn schedule(&mut self, callback: Value, delay: f64, repeat: bool, args: Vec<Value>) -> u32 {
        self.next_id += 1;
        let delay = if delay.is_finite() { delay.max(0.0) } else { 0.0 };
        self.timers.push(Timer {
            id: self.next_id,
            due: self.now + delay,
            interval: repeat.then_some(delay.max(1.0)),
            callback,
            args,
        });
        self.next_id
    }

    pub(crate) fn cancel(&mut self, id: u32) {
        self.timers.retain(|t| t.id != id);
    }

    pub(crate) fn now(&self) -> f64 {
        self.now
    }

    pub(crate) fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Pops the earliest timer due at or before `until`, rescheduling
    /// intervals.
    fn pop_due(&mut self, until: f64) -> Option<(Value, Vec<Value>)> {
        let (pos, _) = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= until)
            .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.id.cmp(&b.id)))?;
        self.now = self.now.max(self.timers[pos].due);
        let fired = match self.timers[pos].interval {
            Some(interval) => {
                let timer = &mut self.timers[pos];
                timer.due += interval;
                (timer.callback.clone(), timer.args.clone())
            }
            None => {
                let timer = self.timers.remove(pos);
                (timer.callback, timer.args)
            }
        };
        Some(fired)
    }
}

#[derive(Default)]
pub(crate) struct HostState {
    pub(crate) hooks: HookStore,
    pub(crate) timers: TimerQueue,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDERING
// ═══════════════════════════════════════════════════════════════════════════════

const MAX_TIMER_FIRINGS: usize = 10_000;

struct RenderPass<'a> {
    interp: &'a mut Interpreter,
    stack: Vec<String>,
    failed_stack: Option<Vec<String>>,
    depth: usize,
}

impl<'a> RenderPass<'a> {
    fn render(&mut self, value: &Value, path: &str) -> EvalResult<Vec<RenderNode>> {
        let limit = self.interp.limits().max_nesting_depth;
        if self.depth >= limit {
            let throw = self.interp.error(
                "RangeError",
                format!("render tree nests deeper than {} levels", limit),
            );
            return Err(self.fail(throw));
        }
        self.depth += 1;
        let result = with_stack(|| self.render_value(value, path));
        self.depth -= 1;
        result
    }

    fn render_value(&mut self, value: &Value, path: &str) -> EvalResult<Vec<RenderNode>> {
        match value {
            Value::Undefined | Value::Null | Value::Bool(_) => Ok(Vec::new()),
            Value::Number(_) | Value::String(_) => Ok(vec![RenderNode::Text(value.to_js_string())]),
            Value::Array(items) => {
                let items = items.borrow().clone();
                let mut out = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    let segment = match item {
                        Value::Element(el) => el.key.clone().unwrap_or_else(|| i.to_string()),
                        _ => i.to_string(),
                    };
                    out.extend(self.render(item, &format!("{}/{}", path, segment))?);
                }
                Ok(out)
            }
            Value::Function(f) => {
                warn!(function = %f.name, "functions are not valid as a child; ignored");
                Ok(Vec::new())
            }
            Value::Object(_) | Value::RegExp(_) => Err(self.fail(Throw::error(
                "Error",
                format!(
                    "Objects are not valid as a child (found: {}). Render a list with an array instead.",
                    value.inspect()
                ),
            ))),
            Value::Element(el) => self.render_element(el, path),
        }
    }

    fn render_element(&mut self, el: &Element, path: &str) -> EvalResult<Vec<RenderNode>> {
        match &el.element_type {
            ElementType::Fragment => {
                let children = el.props.borrow().get("children").cloned();
                match children {
                    Some(c) => self.render(&c, path),
                    None => Ok(Vec::new()),
                }
            }
            ElementType::Intrinsic(tag) => {
                let mut attributes = el.props.borrow().clone();
                let children = attributes.shift_remove("children");
                let children = match children {
                    Some(c) => self.render(&c, &format!("{}/{}", path, tag))?,
                    None => Vec::new(),
                };
                Ok(vec![RenderNode::Element {
                    tag: tag.to_string(),
                    key: el.key.clone(),
                    attributes,
                    children,
                }])
            }
            ElementType::Component(component) => {
                let name = el.type_name();
                let frame_path = format!("{}:{}", path, name);
                self.stack.push(name);

                let props = Value::Object(Rc::new(RefCell::new(el.props.borrow().clone())));
                let previous = self.interp.host.hooks.begin(frame_path.clone());
                let result = self.interp.call(component, Value::Undefined, vec![props]);
                self.interp.host.hooks.end(previous);

                let output = match result {
                    Ok(v) => v,
                    Err(throw) => {
                        let throw = self.fail(throw);
                        self.stack.pop();
                        return Err(throw);
                    }
                };
                let nodes = self.render(&output, &frame_path);
                self.stack.pop();
                nodes
            }
        }
    }

    /// Remembers the component stack of the innermost failure.
    fn fail(&mut self, throw: Throw) -> Throw {
        if self.failed_stack.is_none() {
            self.failed_stack = Some(self.stack.clone());
        }
        throw
    }
}

/// A mounted component: its rendered tree plus the interpreter that owns
/// its closures and hook state.
pub struct RenderSession {
    interpreter: Interpreter,
    root: Value,
    tree: Vec<RenderNode>,
    passes: usize,
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("root", &self.root)
            .field("tree", &self.tree)
            .finish()
    }
}

/// Mounts `component` and renders it until state settles.
pub fn first_render(component: Value, interpreter: Interpreter) -> Result<RenderSession, RuntimeError> {
    if !component.is_callable() {
        return Err(RuntimeError {
            message: format!("{} is not a component", component.inspect()),
            detail: String::new(),
        });
    }
    let mut session = RenderSession {
        interpreter,
        root: component,
        tree: Vec::new(),
        passes: 0,
    };
    session.rerender()?;
    Ok(session)
}

impl RenderSession {
    pub fn tree(&self) -> &[RenderNode] {
        &self.tree
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn component(&self) -> &Value {
        &self.root
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Render passes executed so far, including re-renders.
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        for node in &self.tree {
            node.write_markup(&mut out);
        }
        out
    }

    pub fn text(&self) -> String {
        self.tree.iter().map(|n| n.text()).collect()
    }

    pub fn node(&self, path: &[usize]) -> Option<&RenderNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.tree.get(*first)?;
        for i in rest {
            node = node.children().get(*i)?;
        }
        Some(node)
    }

    /// Depth-first search for the first node matching `pred`.
    pub fn find_path(&self, pred: impl Fn(&RenderNode) -> bool) -> Option<Vec<usize>> {
        fn walk(nodes: &[RenderNode], pred: &dyn Fn(&RenderNode) -> bool, path: &mut Vec<usize>) -> bool {
            for (i, node) in nodes.iter().enumerate() {
                path.push(i);
                if pred(node) || walk(node.children(), pred, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        let mut path = Vec::new();
        walk(&self.tree, &pred, &mut path).then_some(path)
    }

    /// Re-renders from the root until no state update is pending.
    pub fn rerender(&mut self) -> Result<(), RuntimeError> {
        let max_passes = self.interpreter.limits().max_render_passes;
        for _ in 0..max_passes {
            self.interpreter.host.hooks.dirty.set(false);
            self.interpreter.host.hooks.rendered.clear();
            self.interpreter.reset_budget();
            self.passes += 1;

            let root = Value::Element(Rc::new(Element {
                element_type: ElementType::Component(self.root.clone()),
                key: None,
                props: Rc::new(RefCell::new(PropertyMap::new())),
            }));
            let mut pass = RenderPass {
                interp: &mut self.interpreter,
                stack: Vec::new(),
                failed_stack: None,
                depth: 0,
            };
            let rendered = pass.render(&root, "");
            let failed_stack = pass.failed_stack.take();
            self.tree = rendered.map_err(|throw| runtime_error(&throw, failed_stack))?;

            self.unmount_stale().map_err(|t| runtime_error(&t, None))?;
            self.run_effects().map_err(|t| runtime_error(&t, None))?;

            if !self.interpreter.host.hooks.is_dirty() {
                debug!(passes = self.passes, nodes = self.tree.len(), "render settled");
                return Ok(());
            }
        }
        Err(RuntimeError {
            message: format!(
                "Too many re-renders: state kept changing after {} passes",
                max_passes
            ),
            detail: self.root_name(),
        })
    }

    fn root_name(&self) -> String {
        match &self.root {
            Value::Function(f) if !f.name.is_empty() => f.name.clone(),
            _ => "Anonymous".to_string(),
        }
    }

    fn run_effects(&mut self) -> EvalResult<()> {
        let pending = std::mem::take(&mut self.interpreter.host.hooks.pending);
        for effect in pending {
            let cleanup = match self.interpreter.host.hooks.slot_mut(&effect.path, effect.index) {
                Some(HookSlot::Effect { cleanup, .. }) => cleanup.take(),
                _ => None,
            };
            if let Some(cleanup) = cleanup {
                self.interpreter.call(&cleanup, Value::Undefined, Vec::new())?;
            }
            let result = self
                .interpreter
                .call(&effect.callback, Value::Undefined, Vec::new())?;
            if result.is_callable() {
                if let Some(HookSlot::Effect { cleanup, .. }) =
                    self.interpreter.host.hooks.slot_mut(&effect.path, effect.index)
                {
                    *cleanup = Some(result);
                }
            }
        }
        Ok(())
    }

    /// Drops hook state of components that left the tree, running their
    /// effect cleanups.
    fn unmount_stale(&mut self) -> EvalResult<()> {
        let hooks = &mut self.interpreter.host.hooks;
        let stale: Vec<String> = hooks
            .slots
            .keys()
            .filter(|p| !hooks.rendered.contains(*p))
            .cloned()
            .collect();
        let mut cleanups = Vec::new();
        for path in stale {
            if let Some(slots) = hooks.slots.remove(&path) {
                for slot in slots {
                    if let HookSlot::Effect {
                        cleanup: Some(c), ..
                    } = slot
                    {
                        cleanups.push(c);
                    }
                }
            }
            hooks.pending.retain(|e| e.path != path);
        }
        for cleanup in cleanups {
            self.interpreter.call(&cleanup, Value::Undefined, Vec::new())?;
        }
        Ok(())
    }

    /// Invokes the event handler `event` (`onClick` or `click`) on the node
    /// at `path`, then re-renders if state changed.
    pub fn dispatch(&mut self, path: &[usize], event: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let prop = if event.starts_with("on") {
            event.to_string()
        } else {
            let mut chars = event.chars();
            match chars.next() {
                Some(c) => format!("on{}{}", c.to_ascii_uppercase(), chars.as_str()),
                None => String::new(),
            }
        };
        let handler = self
            .node(path)
            .and_then(|n| n.attribute(&prop))
            .cloned()
            .filter(Value::is_callable)
            .ok_or_else(|| RuntimeError {
                message: format!("no {} handler at {:?}", prop, path),
                detail: String::new(),
            })?;

        self.interpreter.reset_budget();
        let result = self
            .interpreter
            .call(&handler, Value::Undefined, args)
            .map_err(|t| runtime_error(&t, None))?;
        if self.interpreter.host.hooks.is_dirty() {
            self.rerender()?;
        }
        Ok(result)
    }

    /// Moves the virtual clock forward, firing due timers in order.
    pub fn advance_timers(&mut self, ms: f64) -> Result<usize, RuntimeError> {
        let until = self.interpreter.host.timers.now() + ms.max(0.0);
        let mut fired = 0;
        while fired < MAX_TIMER_FIRINGS {
            let Some((callback, args)) = self.interpreter.host.timers.pop_due(until) else {
                break;
            };
            self.interpreter.reset_budget();
            self.interpreter
                .call(&callback, Value::Undefined, args)
                .map_err(|t| runtime_error(&t, None))?;
            fired += 1;
        }
        self.interpreter.host.timers.now = until;
        if self.interpreter.host.hooks.is_dirty() {
            self.rerender()?;
        }
        Ok(fired)
    }

    pub fn pending_timers(&self) -> usize {
        self.interpreter.host.timers.pending()
    }

    /// Calls the root component directly with `props`, outside the tree.
    pub fn invoke_component(&mut self, props: Value) -> Result<Value, RuntimeError> {
        self.interpreter.reset_budget();
        let previous = self.interpreter.host.hooks.begin("#invoke".to_string());
        let result = self.interpreter.call(&self.root, Value::Undefined, vec![props]);
        self.interpreter.host.hooks.end(previous);
        self.interpreter.host.hooks.slots.remove("#invoke");
        self.interpreter.host.hooks.pending.retain(|e| e.path != "#invoke");
        result.map_err(|t| runtime_error(&t, None))
    }
}

/// Minimal event object: `{ target: { value }, preventDefault() }`.
pub fn synthetic_event(value: Option<&str>) -> Value {
    let target = match value {
        Some(v) => Value::object_from([("value", Value::string(v))]),
        None => Value::object(PropertyMap::new()),
    };
    Value::object_from([
        ("target", target),
        (
            "preventDefault",
            Value::native("preventDefault", |_, _, _| Ok(Value::Undefined)),
        ),
        (
            "stopPropagation",
            Value::native("stopPropagation", |_, _, _| Ok(Value::Undefined)),
        ),
    ])
}

fn runtime_error(throw: &Throw, component_stack: Option<Vec<String>>) -> RuntimeError {
    let detail = match component_stack {
        Some(stack) if !stack.is_empty() => stack.join(" > "),
        _ => throw.stack_trace(),
    };
    RuntimeError {
        message: throw.message(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxLimits;

    #[test]
    fn test_create_element_lifts_key_and_children() {
        let mut interp = Interpreter::new(SandboxLimits::default());
        let props = Value::object_from([("key", Value::from(7.0)), ("id", Value::from("x"))]);
        let el = create_element(
            &mut interp,
            Value::Undefined,
            vec![Value::from("li"), props, Value::from("a")],
        )
        .unwrap();
        match el {
            Value::Element(el) => {
                assert_eq!(el.key.as_deref(), Some("7"));
                let props = el.props.borrow();
                assert!(props.get("key").is_none());
                assert_eq!(props.get("children"), Some(&Value::from("a")));
            }
            other => panic!("expected element, got {:?}", other),
        }
    }

    #[test]
    fn test_markup_escapes_and_maps_class_name() {
        let node = RenderNode::Element {
            tag: "p".into(),
            key: None,
            attributes: IndexMap::from([
                ("className".to_string(), Value::from("note")),
                ("onClick".to_string(), Value::native("h", |_, _, _| Ok(Value::Undefined))),
            ]),
            children: vec![RenderNode::Text("a < b".into())],
        };
        let mut out = String::new();
        node.write_markup(&mut out);
        assert_eq!(out, "<p class=\"note\">a &lt; b</p>");
    }

    #[test]
    fn test_hook_outside_render_is_rejected() {
        let mut interp = Interpreter::new(SandboxLimits::default());
        let err = use_state(&mut interp, Value::Undefined, vec![Value::from(0.0)]).unwrap_err();
        assert!(err.message().contains("Invalid hook call"));
    }

    #[test]
    fn test_interval_timer_reschedules() {
        let mut timers = TimerQueue::default();
        timers.schedule(Value::Undefined, 100.0, true, Vec::new());
        assert!(timers.pop_due(250.0).is_some());
        assert!(timers.pop_due(250.0).is_some());
        assert!(timers.pop_due(250.0).is_none());
        assert_eq!(timers.pending(), 1);
    }
}
