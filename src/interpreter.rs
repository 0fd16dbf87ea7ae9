//! Tree-walking evaluator for the sandbox's JavaScript subset.

use oxc_syntax::operator::{
    AssignmentOperator, BinaryOperator, LogicalOperator, UnaryOperator, UpdateOperator,
};
use std::rc::Rc;
use tracing::trace;

use crate::config::SandboxLimits;
use crate::error::Diagnostic;
use crate::intrinsics;
use crate::ir::{
    DeclKind, Expr, ForHead, ForInit, FunctionBody, ListItem, Literal, MemberProp, ObjectItem,
    Pattern, PropKey, Stmt, VarDecl,
};
use crate::regexp::{self, RegExpObject};
use crate::render::HostState;
use crate::scope::{AssignError, LookupError, Scope};
use crate::value::{
    format_number, make_error, ElementType, FunctionKind, Value, MAX_STRING_LENGTH,
};

/// Free stack below which recursion continues on a freshly allocated segment.
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_SEGMENT: usize = 4 * 1024 * 1024;

/// Runs `f`, first moving to a new stack segment if the current one is low.
/// Nesting is then bounded by the sandbox limits instead of the host thread's
/// stack size.
pub(crate) fn with_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, f)
}

// ═══════════════════════════════════════════════════════════════════════════════
// THROW
// ═══════════════════════════════════════════════════════════════════════════════

/// A JavaScript exception in flight.
#[derive(Debug, Clone)]
pub struct Throw {
    pub value: Value,
    /// Function names active when the exception was raised, outermost first.
    pub stack: Vec<String>,
    /// Resource-limit failures cannot be caught by user `try`.
    pub fatal: bool,
}

impl Throw {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            stack: Vec::new(),
            fatal: false,
        }
    }

    pub fn error(name: &str, message: impl AsRef<str>) -> Self {
        Self::new(make_error(name, message.as_ref()))
    }

    pub fn type_error(message: impl AsRef<str>) -> Self {
        Self::error("TypeError", message)
    }

    pub fn reference_error(message: impl AsRef<str>) -> Self {
        Self::error("ReferenceError", message)
    }

    /// `Name: message` for error objects, string conversion otherwise.
    pub fn message(&self) -> String {
        describe_thrown(&self.value)
    }

    pub fn stack_trace(&self) -> String {
        if self.stack.is_empty() {
            String::new()
        } else {
            format!("at {}", self.stack.join(" > "))
        }
    }
}

pub fn describe_thrown(value: &Value) -> String {
    match (value.get_own("name"), value.get_own("message")) {
        (Some(name), Some(message)) => {
            let message = message.to_js_string();
            if message.is_empty() {
                name.to_js_string()
            } else {
                format!("{}: {}", name.to_js_string(), message)
            }
        }
        (None, Some(message)) => message.to_js_string(),
        _ => value.to_js_string(),
    }
}

pub type EvalResult<T> = Result<T, Throw>;

enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

#[derive(Clone, Copy)]
enum BindMode {
    Declare { mutable: bool },
    Var,
    Assign,
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERPRETER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Interpreter {
    limits: SandboxLimits,
    steps: u64,
    call_stack: Vec<String>,
    diagnostics: Vec<Diagnostic>,
    console: Vec<String>,
    pub(crate) host: HostState,
    /// Realm whose scopes are torn down with this interpreter.
    realm: Option<Scope>,
}

impl Interpreter {
    pub fn new(limits: SandboxLimits) -> Self {
        Self {
            limits,
            steps: 0,
            call_stack: Vec::new(),
            diagnostics: Vec::new(),
            console: Vec::new(),
            host: HostState::default(),
            realm: None,
        }
    }

    /// Ties the lifetime of `realm` to this interpreter: dropping the
    /// interpreter releases every scope and closure the realm created.
    pub fn adopt_realm(&mut self, realm: Scope) {
        self.realm = Some(realm);
    }

    pub fn limits(&self) -> SandboxLimits {
        self.limits
    }

    /// Restarts the step budget; each top-level run, render pass and event
    /// dispatch gets a fresh one.
    pub fn reset_budget(&mut self) {
        self.steps = 0;
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        if !self.diagnostics.contains(&diagnostic) {
            self.diagnostics.push(diagnostic);
        }
    }

    pub fn console_output(&self) -> &[String] {
        &self.console
    }

    pub(crate) fn record_console(&mut self, line: String) {
        self.console.push(line);
    }

    /// Builds an error carrying the current call stack.
    pub fn error(&self, name: &str, message: impl AsRef<str>) -> Throw {
        let mut throw = Throw::error(name, message);
        throw.stack = self.call_stack.clone();
        throw
    }

    /// Validates a requested array length against JS rules and the sandbox cap.
    pub(crate) fn array_length(&self, len: f64) -> EvalResult<usize> {
        if len < 0.0 || len.fract() != 0.0 {
            return Err(self.error("RangeError", "Invalid array length"));
        }
        if len > self.limits.max_array_length as f64 {
            return Err(self.error(
                "RangeError",
                format!(
                    "Invalid array length: {} exceeds the sandbox limit of {}",
                    format_number(len),
                    self.limits.max_array_length
                ),
            ));
        }
        Ok(len as usize)
    }

    /// Checks the UTF-8 size of a string about to be built.
    pub(crate) fn string_length(&self, len: usize) -> EvalResult<()> {
        if len > MAX_STRING_LENGTH {
            return Err(self.error("RangeError", "Invalid string length"));
        }
        Ok(())
    }

    fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            let mut throw = self.error(
                "RangeError",
                format!(
                    "execution step limit of {} exceeded (possible infinite loop)",
                    self.limits.max_steps
                ),
            );
            throw.fatal = true;
            return Err(throw);
        }
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Programs & calls
    // ───────────────────────────────────────────────────────────────────────────

    pub fn run_program(&mut self, body: &[Stmt], scope: &Scope) -> EvalResult<()> {
        scope.declare("this", Value::Undefined, false);
        hoist_vars(body, scope);
        self.hoist_block(body, scope);
        for stmt in body {
            if let Completion::Return(_) = self.exec_stmt(stmt, scope)? {
                break;
            }
        }
        Ok(())
    }

    pub fn call(&mut self, callee: &Value, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        with_stack(|| self.call_inner(callee, this, args))
    }

    fn call_inner(&mut self, callee: &Value, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        let func = match callee {
            Value::Function(f) => f.clone(),
            other => {
                return Err(self.error(
                    "TypeError",
                    format!("{} is not a function", other.inspect()),
                ))
            }
        };
        if self.call_stack.len() >= self.limits.max_call_depth {
            let mut throw = self.error("RangeError", "Maximum call stack size exceeded");
            throw.fatal = true;
            return Err(throw);
        }
        self.tick()?;

        let label = if func.name.is_empty() {
            "<anonymous>".to_string()
        } else {
            func.name.clone()
        };
        self.call_stack.push(label);

        let result = match &func.kind {
            FunctionKind::Native(native) => {
                let native = native.clone();
                native(self, this, args)
            }
            FunctionKind::Closure { def, scope } => {
                let fn_scope = scope.extend();
                if !def.is_arrow {
                    fn_scope.declare("this", this, false);
                    fn_scope.declare("arguments", Value::array(args.clone()), true);
                    if let Some(name) = &def.name {
                        if !fn_scope.has_own(name) {
                            fn_scope.declare(name, callee.clone(), true);
                        }
                    }
                }
                self.invoke_closure(def, &fn_scope, args)
            }
        };

        let result = result.map_err(|mut throw| {
            if throw.stack.is_empty() {
                throw.stack = self.call_stack.clone();
            }
            throw
        });
        self.call_stack.pop();
        result
    }

    fn invoke_closure(
        &mut self,
        def: &crate::ir::FunctionDef,
        scope: &Scope,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        let mut args = args.into_iter();
        for param in &def.params {
            let arg = args.next().unwrap_or(Value::Undefined);
            self.bind_pattern(param, arg, scope, BindMode::Declare { mutable: true })?;
        }
        if let Some(rest) = &def.rest {
            let remaining: Vec<Value> = args.collect();
            self.bind_pattern(
                rest,
                Value::array(remaining),
                scope,
                BindMode::Declare { mutable: true },
            )?;
        }

        match &def.body {
            FunctionBody::Expr(expr) => self.eval(expr, scope),
            FunctionBody::Block(stmts) => {
                hoist_vars(stmts, scope);
                self.hoist_block(stmts, scope);
                for stmt in stmts {
                    match self.exec_stmt(stmt, scope)? {
                        Completion::Return(v) => return Ok(v),
                        Completion::Normal => {}
                        Completion::Break | Completion::Continue => break,
                    }
                }
                Ok(Value::Undefined)
            }
        }
    }

    pub fn construct(&mut self, callee: &Value, args: Vec<Value>) -> EvalResult<Value> {
        match callee {
            Value::Function(f) => match &f.kind {
                FunctionKind::Native(_) => self.call(callee, Value::Undefined, args),
                FunctionKind::Closure { def, .. } if def.is_arrow => Err(self.error(
                    "TypeError",
                    format!("{} is not a constructor", callee.inspect()),
                )),
                FunctionKind::Closure { .. } => {
                    let this = Value::object(Default::default());
                    let result = self.call(callee, this.clone(), args)?;
                    Ok(match result {
                        Value::Object(_) | Value::Array(_) | Value::Function(_) => result,
                        _ => this,
                    })
                }
            },
            other => Err(self.error(
                "TypeError",
                format!("{} is not a constructor", other.inspect()),
            )),
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Statements
    // ───────────────────────────────────────────────────────────────────────────

    fn hoist_block(&mut self, stmts: &[Stmt], scope: &Scope) {
        for stmt in stmts {
            match stmt {
                Stmt::FunctionDecl(def) => {
                    if let Some(name) = &def.name {
                        scope.declare(name, Value::closure(name.clone(), def.clone(), scope.clone()), true);
                    }
                }
                Stmt::VarDecl(VarDecl { kind, declarators }) if *kind != DeclKind::Var => {
                    let mut names = Vec::new();
                    for (pattern, _) in declarators {
                        pattern.bound_names(&mut names);
                    }
                    for name in names {
                        scope.declare_uninitialized(&name, *kind == DeclKind::Let);
                    }
                }
                _ => {}
            }
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt], scope: &Scope) -> EvalResult<Completion> {
        self.hoist_block(stmts, scope);
        for stmt in stmts {
            match self.exec_stmt(stmt, scope)? {
                Completion::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_var_decl(&mut self, decl: &VarDecl, scope: &Scope) -> EvalResult<()> {
        for (pattern, init) in &decl.declarators {
            let value = match init {
                Some(e) => self.eval(e, scope)?,
                None if decl.kind == DeclKind::Var => continue,
                None => Value::Undefined,
            };
            let mode = match decl.kind {
                DeclKind::Var => BindMode::Var,
                DeclKind::Let => BindMode::Declare { mutable: true },
                DeclKind::Const => BindMode::Declare { mutable: false },
            };
            self.bind_pattern(pattern, value, scope, mode)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &Scope) -> EvalResult<Completion> {
        with_stack(|| self.exec_stmt_inner(stmt, scope))
    }

    fn exec_stmt_inner(&mut self, stmt: &Stmt, scope: &Scope) -> EvalResult<Completion> {
        self.tick()?;
        match stmt {
            Stmt::Expr(e) => {
                self.eval(e, scope)?;
                Ok(Completion::Normal)
            }
            Stmt::VarDecl(decl) => {
                self.exec_var_decl(decl, scope)?;
                Ok(Completion::Normal)
            }
            Stmt::FunctionDecl(_) | Stmt::Empty => Ok(Completion::Normal),
            Stmt::Return(arg) => Ok(Completion::Return(match arg {
                Some(e) => self.eval(e, scope)?,
                None => Value::Undefined,
            })),
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.is_truthy() {
                    self.exec_stmt(consequent, scope)
                } else if let Some(alt) = alternate {
                    self.exec_stmt(alt, scope)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Stmt::Block(stmts) => self.exec_block(stmts, &scope.extend()),
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.exec_for(init.as_ref(), test.as_ref(), update.as_ref(), body, scope),
            Stmt::ForOf { head, right, body } => {
                let iterable = self.eval(right, scope)?;
                let items = self.iterate(&iterable)?;
                self.exec_for_each(head, items, body, scope)
            }
            Stmt::ForIn { head, right, body } => {
                let object = self.eval(right, scope)?;
                let keys = own_keys(&object).into_iter().map(Value::from).collect();
                self.exec_for_each(head, keys, body, scope)
            }
            Stmt::While { test, body } => {
                loop {
                    self.tick()?;
                    if !self.eval(test, scope)?.is_truthy() {
                        break;
                    }
                    match self.exec_stmt(body, scope)? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::DoWhile { body, test } => {
                loop {
                    self.tick()?;
                    match self.exec_stmt(body, scope)? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Normal | Completion::Continue => {}
                    }
                    if !self.eval(test, scope)?.is_truthy() {
                        break;
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::Break => Ok(Completion::Break),
            Stmt::Continue => Ok(Completion::Continue),
            Stmt::Throw(e) => {
                let value = self.eval(e, scope)?;
                let mut throw = Throw::new(value);
                throw.stack = self.call_stack.clone();
                Err(throw)
            }
            Stmt::Try {
                block,
                param,
                handler,
                finalizer,
            } => {
                let mut outcome = self.exec_block(block, &scope.extend());
                let caught = match &outcome {
                    Err(throw) if !throw.fatal => Some(throw.value.clone()),
                    _ => None,
                };
                if let (Some(value), Some(handler)) = (caught, handler) {
                    let catch_scope = scope.extend();
                    if let Some(param) = param {
                        self.bind_pattern(
                            param,
                            value,
                            &catch_scope,
                            BindMode::Declare { mutable: true },
                        )?;
                    }
                    outcome = self.exec_block(handler, &catch_scope);
                }
                if let Some(finalizer) = finalizer {
                    match self.exec_block(finalizer, &scope.extend())? {
                        Completion::Normal => {}
                        abrupt => return Ok(abrupt),
                    }
                }
                outcome
            }
            Stmt::Switch {
                discriminant,
                cases,
            } => {
                let value = self.eval(discriminant, scope)?;
                let switch_scope = scope.extend();
                for case in cases {
                    self.hoist_block(&case.body, &switch_scope);
                }
                let mut start = None;
                for (i, case) in cases.iter().enumerate() {
                    if let Some(test) = &case.test {
                        if self.eval(test, &switch_scope)?.strict_equals(&value) {
                            start = Some(i);
                            break;
                        }
                    }
                }
                let start = start.or_else(|| cases.iter().position(|c| c.test.is_none()));
                if let Some(start) = start {
                    for case in &cases[start..] {
                        for stmt in &case.body {
                            match self.exec_stmt(stmt, &switch_scope)? {
                                Completion::Normal => {}
                                Completion::Break => return Ok(Completion::Normal),
                                other => return Ok(other),
                            }
                        }
                    }
                }
                Ok(Completion::Normal)
            }
        }
    }

    fn exec_for(
        &mut self,
        init: Option<&ForInit>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        scope: &Scope,
    ) -> EvalResult<Completion> {
        let loop_scope = scope.extend();
        let mut per_iteration = Vec::new();
        match init {
            Some(ForInit::VarDecl(decl)) => {
                if decl.kind != DeclKind::Var {
                    for (pattern, _) in &decl.declarators {
                        pattern.bound_names(&mut per_iteration);
                    }
                }
                self.exec_var_decl(decl, &loop_scope)?;
            }
            Some(ForInit::Expr(e)) => {
                self.eval(e, &loop_scope)?;
            }
            None => {}
        }

        // Each iteration sees a fresh copy of `let` bindings so closures
        // created in the body capture that iteration's values.
        let mut iter_scope = copy_bindings(&loop_scope, scope, &per_iteration);
        loop {
            self.tick()?;
            if let Some(test) = test {
                if !self.eval(test, &iter_scope)?.is_truthy() {
                    break;
                }
            }
            match self.exec_stmt(body, &iter_scope)? {
                Completion::Break => break,
                Completion::Return(v) => return Ok(Completion::Return(v)),
                Completion::Normal | Completion::Continue => {}
            }
            iter_scope = copy_bindings(&iter_scope, scope, &per_iteration);
            if let Some(update) = update {
                self.eval(update, &iter_scope)?;
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_for_each(
        &mut self,
        head: &ForHead,
        items: Vec<Value>,
        body: &Stmt,
        scope: &Scope,
    ) -> EvalResult<Completion> {
        for item in items {
            self.tick()?;
            let iter_scope = scope.extend();
            match head {
                ForHead::Decl { kind, pattern } => {
                    let mode = match kind {
                        DeclKind::Var => BindMode::Var,
                        DeclKind::Let => BindMode::Declare { mutable: true },
                        DeclKind::Const => BindMode::Declare { mutable: false },
                    };
                    self.bind_pattern(pattern, item, &iter_scope, mode)?;
                }
                ForHead::Target(pattern) => {
                    self.bind_pattern(pattern, item, &iter_scope, BindMode::Assign)?
                }
            }
            match self.exec_stmt(body, &iter_scope)? {
                Completion::Break => break,
                Completion::Return(v) => return Ok(Completion::Return(v)),
                Completion::Normal | Completion::Continue => {}
            }
        }
        Ok(Completion::Normal)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Patterns
    // ───────────────────────────────────────────────────────────────────────────

    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        scope: &Scope,
        mode: BindMode,
    ) -> EvalResult<()> {
        match pattern {
            Pattern::Ident(name) => self.bind_name(name, value, scope, mode),
            Pattern::Default { target, default } => {
                let value = if matches!(value, Value::Undefined) {
                    self.eval(default, scope)?
                } else {
                    value
                };
                self.bind_pattern(target, value, scope, mode)
            }
            Pattern::Object { props, rest } => {
                if value.is_nullish() {
                    return Err(self.error(
                        "TypeError",
                        format!("Cannot destructure '{}' as it is {}.", value.to_js_string(), value.to_js_string()),
                    ));
                }
                let mut used = Vec::with_capacity(props.len());
                for (key, target) in props {
                    let key = match key {
                        PropKey::Static(k) => k.clone(),
                        PropKey::Computed(e) => {
                            let v = self.eval(e, scope)?;
                            to_property_key(&v)
                        }
                    };
                    let v = self.get_property(&value, &key)?;
                    used.push(key);
                    self.bind_pattern(target, v, scope, mode)?;
                }
                if let Some(rest) = rest {
                    let mut remaining = indexmap::IndexMap::new();
                    for key in own_keys(&value) {
                        if !used.contains(&key) {
                            let v = self.get_property(&value, &key)?;
                            remaining.insert(key, v);
                        }
                    }
                    self.bind_pattern(rest, Value::object(remaining), scope, mode)?;
                }
                Ok(())
            }
            Pattern::Array { elements, rest } => {
                let items = self.iterate(&value)?;
                for (i, element) in elements.iter().enumerate() {
                    if let Some(target) = element {
                        let v = items.get(i).cloned().unwrap_or(Value::Undefined);
                        self.bind_pattern(target, v, scope, mode)?;
                    }
                }
                if let Some(rest) = rest {
                    let tail = items.get(elements.len()..).map(|s| s.to_vec()).unwrap_or_default();
                    self.bind_pattern(rest, Value::array(tail), scope, mode)?;
                }
                Ok(())
            }
            Pattern::Member { object, property } => {
                let target = self.eval(object, scope)?;
                let key = self.member_key(property, scope)?;
                self.set_property(&target, &key, value)
            }
        }
    }

    fn bind_name(&mut self, name: &str, value: Value, scope: &Scope, mode: BindMode) -> EvalResult<()> {
        match mode {
            BindMode::Declare { mutable } => {
                scope.declare(name, value, mutable);
                Ok(())
            }
            BindMode::Var => match scope.assign(name, value.clone()) {
                Err(AssignError::Undeclared) => {
                    scope.declare(name, value, true);
                    Ok(())
                }
                other => other.map_err(|e| self.assign_error(name, e)),
            },
            BindMode::Assign => scope
                .assign(name, value)
                .map_err(|e| self.assign_error(name, e)),
        }
    }

    fn assign_error(&self, name: &str, err: AssignError) -> Throw {
        match err {
            AssignError::Undeclared => {
                self.error("ReferenceError", format!("{} is not defined", name))
            }
            AssignError::Uninitialized => self.error(
                "ReferenceError",
                format!("Cannot access '{}' before initialization", name),
            ),
            AssignError::Constant => self.error("TypeError", "Assignment to constant variable."),
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Expressions
    // ───────────────────────────────────────────────────────────────────────────

    pub fn eval(&mut self, expr: &Expr, scope: &Scope) -> EvalResult<Value> {
        with_stack(|| self.eval_expr(expr, scope))
    }

    fn eval_expr(&mut self, expr: &Expr, scope: &Scope) -> EvalResult<Value> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Undefined => Value::Undefined,
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(s.clone()),
            }),
            Expr::RegExp(compiled) => {
                Ok(Value::RegExp(Rc::new(RegExpObject::new(compiled.clone()))))
            }
            Expr::Template { quasis, exprs } => {
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(e) = exprs.get(i) {
                        let part = self.eval(e, scope)?.to_js_string();
                        self.string_length(out.len() + part.len())?;
                        out.push_str(&part);
                    }
                }
                Ok(Value::from(out))
            }
            Expr::Ident(name) => self.lookup(name, scope),
            Expr::This => Ok(scope.lookup("this").unwrap_or(Value::Undefined)),
            Expr::Array(items) => Ok(Value::array(self.eval_list(items, scope)?)),
            Expr::Object(items) => self.eval_object(items, scope),
            Expr::Function(def) => Ok(Value::closure(
                def.name.clone().unwrap_or_default(),
                def.clone(),
                scope.clone(),
            )),
            Expr::Member {
                object, property, ..
            } => {
                let target = self.eval(object, scope)?;
                let key = self.member_key(property, scope)?;
                self.get_property(&target, &key)
            }
            Expr::Call { callee, args, .. } => {
                let (this, func) = match callee.as_ref() {
                    Expr::Member {
                        object, property, ..
                    } => {
                        let target = self.eval(object, scope)?;
                        let key = self.member_key(property, scope)?;
                        let func = self.get_property(&target, &key)?;
                        (target, func)
                    }
                    other => (Value::Undefined, self.eval(other, scope)?),
                };
                if !func.is_callable() {
                    return Err(self.error(
                        "TypeError",
                        format!("{} is not a function", describe_callee(callee)),
                    ));
                }
                let args = self.eval_list(args, scope)?;
                self.call(&func, this, args)
            }
            Expr::New { callee, args } => {
                let func = self.eval(callee, scope)?;
                let args = self.eval_list(args, scope)?;
                self.construct(&func, args)
            }
            Expr::Unary { op, arg } => self.eval_unary(*op, arg, scope),
            Expr::Update { op, prefix, target } => {
                let old = self.read_target(target, scope)?.to_number();
                let new = match op {
                    UpdateOperator::Increment => old + 1.0,
                    UpdateOperator::Decrement => old - 1.0,
                };
                self.bind_pattern(target, Value::Number(new), scope, BindMode::Assign)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left, scope)?;
                let r = self.eval(right, scope)?;
                self.binary(*op, &l, &r)
            }
            Expr::Logical { op, left, right } => {
                let l = self.eval(left, scope)?;
                let short = match op {
                    LogicalOperator::And => !l.is_truthy(),
                    LogicalOperator::Or => l.is_truthy(),
                    LogicalOperator::Coalesce => !l.is_nullish(),
                };
                if short {
                    Ok(l)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.is_truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value, scope),
            Expr::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for e in exprs {
                    last = self.eval(e, scope)?;
                }
                Ok(last)
            }
            Expr::Chain(inner) => Ok(self.eval_chain(inner, scope)?.unwrap_or(Value::Undefined)),
        }
    }

    fn lookup(&self, name: &str, scope: &Scope) -> EvalResult<Value> {
        scope.lookup(name).map_err(|e| match e {
            LookupError::Undeclared => {
                self.error("ReferenceError", format!("{} is not defined", name))
            }
            LookupError::Uninitialized => self.error(
                "ReferenceError",
                format!("Cannot access '{}' before initialization", name),
            ),
        })
    }

    fn member_key(&mut self, property: &MemberProp, scope: &Scope) -> EvalResult<String> {
        match property {
            MemberProp::Static(name) => Ok(name.clone()),
            MemberProp::Computed(e) => {
                let v = self.eval(e, scope)?;
                Ok(to_property_key(&v))
            }
        }
    }

    /// Evaluates inside an optional chain; `None` means the chain
    /// short-circuited.
    fn eval_chain(&mut self, expr: &Expr, scope: &Scope) -> EvalResult<Option<Value>> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let target = match self.eval_chain(object, scope)? {
                    Some(v) => v,
                    None => return Ok(None),
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.member_key(property, scope)?;
                Ok(Some(self.get_property(&target, &key)?))
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                let (this, func) = match callee.as_ref() {
                    Expr::Member {
                        object,
                        property,
                        optional: member_optional,
                    } => {
                        let target = match self.eval_chain(object, scope)? {
                            Some(v) => v,
                            None => return Ok(None),
                        };
                        if *member_optional && target.is_nullish() {
                            return Ok(None);
                        }
                        let key = self.member_key(property, scope)?;
                        let func = self.get_property(&target, &key)?;
                        (target, func)
                    }
                    other => match self.eval_chain(other, scope)? {
                        Some(f) => (Value::Undefined, f),
                        None => return Ok(None),
                    },
                };
                if *optional && func.is_nullish() {
                    return Ok(None);
                }
                if !func.is_callable() {
                    return Err(self.error(
                        "TypeError",
                        format!("{} is not a function", describe_callee(callee)),
                    ));
                }
                let args = self.eval_list(args, scope)?;
                Ok(Some(self.call(&func, this, args)?))
            }
            other => Ok(Some(self.eval(other, scope)?)),
        }
    }

    fn eval_list(&mut self, items: &[ListItem], scope: &Scope) -> EvalResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ListItem::Item(e) => out.push(self.eval(e, scope)?),
                ListItem::Spread(e) => {
                    let v = self.eval(e, scope)?;
                    out.extend(self.iterate(&v)?);
                }
                ListItem::Hole => out.push(Value::Undefined),
            }
        }
        Ok(out)
    }

    fn eval_object(&mut self, items: &[ObjectItem], scope: &Scope) -> EvalResult<Value> {
        let object = Value::object(Default::default());
        let mut getters = Vec::new();
        for item in items {
            match item {
                ObjectItem::Prop(key, value) => {
                    let key = match key {
                        PropKey::Static(k) => k.clone(),
                        PropKey::Computed(e) => {
                            let v = self.eval(e, scope)?;
                            to_property_key(&v)
                        }
                    };
                    let value = self.eval(value, scope)?;
                    self.set_property(&object, &key, value)?;
                }
                ObjectItem::Getter(key, def) => {
                    let key = match key {
                        PropKey::Static(k) => k.clone(),
                        PropKey::Computed(e) => {
                            let v = self.eval(e, scope)?;
                            to_property_key(&v)
                        }
                    };
                    getters.push((key, Value::closure(String::new(), def.clone(), scope.clone())));
                }
                ObjectItem::Spread(e) => {
                    let source = self.eval(e, scope)?;
                    for key in own_keys(&source) {
                        let v = self.get_property(&source, &key)?;
                        self.set_property(&object, &key, v)?;
                    }
                }
            }
        }
        // Getters are evaluated once, after the literal is complete.
        for (key, getter) in getters {
            let v = self.call(&getter, object.clone(), Vec::new())?;
            self.set_property(&object, &key, v)?;
        }
        Ok(object)
    }

    fn eval_unary(&mut self, op: UnaryOperator, arg: &Expr, scope: &Scope) -> EvalResult<Value> {
        if op == UnaryOperator::Typeof {
            if let Expr::Ident(name) = arg {
                return Ok(match scope.lookup(name) {
                    Ok(v) => Value::string(v.type_of()),
                    Err(LookupError::Undeclared) => Value::string("undefined"),
                    Err(LookupError::Uninitialized) => return self.lookup(name, scope),
                });
            }
        }
        if op == UnaryOperator::Delete {
            if let Expr::Member {
                object, property, ..
            } = arg
            {
                let target = self.eval(object, scope)?;
                let key = self.member_key(property, scope)?;
                return Ok(Value::Bool(delete_property(&target, &key)));
            }
            return Ok(Value::Bool(true));
        }
        let v = self.eval(arg, scope)?;
        Ok(match op {
            UnaryOperator::UnaryNegation => Value::Number(-v.to_number()),
            UnaryOperator::UnaryPlus => Value::Number(v.to_number()),
            UnaryOperator::LogicalNot => Value::Bool(!v.is_truthy()),
            UnaryOperator::BitwiseNot => Value::Number(!to_int32(v.to_number()) as f64),
            UnaryOperator::Typeof => Value::string(v.type_of()),
            UnaryOperator::Void => Value::Undefined,
            UnaryOperator::Delete => Value::Bool(true),
        })
    }

    fn read_target(&mut self, target: &Pattern, scope: &Scope) -> EvalResult<Value> {
        match target {
            Pattern::Ident(name) => self.lookup(name, scope),
            Pattern::Member { object, property } => {
                let obj = self.eval(object, scope)?;
                let key = self.member_key(property, scope)?;
                self.get_property(&obj, &key)
            }
            _ => Err(self.error("SyntaxError", "Invalid left-hand side in assignment")),
        }
    }

    fn eval_assign(
        &mut self,
        op: AssignmentOperator,
        target: &Pattern,
        value: &Expr,
        scope: &Scope,
    ) -> EvalResult<Value> {
        if op == AssignmentOperator::Assign {
            let v = self.eval(value, scope)?;
            self.bind_pattern(target, v.clone(), scope, BindMode::Assign)?;
            return Ok(v);
        }

        let current = self.read_target(target, scope)?;
        let logical = match op {
            AssignmentOperator::LogicalOr => Some(!current.is_truthy()),
            AssignmentOperator::LogicalAnd => Some(current.is_truthy()),
            AssignmentOperator::LogicalNullish => Some(current.is_nullish()),
            _ => None,
        };
        if let Some(should_assign) = logical {
            if !should_assign {
                return Ok(current);
            }
            let v = self.eval(value, scope)?;
            self.bind_pattern(target, v.clone(), scope, BindMode::Assign)?;
            return Ok(v);
        }

        let rhs = self.eval(value, scope)?;
        let binop = match op {
            AssignmentOperator::Addition => BinaryOperator::Addition,
            AssignmentOperator::Subtraction => BinaryOperator::Subtraction,
            AssignmentOperator::Multiplication => BinaryOperator::Multiplication,
            AssignmentOperator::Division => BinaryOperator::Division,
            AssignmentOperator::Remainder => BinaryOperator::Remainder,
            AssignmentOperator::Exponential => BinaryOperator::Exponential,
            AssignmentOperator::ShiftLeft => BinaryOperator::ShiftLeft,
            AssignmentOperator::ShiftRight => BinaryOperator::ShiftRight,
            AssignmentOperator::ShiftRightZeroFill => BinaryOperator::ShiftRightZeroFill,
            AssignmentOperator::BitwiseOR => BinaryOperator::BitwiseOR,
            AssignmentOperator::BitwiseXOR => BinaryOperator::BitwiseXOR,
            AssignmentOperator::BitwiseAnd => BinaryOperator::BitwiseAnd,
            _ => BinaryOperator::Addition,
        };
        let v = self.binary(binop, &current, &rhs)?;
        self.bind_pattern(target, v.clone(), scope, BindMode::Assign)?;
        Ok(v)
    }

    pub fn binary(&mut self, op: BinaryOperator, l: &Value, r: &Value) -> EvalResult<Value> {
        use BinaryOperator::*;
        Ok(match op {
            Addition => {
                let stringy = |v: &Value| {
                    matches!(
                        v,
                        Value::String(_)
                            | Value::Array(_)
                            | Value::Object(_)
                            | Value::Function(_)
                            | Value::Element(_)
                            | Value::RegExp(_)
                    )
                };
                if stringy(l) || stringy(r) {
                    let (l, r) = (l.to_js_string(), r.to_js_string());
                    self.string_length(l.len() + r.len())?;
                    Value::from(l + &r)
                } else {
                    Value::Number(l.to_number() + r.to_number())
                }
            }
            Subtraction => Value::Number(l.to_number() - r.to_number()),
            Multiplication => Value::Number(l.to_number() * r.to_number()),
            Division => Value::Number(l.to_number() / r.to_number()),
            Remainder => Value::Number(l.to_number() % r.to_number()),
            Exponential => Value::Number(l.to_number().powf(r.to_number())),
            Equality => Value::Bool(l.loose_equals(r)),
            Inequality => Value::Bool(!l.loose_equals(r)),
            StrictEquality => Value::Bool(l.strict_equals(r)),
            StrictInequality => Value::Bool(!l.strict_equals(r)),
            LessThan | LessEqualThan | GreaterThan | GreaterEqualThan => {
                Value::Bool(compare(op, l, r))
            }
            ShiftLeft => Value::Number(
                to_int32(l.to_number()).wrapping_shl(to_uint32(r.to_number()) & 31) as f64,
            ),
            ShiftRight => Value::Number(
                to_int32(l.to_number()).wrapping_shr(to_uint32(r.to_number()) & 31) as f64,
            ),
            ShiftRightZeroFill => Value::Number(
                to_uint32(l.to_number()).wrapping_shr(to_uint32(r.to_number()) & 31) as f64,
            ),
            BitwiseOR => Value::Number((to_int32(l.to_number()) | to_int32(r.to_number())) as f64),
            BitwiseXOR => Value::Number((to_int32(l.to_number()) ^ to_int32(r.to_number())) as f64),
            BitwiseAnd => Value::Number((to_int32(l.to_number()) & to_int32(r.to_number())) as f64),
            In => match r {
                Value::Object(_) | Value::Array(_) | Value::Function(_) => {
                    let key = to_property_key(l);
                    Value::Bool(own_keys(r).contains(&key) || (key == "length" && matches!(r, Value::Array(_))))
                }
                other => {
                    return Err(self.error(
                        "TypeError",
                        format!("Cannot use 'in' operator to search for '{}' in {}", l.to_js_string(), other.to_js_string()),
                    ))
                }
            },
            Instanceof => Value::Bool(instance_of(l, r)),
        })
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Property access
    // ───────────────────────────────────────────────────────────────────────────

    pub fn get_property(&mut self, target: &Value, key: &str) -> EvalResult<Value> {
        match target {
            Value::Undefined | Value::Null => Err(self.error(
                "TypeError",
                format!(
                    "Cannot read properties of {} (reading '{}')",
                    target.to_js_string(),
                    key
                ),
            )),
            Value::Object(map) => {
                if let Some(v) = map.borrow().get(key) {
                    return Ok(v.clone());
                }
                Ok(intrinsics::object_method(key).unwrap_or(Value::Undefined))
            }
            Value::Array(items) => {
                if key == "length" {
                    return Ok(Value::Number(items.borrow().len() as f64));
                }
                if let Ok(index) = key.parse::<usize>() {
                    return Ok(items.borrow().get(index).cloned().unwrap_or(Value::Undefined));
                }
                Ok(intrinsics::array_method(key).unwrap_or(Value::Undefined))
            }
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Ok(index) = key.parse::<usize>() {
                    return Ok(s
                        .chars()
                        .nth(index)
                        .map(|c| Value::from(c.to_string()))
                        .unwrap_or(Value::Undefined));
                }
                Ok(intrinsics::string_method(key).unwrap_or(Value::Undefined))
            }
            Value::Number(_) => Ok(intrinsics::number_method(key).unwrap_or(Value::Undefined)),
            Value::Bool(_) => Ok(intrinsics::object_method(key).unwrap_or(Value::Undefined)),
            Value::Function(f) => {
                if let Some(v) = f.properties.borrow().get(key) {
                    return Ok(v.clone());
                }
                Ok(match key {
                    "name" => Value::string(&f.name),
                    "length" => Value::Number(match &f.kind {
                        FunctionKind::Closure { def, .. } => def.params.len() as f64,
                        FunctionKind::Native(_) => 0.0,
                    }),
                    _ => intrinsics::function_method(key).unwrap_or(Value::Undefined),
                })
            }
            Value::Element(el) => Ok(match key {
                "props" => Value::Object(el.props.clone()),
                "key" => el.key.clone().map_or(Value::Null, Value::from),
                "type" => match &el.element_type {
                    ElementType::Intrinsic(tag) => Value::String(tag.clone()),
                    ElementType::Fragment => Value::string(crate::value::FRAGMENT_MARKER),
                    ElementType::Component(c) => c.clone(),
                },
                _ => Value::Undefined,
            }),
            Value::RegExp(re) => Ok(regexp::property(re, key)),
        }
    }

    pub fn set_property(&mut self, target: &Value, key: &str, value: Value) -> EvalResult<()> {
        match target {
            Value::Undefined | Value::Null => Err(self.error(
                "TypeError",
                format!(
                    "Cannot set properties of {} (setting '{}')",
                    target.to_js_string(),
                    key
                ),
            )),
            Value::Object(map) => {
                map.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                if key == "length" {
                    let len = self.array_length(value.to_number())?;
                    items.borrow_mut().resize(len, Value::Undefined);
                } else if let Ok(index) = key.parse::<usize>() {
                    let mut items = items.borrow_mut();
                    if index >= items.len() {
                        self.array_length(index as f64 + 1.0)?;
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                }
                Ok(())
            }
            Value::Function(f) => {
                f.properties.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            Value::RegExp(re) if key == "lastIndex" => {
                let index = value.to_number();
                re.set_last_index(if index > 0.0 { index as usize } else { 0 });
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Values produced by `for…of`, spread and array destructuring.
    pub fn iterate(&mut self, value: &Value) -> EvalResult<Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::String(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
            other => Err(self.error(
                "TypeError",
                format!("{} is not iterable", other.inspect()),
            )),
        }
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        if let Some(realm) = self.realm.take() {
            realm.teardown();
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Collects `var` names of a function or program body (not crossing into
/// nested functions) and declares them up front.
fn hoist_vars(stmts: &[Stmt], scope: &Scope) {
    fn visit(stmt: &Stmt, out: &mut Vec<String>) {
        match stmt {
            Stmt::VarDecl(decl) if decl.kind == DeclKind::Var => {
                for (pattern, _) in &decl.declarators {
                    pattern.bound_names(out);
                }
            }
            Stmt::If {
                consequent,
                alternate,
                ..
            } => {
                visit(consequent, out);
                if let Some(alt) = alternate {
                    visit(alt, out);
                }
            }
            Stmt::Block(body) => body.iter().for_each(|s| visit(s, out)),
            Stmt::For { init, body, .. } => {
                if let Some(ForInit::VarDecl(decl)) = init {
                    if decl.kind == DeclKind::Var {
                        for (pattern, _) in &decl.declarators {
                            pattern.bound_names(out);
                        }
                    }
                }
                visit(body, out);
            }
            Stmt::ForOf { head, body, .. } | Stmt::ForIn { head, body, .. } => {
                if let ForHead::Decl {
                    kind: DeclKind::Var,
                    pattern,
                } = head
                {
                    pattern.bound_names(out);
                }
                visit(body, out);
            }
            Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => visit(body, out),
            Stmt::Try {
                block,
                handler,
                finalizer,
                ..
            } => {
                block.iter().for_each(|s| visit(s, out));
                if let Some(h) = handler {
                    h.iter().for_each(|s| visit(s, out));
                }
                if let Some(f) = finalizer {
                    f.iter().for_each(|s| visit(s, out));
                }
            }
            Stmt::Switch { cases, .. } => {
                for case in cases {
                    case.body.iter().for_each(|s| visit(s, out));
                }
            }
            _ => {}
        }
    }

    let mut names = Vec::new();
    for stmt in stmts {
        visit(stmt, &mut names);
    }
    for name in names {
        scope.declare_var(&name);
    }
}

fn copy_bindings(from: &Scope, parent: &Scope, names: &[String]) -> Scope {
    if names.is_empty() {
        return from.clone();
    }
    let next = parent.extend();
    for name in names {
        let value = from.lookup(name).unwrap_or(Value::Undefined);
        next.declare(name, value, true);
    }
    next
}

pub fn to_property_key(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        other => other.to_js_string(),
    }
}

/// Enumerable own keys, in insertion order.
pub fn own_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Object(map) => map.borrow().keys().cloned().collect(),
        Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
        Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
        Value::Function(f) => f.properties.borrow().keys().cloned().collect(),
        Value::Element(_) => vec!["type".into(), "props".into(), "key".into()],
        _ => Vec::new(),
    }
}

fn delete_property(target: &Value, key: &str) -> bool {
    match target {
        Value::Object(map) => {
            map.borrow_mut().shift_remove(key);
            true
        }
        Value::Function(f) => {
            f.properties.borrow_mut().shift_remove(key);
            true
        }
        Value::Array(items) => {
            if let Ok(index) = key.parse::<usize>() {
                if let Some(slot) = items.borrow_mut().get_mut(index) {
                    *slot = Value::Undefined;
                }
            }
            true
        }
        _ => true,
    }
}

fn compare(op: BinaryOperator, l: &Value, r: &Value) -> bool {
    if let (Value::String(a), Value::String(b)) = (l, r) {
        return match op {
            BinaryOperator::LessThan => a < b,
            BinaryOperator::LessEqualThan => a <= b,
            BinaryOperator::GreaterThan => a > b,
            _ => a >= b,
        };
    }
    let (a, b) = (l.to_number(), r.to_number());
    match op {
        BinaryOperator::LessThan => a < b,
        BinaryOperator::LessEqualThan => a <= b,
        BinaryOperator::GreaterThan => a > b,
        _ => a >= b,
    }
}

fn instance_of(value: &Value, constructor: &Value) -> bool {
    let name = match constructor {
        Value::Function(f) => f.name.as_str(),
        _ => return false,
    };
    match name {
        "Array" => matches!(value, Value::Array(_)),
        "Object" => matches!(
            value,
            Value::Object(_) | Value::Array(_) | Value::Function(_) | Value::RegExp(_)
        ),
        "RegExp" => matches!(value, Value::RegExp(_)),
        "Function" => value.is_callable(),
        "Error" => value.get_own("name").is_some() && value.get_own("message").is_some(),
        other => value
            .get_own("name")
            .map_or(false, |n| n.as_str() == Some(other)),
    }
}

pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc() as i64 as u64 & 0xffff_ffff) as u32 as i32
}

pub fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}

fn describe_callee(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member {
            object, property, ..
        } => match property {
            MemberProp::Static(name) => format!("{}.{}", describe_callee(object), name),
            MemberProp::Computed(_) => format!("{}[...]", describe_callee(object)),
        },
        Expr::This => "this".to_string(),
        Expr::Chain(inner) => describe_callee(inner),
        _ => "expression".to_string(),
    }
}

/// Shared by natives that need to trace what they are doing.
pub(crate) fn trace_call(name: &str, args: &[Value]) {
    trace!(native = name, argc = args.len(), "native call");
}

/// Clamp helper used by slice-like natives: relative index → absolute.
pub(crate) fn relative_index(value: Option<&Value>, len: usize, default: usize) -> usize {
    match value {
        None | Some(Value::Undefined) => default,
        Some(v) => {
            let n = v.to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                (n as usize).min(len)
            }
        }
    }
}
