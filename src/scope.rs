//! Lexical scopes for the sandbox interpreter.
//!
//! A realm is a chain: intrinsics → binding library → program → function and
//! block scopes. Lookups walk the chain; nothing outside it is reachable.
//!
//! Closures hold their defining scope and scopes hold closures, so a realm is
//! full of `Rc` cycles. Every scope registers with its realm, and
//! [`Scope::teardown`] empties them all once the realm is done.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::value::Value;

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    mutable: bool,
    /// `false` between hoisting and the `let`/`const` declaration (TDZ).
    initialized: bool,
}

#[derive(Debug)]
struct ScopeInner {
    bindings: IndexMap<String, Binding>,
    parent: Option<Scope>,
    realm: Rc<RefCell<RealmScopes>>,
}

/// Weak handles to every scope created in one realm.
#[derive(Debug)]
struct RealmScopes {
    scopes: Vec<Weak<RefCell<ScopeInner>>>,
    prune_at: usize,
}

impl RealmScopes {
    const MIN_PRUNE: usize = 64;

    fn register(&mut self, scope: &Rc<RefCell<ScopeInner>>) {
        if self.scopes.len() >= self.prune_at {
            self.scopes.retain(|weak| weak.strong_count() > 0);
            self.prune_at = (self.scopes.len() * 2).max(Self::MIN_PRUNE);
        }
        self.scopes.push(Rc::downgrade(scope));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    Undeclared,
    Uninitialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignError {
    Undeclared,
    Uninitialized,
    Constant,
}

#[derive(Debug, Clone)]
pub struct Scope {
    inner: Rc<RefCell<ScopeInner>>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// Creates the root scope of a new realm.
    pub fn new() -> Self {
        let realm = Rc::new(RefCell::new(RealmScopes {
            scopes: Vec::new(),
            prune_at: RealmScopes::MIN_PRUNE,
        }));
        Self::register(ScopeInner {
            bindings: IndexMap::new(),
            parent: None,
            realm,
        })
    }

    pub fn extend(&self) -> Self {
        let realm = self.inner.borrow().realm.clone();
        Self::register(ScopeInner {
            bindings: IndexMap::new(),
            parent: Some(self.clone()),
            realm,
        })
    }

    fn register(inner: ScopeInner) -> Self {
        let realm = inner.realm.clone();
        let inner = Rc::new(RefCell::new(inner));
        realm.borrow_mut().register(&inner);
        Self { inner }
    }

    /// Drops the bindings of every live scope in this scope's realm, which
    /// breaks the closure cycles and lets the realm be freed. Closures from
    /// the realm that are still held elsewhere stop resolving names.
    pub fn teardown(&self) {
        let realm = self.inner.borrow().realm.clone();
        let live: Vec<Rc<RefCell<ScopeInner>>> = {
            let mut realm = realm.borrow_mut();
            let live = realm.scopes.iter().filter_map(Weak::upgrade).collect();
            realm.scopes.clear();
            live
        };
        for scope in &live {
            // Taken out first: dropping the values can drop other scopes.
            let bindings = std::mem::take(&mut scope.borrow_mut().bindings);
            drop(bindings);
        }
    }

    /// Reports whether this scope is still allocated, without keeping it alive.
    #[cfg(test)]
    pub(crate) fn liveness(&self) -> impl Fn() -> bool {
        let weak = Rc::downgrade(&self.inner);
        move || weak.strong_count() > 0
    }

    /// Declares (or redeclares) `name` in this scope with an initial value.
    pub fn declare(&self, name: &str, value: Value, mutable: bool) {
        self.inner.borrow_mut().bindings.insert(
            name.to_string(),
            Binding {
                value,
                mutable,
                initialized: true,
            },
        );
    }

    /// Hoists a `let`/`const` name so closures created earlier resolve to it.
    pub fn declare_uninitialized(&self, name: &str, mutable: bool) {
        let mut inner = self.inner.borrow_mut();
        if !inner.bindings.contains_key(name) {
            inner.bindings.insert(
                name.to_string(),
                Binding {
                    value: Value::Undefined,
                    mutable,
                    initialized: false,
                },
            );
        }
    }

    /// Declares a `var`: keeps an existing value, otherwise `undefined`.
    pub fn declare_var(&self, name: &str) {
        let mut inner = self.inner.borrow_mut();
        if !inner.bindings.contains_key(name) {
            inner.bindings.insert(
                name.to_string(),
                Binding {
                    value: Value::Undefined,
                    mutable: true,
                    initialized: true,
                },
            );
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Value, LookupError> {
        let inner = self.inner.borrow();
        match inner.bindings.get(name) {
            Some(b) if b.initialized => Ok(b.value.clone()),
            Some(_) => Err(LookupError::Uninitialized),
            None => match &inner.parent {
                Some(parent) => parent.lookup(name),
                None => Err(LookupError::Undeclared),
            },
        }
    }

    pub fn assign(&self, name: &str, value: Value) -> Result<(), AssignError> {
        let mut inner = self.inner.borrow_mut();
        match inner.bindings.get_mut(name) {
            Some(b) if !b.initialized => Err(AssignError::Uninitialized),
            Some(b) if !b.mutable => Err(AssignError::Constant),
            Some(b) => {
                b.value = value;
                Ok(())
            }
            None => match &inner.parent {
                Some(parent) => parent.assign(name, value),
                None => Err(AssignError::Undeclared),
            },
        }
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.inner.borrow().bindings.contains_key(name)
    }

    /// Own binding value, `None` if absent or still uninitialized.
    pub fn get_own(&self, name: &str) -> Option<Value> {
        self.inner
            .borrow()
            .bindings
            .get(name)
            .filter(|b| b.initialized)
            .map(|b| b.value.clone())
    }

    /// Own binding names in declaration order.
    pub fn own_names(&self) -> Vec<String> {
        self.inner.borrow().bindings.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_shadows_parent() {
        let root = Scope::new();
        root.declare("x", Value::Number(1.0), true);
        let child = root.extend();
        child.declare("x", Value::Number(2.0), true);
        assert_eq!(child.lookup("x"), Ok(Value::Number(2.0)));
        assert_eq!(root.lookup("x"), Ok(Value::Number(1.0)));
    }

    #[test]
    fn test_assign_walks_to_declaring_scope() {
        let root = Scope::new();
        root.declare("count", Value::Number(0.0), true);
        let child = root.extend().extend();
        child.assign("count", Value::Number(5.0)).unwrap();
        assert_eq!(root.get_own("count"), Some(Value::Number(5.0)));
    }

    #[test]
    fn test_teardown_frees_closure_cycles() {
        use crate::ir::{FunctionBody, FunctionDef};

        let root = Scope::new();
        let program = root.extend();
        let def = Rc::new(FunctionDef {
            name: Some("f".to_string()),
            params: Vec::new(),
            rest: None,
            body: FunctionBody::Block(Vec::new()),
            is_arrow: false,
        });
        program.declare("f", Value::closure("f".to_string(), def, program.clone()), true);
        let alive = program.liveness();
        drop(program);
        assert!(alive());

        root.teardown();
        assert!(!alive());
    }

    #[test]
    fn test_const_and_tdz() {
        let scope = Scope::new();
        scope.declare("k", Value::Null, false);
        assert_eq!(scope.assign("k", Value::Undefined), Err(AssignError::Constant));

        scope.declare_uninitialized("later", false);
        assert_eq!(scope.lookup("later"), Err(LookupError::Uninitialized));
        assert_eq!(scope.lookup("nowhere"), Err(LookupError::Undeclared));
    }
}
