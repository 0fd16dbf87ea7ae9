//! Virtual module registry.
//!
//! Holds the user's in-memory modules keyed by relative path. Mutations are
//! observable so the controller can schedule a recompilation.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::RegistryError;

lazy_static! {
    static ref MODULE_PATH_RE: Regex = Regex::new(r"^\.\.?/").unwrap();
}

/// Extensions tried, in order, when an import specifier does not match a
/// registered path exactly.
const RESOLVE_EXTENSIONS: [&str; 4] = [".tsx", ".ts", ".jsx", ".js"];

pub fn is_valid_module_path(path: &str) -> bool {
    MODULE_PATH_RE.is_match(path)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub path: String,
    pub code: String,
}

impl Module {
    pub fn new(path: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    Added(String),
    Updated(String),
    Removed(String),
}

impl RegistryChange {
    pub fn path(&self) -> &str {
        match self {
            RegistryChange::Added(p) | RegistryChange::Updated(p) | RegistryChange::Removed(p) => p,
        }
    }
}

pub type RegistryObserver = Box<dyn FnMut(&RegistryChange)>;

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct ModuleRegistry {
    modules: IndexMap<String, Module>,
    revision: u64,
    observers: Vec<RegistryObserver>,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules)
            .field("revision", &self.revision)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module, replacing the code of an existing module with the same
    /// path. Paths must start with `./` or `../`.
    pub fn add(&mut self, module: Module) -> Result<(), RegistryError> {
        if !is_valid_module_path(&module.path) {
            return Err(RegistryError::InvalidPath { path: module.path });
        }

        let change = match self.modules.get_mut(&module.path) {
            Some(existing) if existing.code == module.code => return Ok(()),
            Some(existing) => {
                existing.code = module.code;
                RegistryChange::Updated(module.path)
            }
            None => {
                let path = module.path.clone();
                self.modules.insert(path.clone(), module);
                RegistryChange::Added(path)
            }
        };
        self.commit(change);
        Ok(())
    }

    /// Replaces the code of the module at `module.path`. Missing paths are
    /// ignored.
    pub fn update(&mut self, module: Module) {
        let changed = match self.modules.get_mut(&module.path) {
            Some(existing) if existing.code != module.code => {
                existing.code = module.code;
                true
            }
            _ => false,
        };
        if changed {
            self.commit(RegistryChange::Updated(module.path));
        }
    }

    pub fn remove(&mut self, path: &str) {
        if self.modules.shift_remove(path).is_some() {
            self.commit(RegistryChange::Removed(path.to_string()));
        }
    }

    pub fn list(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn get(&self, path: &str) -> Option<&Module> {
        self.modules.get(path)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Bumped on every effective mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn subscribe(&mut self, observer: RegistryObserver) {
        self.observers.push(observer);
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            modules: self
                .modules
                .values()
                .map(|m| (m.path.clone(), m.code.clone()))
                .collect(),
            revision: self.revision,
        }
    }

    fn commit(&mut self, change: RegistryChange) {
        self.revision += 1;
        debug!(path = change.path(), revision = self.revision, "registry changed: {:?}", change);
        for observer in self.observers.iter_mut() {
            observer(&change);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable copy of the registry taken when a compilation starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    modules: IndexMap<String, String>,
    revision: u64,
}

impl RegistrySnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Resolves an import specifier to `(path, code)`: exact path first, then
    /// with a known extension added, then with its extension swapped.
    pub fn resolve(&self, specifier: &str) -> Option<(&str, &str)> {
        if let Some((path, code)) = self.modules.get_key_value(specifier) {
            return Some((path.as_str(), code.as_str()));
        }

        let stem = RESOLVE_EXTENSIONS
            .iter()
            .find_map(|ext| specifier.strip_suffix(ext))
            .unwrap_or(specifier);

        for candidate in std::iter::once(stem.to_string())
            .chain(RESOLVE_EXTENSIONS.iter().map(|ext| format!("{}{}", stem, ext)))
        {
            if let Some((path, code)) = self.modules.get_key_value(&candidate) {
                return Some((path.as_str(), code.as_str()));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_rejects_non_relative_path_without_mutation() {
        let mut registry = ModuleRegistry::new();
        registry.add(Module::new("./a", "export const a = 1;")).unwrap();
        let before = registry.snapshot();

        for bad in ["helpers", "/abs", "lib/x", ".hidden/x", "...", ""] {
            let err = registry.add(Module::new(bad, "x")).unwrap_err();
            assert_eq!(err, RegistryError::InvalidPath { path: bad.to_string() });
        }

        assert_eq!(registry.snapshot(), before);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_at_most_one_module_per_path() {
        let mut registry = ModuleRegistry::new();
        registry.add(Module::new("./a", "1")).unwrap();
        registry.add(Module::new("./a", "2")).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("./a").unwrap().code, "2");
    }

    #[test]
    fn test_update_and_remove_missing_are_noops() {
        let mut registry = ModuleRegistry::new();
        registry.update(Module::new("./nope", "x"));
        registry.remove("./nope");
        assert!(registry.is_empty());
        assert_eq!(registry.revision(), 0);
    }

    #[test]
    fn test_observers_see_effective_mutations_only() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        let sink = seen.clone();
        registry.subscribe(Box::new(move |change| sink.borrow_mut().push(change.clone())));

        registry.add(Module::new("./a", "1")).unwrap();
        registry.add(Module::new("./a", "1")).unwrap();
        registry.update(Module::new("./a", "2"));
        registry.update(Module::new("./a", "2"));
        registry.remove("./a");
        registry.remove("./a");

        assert_eq!(
            *seen.borrow(),
            vec![
                RegistryChange::Added("./a".into()),
                RegistryChange::Updated("./a".into()),
                RegistryChange::Removed("./a".into()),
            ]
        );
        assert_eq!(registry.revision(), 3);
    }

    #[test]
    fn test_list_keeps_insertion_order() {
        let mut registry = ModuleRegistry::new();
        registry.add(Module::new("./b", "")).unwrap();
        registry.add(Module::new("../a", "")).unwrap();
        let paths: Vec<&str> = registry.list().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["./b", "../a"]);
    }

    #[test]
    fn test_snapshot_resolves_extensions() {
        let mut registry = ModuleRegistry::new();
        registry.add(Module::new("./utils.ts", "u")).unwrap();
        registry.add(Module::new("./Card", "c")).unwrap();
        let snapshot = registry.snapshot();

        assert_eq!(snapshot.resolve("./utils"), Some(("./utils.ts", "u")));
        assert_eq!(snapshot.resolve("./utils.ts"), Some(("./utils.ts", "u")));
        assert_eq!(snapshot.resolve("./Card.tsx"), Some(("./Card", "c")));
        assert_eq!(snapshot.resolve("./missing"), None);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_mutation() {
        let mut registry = ModuleRegistry::new();
        registry.add(Module::new("./a", "1")).unwrap();
        let snapshot = registry.snapshot();
        registry.update(Module::new("./a", "2"));
        assert_eq!(snapshot.resolve("./a"), Some(("./a", "1")));
    }
}
