//! Component discovery over the executed unit's top-level bindings.
//!
//! Strict priority, first match wins. Each step only considers callable
//! values; later steps skip internal (`_`-prefixed) and injected names.

use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::bindings::BindingLibrary;
use crate::config::CompilerConfig;
use crate::error::ExecutionError;
use crate::executor::BindingTable;
use crate::value::Value;

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscoveryStep {
    EntryIdentifier,
    ConventionalName,
    DefaultExportSlot,
    AppSuffix,
    LastCapitalized,
    AnyCallable,
}

impl fmt::Display for DiscoveryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscoveryStep::EntryIdentifier => "entry identifier",
            DiscoveryStep::ConventionalName => "conventional name",
            DiscoveryStep::DefaultExportSlot => "default export slot",
            DiscoveryStep::AppSuffix => "App suffix",
            DiscoveryStep::LastCapitalized => "last capitalized binding",
            DiscoveryStep::AnyCallable => "first callable binding",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct DiscoveredComponent {
    pub name: String,
    pub value: Value,
    pub step: DiscoveryStep,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

fn is_excluded(name: &str, library: &BindingLibrary) -> bool {
    name.starts_with('_') || library.contains(name)
}

/// Callable bindings eligible for steps 4-6, in source order.
pub fn candidates(table: &BindingTable, library: &BindingLibrary) -> Vec<Candidate> {
    table
        .iter()
        .filter(|(name, value)| value.is_callable() && !is_excluded(name, library))
        .map(|(name, value)| Candidate {
            name: name.to_string(),
            value: value.clone(),
        })
        .collect()
}

pub fn discover(
    table: &BindingTable,
    entry: Option<&str>,
    library: &BindingLibrary,
    config: &CompilerConfig,
) -> Result<DiscoveredComponent, ExecutionError> {
    let found = |name: &str, value: &Value, step: DiscoveryStep| {
        debug!(component = name, %step, "component discovered");
        DiscoveredComponent {
            name: name.to_string(),
            value: value.clone(),
            step,
        }
    };
    let callable = |name: &str| table.get(name).filter(|v| v.is_callable());

    // 1. entry identifier
    if let Some(entry) = entry {
        if let Some(value) = callable(entry) {
            return Ok(found(entry, value, DiscoveryStep::EntryIdentifier));
        }
    }

    // 2. conventional names
    for name in &config.conventional_names {
        if let Some(value) = callable(name) {
            return Ok(found(name, value, DiscoveryStep::ConventionalName));
        }
    }

    // 3. default-export slots
    for name in &config.default_export_slots {
        if let Some(value) = callable(name) {
            return Ok(found(name, value, DiscoveryStep::DefaultExportSlot));
        }
    }

    let pool = candidates(table, library);

    // 4. *App
    if let Some(c) = pool.iter().find(|c| c.name.ends_with(config.app_suffix.as_str())) {
        return Ok(found(&c.name, &c.value, DiscoveryStep::AppSuffix));
    }

    // 5. last capitalised
    if let Some(c) = pool
        .iter()
        .rev()
        .find(|c| c.name.chars().next().map_or(false, |ch| ch.is_uppercase()))
    {
        return Ok(found(&c.name, &c.value, DiscoveryStep::LastCapitalized));
    }

    // 6. anything callable
    if let Some(c) = pool.first() {
        return Ok(found(&c.name, &c.value, DiscoveryStep::AnyCallable));
    }

    Err(ExecutionError::NoComponent {
        bindings: table.describe(),
        candidates: pool.into_iter().map(|c| c.name).collect(),
    })
}
