//! Runs transpiled code in a fresh realm and reports its top-level bindings.

use oxc_allocator::Allocator;
use oxc_parser::Parser;
use oxc_span::SourceType;
use serde::Serialize;
use tracing::debug;

use crate::bindings::BindingLibrary;
use crate::config::SandboxLimits;
use crate::error::ExecutionError;
use crate::interpreter::{Interpreter, Throw};
use crate::intrinsics;
use crate::ir::declared_names;
use crate::lower::lower_program;
use crate::scope::Scope;
use crate::value::{Value, ValueKind};

/// One row of the top-level binding table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopLevelBinding {
    pub name: String,
    pub kind: ValueKind,
}

/// Top-level names of the executed unit in source order, with their values.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    entries: Vec<(String, Value)>,
}

impl BindingTable {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn describe(&self) -> Vec<TopLevelBinding> {
        self.entries
            .iter()
            .map(|(name, value)| TopLevelBinding {
                name: name.clone(),
                kind: value.kind(),
            })
            .collect()
    }
}

/// An evaluated unit: the interpreter owns hook and timer state for the
/// closures the unit created.
pub struct ExecutedUnit {
    pub interpreter: Interpreter,
    pub scope: Scope,
    pub table: BindingTable,
}

pub fn execute(
    code: &str,
    library: &BindingLibrary,
    limits: SandboxLimits,
) -> Result<ExecutedUnit, ExecutionError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
    if let Some(first) = ret.errors.first() {
        return Err(ExecutionError::Syntax {
            message: first.to_string(),
        });
    }
    let body = lower_program(&ret.program, limits.max_nesting_depth)?;

    // intrinsics → binding library → program
    let realm = Scope::new();
    intrinsics::install_globals(&realm);
    let library_scope = realm.extend();
    library.install(&library_scope);
    let scope = library_scope.extend();

    let mut interpreter = Interpreter::new(limits);
    interpreter.adopt_realm(realm);
    interpreter
        .run_program(&body, &scope)
        .map_err(|throw| thrown(&throw))?;

    let entries: Vec<(String, Value)> = declared_names(&body)
        .into_iter()
        .map(|name| {
            let value = scope.get_own(&name).unwrap_or(Value::Undefined);
            (name, value)
        })
        .collect();
    debug!(bindings = entries.len(), "unit executed");

    Ok(ExecutedUnit {
        interpreter,
        scope,
        table: BindingTable { entries },
    })
}

fn thrown(throw: &Throw) -> ExecutionError {
    let message = throw.message();
    let stack = throw.stack_trace();
    let detail = if stack.is_empty() {
        message.clone()
    } else {
        format!("{}\n{}", message, stack)
    };
    ExecutionError::Thrown { message, detail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::BINDING_LIBRARY;

    fn run(code: &str) -> Result<ExecutedUnit, ExecutionError> {
        execute(code, &BINDING_LIBRARY, SandboxLimits::default())
    }

    #[test]
    fn test_table_lists_top_level_names_in_order() {
        let unit = run("const b = 1; function a() {} let c = [1]; var d;").unwrap();
        let described = unit.table.describe();
        let names: Vec<&str> = described.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c", "d"]);
        assert_eq!(described[1].kind, ValueKind::Function);
        assert_eq!(described[2].kind, ValueKind::Array);
        assert_eq!(described[3].kind, ValueKind::Undefined);
    }

    #[test]
    fn test_unknown_global_is_reference_error() {
        match run("const x = window.location;") {
            Err(ExecutionError::Thrown { message, .. }) => {
                assert_eq!(message, "ReferenceError: window is not defined")
            }
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    #[test]
    fn test_class_is_unsupported() {
        match run("class A {}") {
            Err(ExecutionError::Unsupported { construct }) => assert!(construct.contains("class")),
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    #[test]
    fn test_runaway_loop_hits_step_limit() {
        let limits = SandboxLimits {
            max_steps: 10_000,
            ..SandboxLimits::default()
        };
        match execute("while (true) {}", &BINDING_LIBRARY, limits) {
            Err(ExecutionError::Thrown { message, .. }) => assert!(message.starts_with("RangeError")),
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    #[test]
    fn test_dropping_unit_frees_closure_cycles() {
        let unit = run(
            "function make() { let n = 0; const tick = () => tick && n++; return tick; }\nconst counter = make();\nfunction App() { return counter(); }",
        )
        .unwrap();
        let alive = unit.scope.liveness();
        drop(unit);
        assert!(!alive());
    }

    #[test]
    fn test_module_not_found_marker_throws_with_specifier() {
        match run("/* module not found: ./missing */ __moduleNotFound(\"./missing\");") {
            Err(ExecutionError::Thrown { message, detail }) => {
                assert!(message.contains("./missing"));
                assert!(detail.contains("./missing"));
            }
            other => panic!("unexpected: {:?}", other.err()),
        }
    }
}
