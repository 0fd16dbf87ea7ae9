//! # tsx-runner
//!
//! Compiles a single TSX component on demand and mounts it, with no build
//! step. The pipeline:
//!
//! 1. **Preprocess** ([`preprocess()`]): inline registry modules, drop host
//!    imports, strip exports, record the entry identifier and guard `key`
//!    against props spreads.
//! 2. **Transpile** ([`transpile()`]): oxc parses the TSX, TypeScript is
//!    erased, JSX becomes `React.createElement` calls, codegen prints JS.
//! 3. **Execute** ([`execute()`]): the JS runs in a tree-walking sandbox
//!    whose only free names are the binding library and a few intrinsics.
//! 4. **Discover** ([`discover()`]): pick the component among the top-level
//!    bindings by a fixed priority.
//! 5. **Render** ([`first_render()`]): mount it with hooks and return the
//!    live [`RenderSession`].
//!
//! [`CompilationController`] runs the stages cooperatively and keeps the
//! latest [`CompilationResult`]. Every failure is a [`StageError`] naming
//! the stage; nothing panics into the host.
//!
//! ## Sandbox Invariants
//!
//! 1. Referencing a name outside the binding library and the intrinsics
//!    throws `ReferenceError` where it is used, never earlier.
//! 2. Each compilation materialises fresh library values; no state leaks
//!    between compilations.
//! 3. Evaluation is bounded by call depth and step count, so runaway code
//!    ends in a thrown `RangeError`. Oversized arrays and strings throw
//!    `RangeError` too, and over-nested source fails before it runs.
//!
//! ## Language Coverage
//!
//! The sandbox evaluates the subset components are written in. Regular
//! expressions run on the `regex` crate, which has no look-around or
//! backreferences; such patterns fail at execute time as a syntax error.
//! Classes, generators, `async`/`await`, labels, `with`, `BigInt` and
//! tagged templates are reported as unsupported syntax. Strings are
//! indexed by Unicode scalar value, so `length` counts code points rather
//! than UTF-16 units.

mod bindings;
mod config;
mod controller;
mod discovery;
mod error;
mod executor;
mod fingerprint;
mod interpreter;
mod intrinsics;
mod ir;
mod jsx_lowerer;
mod key_guard;
mod lower;
mod preprocess;
mod regexp;
mod registry;
mod render;
mod scope;
mod transpile;
mod value;

#[cfg(test)]
mod controller_tests;
#[cfg(test)]
mod discovery_tests;
#[cfg(test)]
mod interpreter_tests;
#[cfg(test)]
mod preprocess_tests;
#[cfg(test)]
mod render_tests;

pub use bindings::{BindingKind, BindingLibrary, BINDING_LIBRARY, ICON_NAMES};
pub use config::{CompilerConfig, JsxOptions, SandboxLimits};
pub use controller::{CompilationController, CompilationResult, CompiledComponent};
pub use discovery::{candidates, discover, Candidate, DiscoveredComponent, DiscoveryStep};
pub use error::{
    ConfigError, Diagnostic, ExecutionError, PreprocessError, RegistryError, RuntimeError, Stage,
    StageError, TranspileError, W_CONSOLE, W_KEY_IN_SPREAD, W_MISSING_DEFAULT_EXPORT,
};
pub use executor::{execute, BindingTable, ExecutedUnit, TopLevelBinding};
pub use fingerprint::{compute_hash, StageFingerprints};
pub use interpreter::Interpreter;
pub use preprocess::{preprocess, PreprocessOutput};
pub use registry::{is_valid_module_path, Module, ModuleRegistry, RegistryChange, RegistrySnapshot};
pub use render::{first_render, synthetic_event, RenderNode, RenderSession};
pub use transpile::{transpile, Transpiled};
pub use value::{Value, ValueKind};
