//! Error taxonomy for the compile pipeline.
//!
//! Every stage owns one error type. The controller folds all of them into a
//! [`StageError`] so nothing escapes to the host as a panic.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::executor::TopLevelBinding;

// ═══════════════════════════════════════════════════════════════════════════════
// STAGES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Preprocess,
    Transpile,
    Execute,
    Render,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Preprocess => "preprocess",
            Stage::Transpile => "transpile",
            Stage::Execute => "execute",
            Stage::Render => "render",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PER-STAGE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid module path '{path}': module paths must start with './' or '../'")]
    InvalidPath { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreprocessError {
    #[error("Component code cannot be empty")]
    EmptySource,
}

/// The backend rejected the rewritten source. `message` is the first backend
/// diagnostic, untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TranspileError {
    pub message: String,
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    /// The compiled unit threw during top-level evaluation.
    #[error("{message}")]
    Thrown { message: String, detail: String },

    /// The transpiled code used syntax the sandbox does not evaluate.
    #[error("unsupported syntax in sandbox: {construct}")]
    Unsupported { construct: String },

    /// The transpiled code could not be parsed again for execution.
    #[error("{message}")]
    Syntax { message: String },

    #[error("code nests deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("no component found")]
    NoComponent {
        bindings: Vec<TopLevelBinding>,
        candidates: Vec<String>,
    },
}

impl ExecutionError {
    pub fn unsupported(construct: impl Into<String>) -> Self {
        ExecutionError::Unsupported {
            construct: construct.into(),
        }
    }

    /// Secondary text shown under the message.
    pub fn detail(&self) -> String {
        match self {
            ExecutionError::Thrown { detail, .. } => detail.clone(),
            ExecutionError::Unsupported { construct } => {
                format!("the sandbox interpreter does not support {}", construct)
            }
            ExecutionError::Syntax { message } => message.clone(),
            ExecutionError::TooDeep { limit } => format!(
                "expressions and statements may nest at most {} levels (sandbox.maxNestingDepth)",
                limit
            ),
            ExecutionError::NoComponent {
                bindings,
                candidates,
            } => {
                let listed: Vec<String> = bindings
                    .iter()
                    .map(|b| format!("{}: {}", b.name, b.kind))
                    .collect();
                format!(
                    "top-level bindings: [{}]\ncandidates: [{}]",
                    listed.join(", "),
                    candidates.join(", ")
                )
            }
        }
    }
}

/// The discovered component threw during its first render pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAGE ERROR (what the controller exposes)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
    pub detail: String,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

impl From<PreprocessError> for StageError {
    fn from(err: PreprocessError) -> Self {
        StageError {
            stage: Stage::Preprocess,
            message: err.to_string(),
            detail: String::new(),
        }
    }
}

impl From<TranspileError> for StageError {
    fn from(err: TranspileError) -> Self {
        StageError {
            stage: Stage::Transpile,
            detail: err.diagnostics.join("\n"),
            message: err.message,
        }
    }
}

impl From<ExecutionError> for StageError {
    fn from(err: ExecutionError) -> Self {
        StageError {
            stage: Stage::Execute,
            message: err.to_string(),
            detail: err.detail(),
        }
    }
}

impl From<RuntimeError> for StageError {
    fn from(err: RuntimeError) -> Self {
        StageError {
            stage: Stage::Render,
            message: err.message,
            detail: err.detail,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTICS (non-fatal)
// ═══════════════════════════════════════════════════════════════════════════════

pub const W_MISSING_DEFAULT_EXPORT: &str = "TSX-WARN-DEFAULT-EXPORT";
pub const W_KEY_IN_SPREAD: &str = "TSX-WARN-KEY-SPREAD";
pub const W_CONSOLE: &str = "TSX-WARN-CONSOLE";

/// A warning attached to a successful compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
