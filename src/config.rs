use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Knobs for one compiler instance. Every field has a default, so a partial
/// JSON document is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerConfig {
    /// Names tried by discovery step 2, in order.
    pub conventional_names: Vec<String>,
    /// Slots the transpiled code may use for an anonymous default export.
    pub default_export_slots: Vec<String>,
    /// Suffix used by discovery step 4.
    pub app_suffix: String,
    /// Packages whose imports are satisfied by injected bindings.
    pub host_packages: Vec<String>,
    pub jsx: JsxOptions,
    pub sandbox: SandboxLimits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JsxOptions {
    pub factory: String,
    pub fragment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxLimits {
    pub max_call_depth: usize,
    pub max_steps: u64,
    /// Deepest expression or statement nesting the executor accepts.
    pub max_nesting_depth: usize,
    /// Dense arrays cannot grow past this many elements.
    pub max_array_length: usize,
    /// Re-render passes allowed before a state update loop is reported.
    pub max_render_passes: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            conventional_names: [
                "TodoApp",
                "Counter",
                "App",
                "Component",
                "MediaPlayer",
                "FileUploader",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            default_export_slots: ["_default", "default_1", "__default"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            app_suffix: "App".to_string(),
            host_packages: [
                "react",
                "react-dom",
                "react-dom/client",
                "react/jsx-runtime",
                "lucide-react",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            jsx: JsxOptions::default(),
            sandbox: SandboxLimits::default(),
        }
    }
}

impl Default for JsxOptions {
    fn default() -> Self {
        Self {
            factory: "React.createElement".to_string(),
            fragment: "React.Fragment".to_string(),
        }
    }
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            max_steps: 2_000_000,
            max_nesting_depth: 1_000,
            max_array_length: 1 << 22,
            max_render_passes: 25,
        }
    }
}

impl CompilerConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn is_host_package(&self, specifier: &str) -> bool {
        self.host_packages.iter().any(|pkg| {
            specifier == pkg
                || specifier
                    .strip_prefix(pkg.as_str())
                    .map_or(false, |rest| rest.starts_with('/'))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            CompilerConfig::from_json(r#"{ "appSuffix": "Page", "sandbox": { "maxSteps": 10 } }"#)
                .unwrap();
        assert_eq!(config.app_suffix, "Page");
        assert_eq!(config.sandbox.max_steps, 10);
        assert_eq!(config.sandbox.max_call_depth, 256);
        assert_eq!(config.sandbox.max_nesting_depth, 1_000);
        assert_eq!(config.conventional_names[0], "TodoApp");
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(CompilerConfig::from_json("{ nope").is_err());
    }

    #[test]
    fn test_host_package_subpaths() {
        let config = CompilerConfig::default();
        assert!(config.is_host_package("react"));
        assert!(config.is_host_package("react/jsx-runtime"));
        assert!(config.is_host_package("lucide-react"));
        assert!(!config.is_host_package("react-router"));
        assert!(!config.is_host_package("./react"));
    }
}
