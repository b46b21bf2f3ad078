//! Emitter configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use avmc_bytecode::{ABC_MAJOR_VERSION, ABC_MINOR_VERSION};

use crate::error::{EmitError, EmitResult};

/// Options controlling what the emitter writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    /// Major version written to the module header
    pub major_version: u16,

    /// Minor version written to the module header
    pub minor_version: u16,

    /// Emit source file/line and register-name records
    pub debug: bool,

    /// Instrument conditional branches with coverage calls
    pub coverage: bool,

    /// Function invoked by coverage records
    pub coverage_hook: String,

    /// Log every emitted instruction at trace level
    pub trace_instructions: bool,

    /// Turn ordering warnings into debug assertions
    pub strict_ordering: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            major_version: ABC_MAJOR_VERSION,
            minor_version: ABC_MINOR_VERSION,
            debug: false,
            coverage: false,
            coverage_hook: default_coverage_hook(),
            trace_instructions: false,
            strict_ordering: false,
        }
    }
}

fn default_coverage_hook() -> String {
    "__coverage".to_string()
}

impl EmitterConfig {
    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> EmitResult<Self> {
        toml::from_str(source).map_err(|e| EmitError::config(e.to_string()))
    }

    /// Load a TOML file
    pub fn load(path: &Path) -> EmitResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EmitError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
            .map_err(|e| EmitError::config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Enable or disable debug records
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Enable or disable branch coverage
    pub fn with_coverage(mut self, coverage: bool) -> Self {
        self.coverage = coverage;
        self
    }

    /// Set the coverage hook name
    pub fn with_coverage_hook(mut self, hook: impl Into<String>) -> Self {
        self.coverage_hook = hook.into();
        self
    }

    /// Enable or disable the instruction trace
    pub fn with_trace_instructions(mut self, trace: bool) -> Self {
        self.trace_instructions = trace;
        self
    }

    /// Enable or disable strict ordering checks
    pub fn with_strict_ordering(mut self, strict: bool) -> Self {
        self.strict_ordering = strict;
        self
    }

    /// Set the module version
    pub fn with_version(mut self, major: u16, minor: u16) -> Self {
        self.major_version = major;
        self.minor_version = minor;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EmitterConfig::default();
        assert_eq!(config.major_version, 46);
        assert_eq!(config.minor_version, 16);
        assert!(!config.debug);
        assert_eq!(config.coverage_hook, "__coverage");
    }

    #[test]
    fn test_parse_partial_config() {
        let config = EmitterConfig::from_toml_str(
            r#"
debug = true
coverage_hook = "cov"
"#,
        )
        .unwrap();
        assert!(config.debug);
        assert!(!config.coverage);
        assert_eq!(config.coverage_hook, "cov");
        assert_eq!(config.major_version, 46);
    }

    #[test]
    fn test_parse_error() {
        let err = EmitterConfig::from_toml_str("debug = 3").unwrap_err();
        assert!(matches!(err, EmitError::Config(_)));
    }

    #[test]
    fn test_builder_setters() {
        let config = EmitterConfig::default()
            .with_coverage(true)
            .with_version(47, 12)
            .with_strict_ordering(true);
        assert!(config.coverage);
        assert!(config.strict_ordering);
        assert_eq!((config.major_version, config.minor_version), (47, 12));
    }
}
