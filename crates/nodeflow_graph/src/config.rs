// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluator configuration.
//!
//! Settings are stored as RON, for example:
//!
//! ```ron
//! (failure_policy: MarkClean)
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// What happens to a node whose computation returned an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Leave it dirty so every later pass retries it
    #[default]
    KeepDirty,
    /// Mark it clean; it reruns only after its inputs change again
    MarkClean,
}

/// Evaluator settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Handling of failed node computations
    pub failure_policy: FailurePolicy,
}

impl EvaluatorConfig {
    /// Parse from RON text
    pub fn from_ron(s: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(s)?)
    }

    /// Serialize to RON text
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Load from a RON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Text is not valid RON for the config
    #[error("Invalid config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Config could not be written
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keeps_failed_nodes_dirty() {
        assert_eq!(
            EvaluatorConfig::default().failure_policy,
            FailurePolicy::KeepDirty
        );
    }

    #[test]
    fn test_parse_ron() {
        let config = EvaluatorConfig::from_ron("(failure_policy: MarkClean)").unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::MarkClean);

        let empty = EvaluatorConfig::from_ron("()").unwrap();
        assert_eq!(empty, EvaluatorConfig::default());

        assert!(EvaluatorConfig::from_ron("(failure_policy: Sometimes)").is_err());
    }

    #[test]
    fn test_serialization() {
        let config = EvaluatorConfig {
            failure_policy: FailurePolicy::MarkClean,
        };
        let text = config.to_ron().unwrap();
        assert_eq!(EvaluatorConfig::from_ron(&text).unwrap(), config);
    }
}
