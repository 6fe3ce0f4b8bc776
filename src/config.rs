//! Ledger configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// What the ledger does when the record write lands but the counter write fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterFailurePolicy {
    /// Leave the record written and report drift.
    #[default]
    AcceptDrift,
    /// Revert the record write with its inverse, then report.
    Compensate,
}

/// Ledger behaviour knobs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Handling of a failed counter write.
    pub counter_failure: CounterFailurePolicy,
}

/// Configuration loading failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// The contents are not valid config JSON.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl LedgerConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reads and parses a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}
