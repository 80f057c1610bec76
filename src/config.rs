//! Configuration
//!
//! Loaded from JSON. Every field has a default, so `{}` is a valid config.
//!
//! ```json
//! {
//!   "commit_policy": "single",
//!   "store": { "yield_on_round_trip": true, "conflict_log_limit": 65536 }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::MemoryStoreConfig;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// How many commits a single write transaction may create.
///
/// Every write in a transaction is meant to share one point in time, so
/// the default rejects a second commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// At most one commit per transaction
    #[default]
    Single,
    /// Any number of commits per transaction
    Multiple,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersioningConfig {
    #[serde(default)]
    pub commit_policy: CommitPolicy,

    #[serde(default)]
    pub store: MemoryStoreConfig,
}

impl VersioningConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.store.conflict_log_limit == 0 {
            return Err(ConfigError::Invalid(
                "store.conflict_log_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_commit_policy(mut self, policy: CommitPolicy) -> Self {
        self.commit_policy = policy;
        self
    }
}
