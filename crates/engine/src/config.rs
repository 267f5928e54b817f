//! Engine configuration
//!
//! `EngineConfig` is plain serde so operators can keep it in a JSON file next
//! to the CLI and pass it with `--config`.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Draw engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pools with at most this many entries are drawn by shuffling one ticket
    /// per entry; larger pools use weighted keys instead
    pub max_materialized_entries: u64,

    /// How many times runner-up invocation re-reads and retries when the
    /// chosen alternate was promoted concurrently
    pub replacement_retry_limit: u32,

    /// Allow draws for dates after today (UTC)
    pub allow_future_dates: bool,

    /// Pin the per-draw seed (64 hex chars). Leave unset in production.
    pub fixed_seed: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_materialized_entries: 1_000_000,
            replacement_retry_limit: 3,
            allow_future_dates: false,
            fixed_seed: None,
        }
    }
}

impl EngineConfig {
    /// Load from file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_materialized_entries == 0 {
            return Err(ConfigError::InvalidValue(
                "max_materialized_entries must be > 0".into(),
            ));
        }
        if self.replacement_retry_limit == 0 {
            return Err(ConfigError::InvalidValue(
                "replacement_retry_limit must be > 0".into(),
            ));
        }
        if let Some(seed) = &self.fixed_seed {
            let bytes = hex::decode(seed)
                .map_err(|e| ConfigError::InvalidValue(format!("fixed_seed is not hex: {}", e)))?;
            if bytes.len() != 32 {
                return Err(ConfigError::InvalidValue(format!(
                    "fixed_seed must be 32 bytes, got {}",
                    bytes.len()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
