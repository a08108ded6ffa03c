//! Leader-wide replication settings.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::pacer::DEFAULT_APPEND_WINDOW;
use crate::types::{ReplicationError, Result};

/// Settings shared by every follower's replication state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Maximum number of append requests in flight per follower.
    pub max_appends_per_follower: usize,
    /// Number of round-trip samples used to pace pipelined appends.
    pub append_window_size: usize,
    /// Consecutive failures after which a follower is reported unreachable.
    pub failure_threshold: u32,
    /// Age of a failure streak (ms) after which a follower is reported unreachable.
    pub suspect_after_ms: u64,
    /// Interval between heartbeats to an idle follower (ms).
    pub heartbeat_interval_ms: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_appends_per_follower: 2,
            append_window_size: DEFAULT_APPEND_WINDOW,
            failure_threshold: 3,
            suspect_after_ms: 5_000,
            heartbeat_interval_ms: 100,
        }
    }
}

impl ReplicationConfig {
    /// Loads a config from a `.toml` or `.json` file. Missing keys take defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: ReplicationConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would stall replication.
    pub fn validate(&self) -> Result<()> {
        if self.max_appends_per_follower == 0 {
            return Err(ReplicationError::Config(
                "max_appends_per_follower must be at least 1".to_string(),
            ));
        }
        if self.append_window_size == 0 {
            return Err(ReplicationError::Config(
                "append_window_size must be at least 1".to_string(),
            ));
        }
        if self.failure_threshold == 0 {
            return Err(ReplicationError::Config(
                "failure_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
