//! Engine Configuration
//!
//! Tunables for a run, loadable from a YAML file:
//!
//! ```yaml
//! max_visits: 10000
//! ai_timeout_seconds: 120
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default bound on node visits per run.
pub const DEFAULT_MAX_VISITS: usize = 10_000;

/// Default timeout for `ai_task` nodes that don't set `timeout_seconds`.
pub const DEFAULT_AI_TIMEOUT_SECONDS: u64 = 120;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Total node visits allowed per run before it fails
    pub max_visits: usize,

    /// Fallback timeout for AI tasks
    pub ai_timeout_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_visits: DEFAULT_MAX_VISITS,
            ai_timeout_seconds: DEFAULT_AI_TIMEOUT_SECONDS,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a YAML file. Missing keys keep defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn with_max_visits(mut self, max_visits: usize) -> Self {
        self.max_visits = max_visits;
        self
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_seconds)
    }
}
