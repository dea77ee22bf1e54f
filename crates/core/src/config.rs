// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration
//!
//! ```toml
//! [store]
//! path = "/var/lib/rc"
//! machine_id = "node-a"
//! compaction_threshold = 10000
//!
//! [reconciler]
//! interval = "10s"
//! sweep_blocked = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub reconciler: ReconcilerConfig,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_reconciler(mut self, reconciler: ReconcilerConfig) -> Self {
        self.reconciler = reconciler;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.reconciler.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "reconciler.interval must be greater than zero".to_string(),
            ));
        }
        if self.store.machine_id.is_empty() {
            return Err(ConfigError::Invalid(
                "store.machine_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where consumer state lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Journal directory; `None` keeps state in memory only
    pub path: Option<PathBuf>,
    /// Written into every journal entry to identify the writer
    pub machine_id: String,
    /// Journal entries after which the log is folded into a snapshot;
    /// 0 compacts only after purges
    pub compaction_threshold: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            machine_id: "local".to_string(),
            compaction_threshold: 10_000,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_machine_id(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = machine_id.into();
        self
    }

    pub fn with_compaction_threshold(mut self, threshold: u64) -> Self {
        self.compaction_threshold = threshold;
        self
    }
}

/// Reconciliation loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Time between passes
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Also promote blocked consumers of constraints with no finished holder
    /// this pass
    pub sweep_blocked: bool,
    /// Restrict finish detection to one application
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            sweep_blocked: true,
            app_id: None,
        }
    }
}

impl ReconcilerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_sweep_blocked(mut self, sweep: bool) -> Self {
        self.sweep_blocked = sweep;
        self
    }

    pub fn with_app(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
