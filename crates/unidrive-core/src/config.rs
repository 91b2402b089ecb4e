//! Configuration for the sync coordinator
//!
//! Typed structs that map to a YAML configuration file, with defaults,
//! validation and a small builder surface for programmatic use. Backend
//! adapters carry their own configuration types (endpoints, chunk sizes);
//! this covers the coordinator-level settings.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Enable periodic background synchronization
    pub auto_sync: bool,
    /// Seconds between periodic synchronization cycles
    pub interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: false,
            interval_secs: 300,
        }
    }
}

/// Logging / tracing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads and validates configuration from a YAML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges; called by [`load`](Self::load)
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sync.interval_secs == 0 {
            anyhow::bail!("sync.interval_secs must be at least 1");
        }
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.logging.level.as_str()) {
            anyhow::bail!("logging.level must be one of {LEVELS:?}");
        }
        Ok(())
    }

    /// Sets the periodic sync interval
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.sync.interval_secs = secs;
        self
    }

    /// Enables periodic synchronization
    pub fn with_auto_sync(mut self, enabled: bool) -> Self {
        self.sync.auto_sync = enabled;
        self
    }
}
