//! Configuration for turbostore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, StoreError};

/// Main configuration for a turbostore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Database name; also names the snapshot file
    pub db_name: String,

    /// Root directory for snapshot files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── {db_name}.snapshot
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Engine Configuration
    // -------------------------------------------------------------------------
    /// Load the last snapshot while opening
    pub autoload: bool,

    /// Periodically save in the background when something changed
    pub autosave: bool,

    /// Autosave period (milliseconds)
    pub autosave_interval_ms: u64,

    // -------------------------------------------------------------------------
    // Scheduling Configuration
    // -------------------------------------------------------------------------
    /// Upper bound on waiting for an engine callback (milliseconds).
    /// `None` waits forever.
    pub callback_timeout_ms: Option<u64>,

    /// What the chain does after a unit fails
    pub failure_policy: FailurePolicy,
}

/// Chain behaviour after a failed unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Later units run as if nothing happened
    #[default]
    Continue,

    /// Every unit enqueued after a failure resolves with `ChainAborted`
    AbortRemaining,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_name: "Turbo.db".to_string(),
            data_dir: PathBuf::from("./turbo_data"),
            autoload: true,
            autosave: true,
            autosave_interval_ms: 1000,
            callback_timeout_ms: Some(30_000),
            failure_policy: FailurePolicy::Continue,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Autosave period as a `Duration`
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }

    /// Engine callback timeout as a `Duration`
    pub fn callback_timeout(&self) -> Option<Duration> {
        self.callback_timeout_ms.map(Duration::from_millis)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.db_name.trim().is_empty() {
            return Err(StoreError::Config("db_name must not be empty".to_string()));
        }
        if self.autosave && self.autosave_interval_ms == 0 {
            return Err(StoreError::Config(
                "autosave_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.callback_timeout_ms == Some(0) {
            return Err(StoreError::Config(
                "callback_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the database name
    pub fn db_name(mut self, name: impl Into<String>) -> Self {
        self.config.db_name = name.into();
        self
    }

    /// Set the data directory (root for snapshot files)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Enable or disable loading the snapshot on open
    pub fn autoload(mut self, enabled: bool) -> Self {
        self.config.autoload = enabled;
        self
    }

    /// Enable or disable background autosave
    pub fn autosave(mut self, enabled: bool) -> Self {
        self.config.autosave = enabled;
        self
    }

    /// Set the autosave interval (in milliseconds)
    pub fn autosave_interval_ms(mut self, ms: u64) -> Self {
        self.config.autosave_interval_ms = ms;
        self
    }

    /// Set the engine callback timeout (in milliseconds), `None` to wait forever
    pub fn callback_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.config.callback_timeout_ms = ms;
        self
    }

    /// Set the chain failure policy
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
