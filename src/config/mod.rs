//! Configuration for the causality engine.
//!
//! Configuration is loaded with precedence: overrides > Env vars > Config file > Defaults
//!
//! # Example config file (causality.toml)
//! ```toml
//! task = "orders-sync"
//! source_id = "mysql-replica-01"
//! queue_size = 4096
//! worker_count = 32
//! ```

mod defaults;

pub use defaults::*;

use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings consumed by the causality worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CausalityConfig {
    /// Task label (observability only)
    pub task: String,
    /// Upstream source label (observability only)
    pub source_id: String,
    /// Capacity of the output channel
    pub queue_size: usize,
    /// Number of apply-workers a conflict barrier waits for
    pub worker_count: usize,
}

impl Default for CausalityConfig {
    fn default() -> Self {
        Self {
            task: DEFAULT_TASK.to_string(),
            source_id: DEFAULT_SOURCE_ID.to_string(),
            queue_size: DEFAULT_QUEUE_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

impl CausalityConfig {
    /// Load configuration with precedence: overrides > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - Caller overrides to apply on top
    pub fn load(
        config_path: Option<&Path>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(CausalityConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX));
        figment = figment.merge(Serialized::defaults(overrides));

        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment and optional config file only.
    pub fn from_env(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_size == 0 {
            return Err(ConfigError::Invalid {
                field: "queue_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid {
                field: "worker_count",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn with_task(mut self, task: impl Into<String>, source_id: impl Into<String>) -> Self {
        self.task = task.into();
        self.source_id = source_id.into();
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }
}

/// Overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_count: Option<usize>,
}
