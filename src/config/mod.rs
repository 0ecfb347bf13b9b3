//! # Taskflow Configuration
//!
//! Engine-wide defaults and logging settings. Every field has a built-in default
//! that matches the crate constants, so an empty configuration is valid. Values
//! can be supplied from a TOML file and overridden from `TASKFLOW__`-prefixed
//! environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use taskflow_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//! let options = config.engine.task_options();
//! let concurrency = config.engine.max_concurrent_tasks;
//! # let _ = (options, concurrency);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{DEFAULT_MAX_CONCURRENT_TASKS, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};
use crate::task::TaskOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TaskflowConfig {
    /// Task execution defaults and runner limits
    pub engine: EngineConfig,

    /// Structured logging settings
    pub logging: LoggingConfig,
}

impl TaskflowConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.engine.validate()?;
        self.logging.validate()
    }
}

/// Task execution defaults
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_max_retries: u32,
    pub default_retry_delay_seconds: f64,
    pub default_timeout_seconds: Option<f64>,
    pub max_concurrent_tasks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_retries: DEFAULT_MAX_RETRIES,
            default_retry_delay_seconds: DEFAULT_RETRY_DELAY.as_secs_f64(),
            default_timeout_seconds: None,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        seconds("engine.default_retry_delay_seconds", self.default_retry_delay_seconds)?;
        if let Some(timeout) = self.default_timeout_seconds {
            let timeout = seconds("engine.default_timeout_seconds", timeout)?;
            if timeout.is_zero() {
                return Err(ConfigurationError::invalid_value(
                    "engine.default_timeout_seconds",
                    "0",
                    "timeout must be greater than zero",
                ));
            }
        }
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.max_concurrent_tasks",
                "0",
                "at least one task must be allowed to run",
            ));
        }
        Ok(())
    }

    pub fn default_retry_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.default_retry_delay_seconds).unwrap_or(DEFAULT_RETRY_DELAY)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_seconds
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
    }

    /// Task options preset with the configured defaults
    pub fn task_options(&self) -> TaskOptions {
        TaskOptions::new().with_defaults(
            self.default_max_retries,
            self.default_retry_delay(),
            self.default_timeout(),
        )
    }
}

fn seconds(field: &str, value: f64) -> ConfigResult<Duration> {
    Duration::try_from_secs_f64(value).map_err(|err| {
        ConfigurationError::invalid_value(field, value.to_string(), err.to_string())
    })
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Structured logging settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; when unset it is derived from `RUST_LOG` or the environment
    pub level: Option<String>,
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(level) = &self.level {
            if level.trim().is_empty() {
                return Err(ConfigurationError::validation_error(
                    "logging.level must not be empty when set",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = TaskflowConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.default_retry_delay(), DEFAULT_RETRY_DELAY);
        assert_eq!(config.engine.default_timeout(), None);
        assert_eq!(config.engine.max_concurrent_tasks, DEFAULT_MAX_CONCURRENT_TASKS);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let engine = EngineConfig {
            default_retry_delay_seconds: -1.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            engine.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));

        let engine = EngineConfig {
            max_concurrent_tasks: 0,
            ..EngineConfig::default()
        };
        assert!(engine.validate().is_err());

        let engine = EngineConfig {
            default_timeout_seconds: Some(0.0),
            ..EngineConfig::default()
        };
        assert!(engine.validate().is_err());

        let logging = LoggingConfig {
            level: Some("  ".to_string()),
            ..LoggingConfig::default()
        };
        assert!(logging.validate().is_err());
    }
}
