//! Configuration Loader
//!
//! Layers the built-in defaults, an optional TOML file and `TASKFLOW__`-prefixed
//! environment variables (`TASKFLOW__ENGINE__MAX_CONCURRENT_TASKS=4`), then
//! validates the result.

use super::error::ConfigResult;
use super::TaskflowConfig;
use crate::constants::ENV_PREFIX;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "TASKFLOW_CONFIG_PATH";

/// Loads [`TaskflowConfig`] from its sources
pub struct ConfigManager;

impl ConfigManager {
    /// Load from the file named by `TASKFLOW_CONFIG_PATH`, if any, plus the environment
    pub fn load() -> ConfigResult<TaskflowConfig> {
        let path = env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::load_layers(path.as_deref(), true)
    }

    /// Load from a specific TOML file plus the environment
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<TaskflowConfig> {
        Self::load_layers(Some(path.as_ref()), true)
    }

    /// Load from a TOML file only, ignoring environment overrides.
    ///
    /// Useful for tests that must not depend on the process environment.
    pub fn load_file_only(path: impl AsRef<Path>) -> ConfigResult<TaskflowConfig> {
        Self::load_layers(Some(path.as_ref()), false)
    }

    fn load_layers(path: Option<&Path>, with_env: bool) -> ConfigResult<TaskflowConfig> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(::config::File::new(
                &path.to_string_lossy(),
                ::config::FileFormat::Toml,
            ));
        }

        if with_env {
            builder = builder.add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: TaskflowConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            max_concurrent_tasks = config.engine.max_concurrent_tasks,
            default_max_retries = config.engine.default_max_retries,
            log_format = ?config.logging.format,
            "Configuration loaded successfully"
        );
        Ok(config)
    }
}
