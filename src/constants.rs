//! # System Constants
//!
//! Default policy values and identifiers shared by declarations, the state
//! machine and configuration loading. Defaults are immutable constants; nothing
//! in the crate hands out a shared mutable default.

use std::time::Duration;

/// Default delay between a failed attempt and its retry
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 0;

/// Default number of tasks the local runner executes at once
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 16;

/// Environment variable prefix used by the configuration loader
pub const ENV_PREFIX: &str = "TASKFLOW";

/// Names of the built-in triggers
pub mod triggers {
    pub const ALL_SUCCESSFUL: &str = "all_successful";
    pub const ALL_FINISHED: &str = "all_finished";
    pub const ALWAYS_RUN: &str = "always_run";
    pub const MANUAL_ONLY: &str = "manual_only";
    pub const ALL_FAILED: &str = "all_failed";
    pub const ANY_SUCCESSFUL: &str = "any_successful";
    pub const ANY_FAILED: &str = "any_failed";
}

/// Names of the built-in cache validators
pub mod cache_validators {
    pub const NEVER_USE: &str = "never_use";
    pub const DURATION_ONLY: &str = "duration_only";
    pub const ALL_INPUTS: &str = "all_inputs";
    pub const ALL_PARAMETERS: &str = "all_parameters";
    pub const PARTIAL_PARAMETERS_ONLY: &str = "partial_parameters_only";
    pub const PARTIAL_INPUTS_ONLY: &str = "partial_inputs_only";
}

/// Lifecycle event names attached to transition logs
pub mod events {
    pub const TASK_TRANSITION: &str = "task.transition";
    pub const TASK_RETRY_SCHEDULED: &str = "task.retry_scheduled";
    pub const TASK_CACHE_HIT: &str = "task.cache_hit";
    pub const FLOW_RUN_STARTED: &str = "flow.run_started";
    pub const FLOW_RUN_FINISHED: &str = "flow.run_finished";
}
