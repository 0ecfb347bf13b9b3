//! # Structured Logging Module
//!
//! Environment-aware structured logging for flow runs. Task transitions are
//! emitted as structured `tracing` events carrying the task identity, attempt and
//! the states on both sides of the transition.

use crate::config::{LogFormat, LoggingConfig};
use crate::constants::events;
use crate::state_machine::TaskState;
use crate::task::TaskId;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific defaults
pub fn init_structured_logging() {
    init_with_config(&LoggingConfig::default());
}

/// Initialize structured logging from configuration.
///
/// Only the first call installs a subscriber. If another subscriber is already
/// installed globally it is kept.
pub fn init_with_config(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let directive = config
            .level
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| get_log_level(&environment).to_string());
        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

        let layer = match config.format {
            LogFormat::Json => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .json()
                .with_filter(filter)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed(),
        };

        // Use try_init to avoid panic if global subscriber already set
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
            return;
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            filter = %directive,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("TASKFLOW_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log a task state transition
pub fn log_task_transition(
    task_id: TaskId,
    task_name: &str,
    attempt: u32,
    from: &TaskState,
    to: &TaskState,
) {
    match to {
        TaskState::Failed { message } | TaskState::TimedOut { message } => tracing::warn!(
            event = events::TASK_TRANSITION,
            task_id = %task_id,
            task_name = task_name,
            attempt = attempt,
            from = from.name(),
            to = to.name(),
            message = %message,
            "Task transition"
        ),
        _ => tracing::info!(
            event = events::TASK_TRANSITION,
            task_id = %task_id,
            task_name = task_name,
            attempt = attempt,
            from = from.name(),
            to = to.name(),
            message = to.message(),
            "Task transition"
        ),
    }
}
