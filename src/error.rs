//! Error types for the taskflow core.
//!
//! Definition-time failures (bad signatures, bad tags, immutable identity) and
//! declaration-time failures (binding, graph registration) are reported through
//! [`TaskflowError`]. Errors raised by a task's entrypoint are not represented here:
//! the state machine folds them into a `Failed` state.

use crate::config::ConfigurationError;
use crate::state_machine::StateMachineError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskflowError {
    #[error("Definition error for task type {type_name}: {reason}")]
    Definition { type_name: String, reason: String },
    #[error("Context error: {0}")]
    Context(#[from] ContextError),
    #[error("Invalid tags: {0}")]
    InvalidTags(String),
    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),
    #[error("Immutable field '{field}': {reason}")]
    ImmutableField { field: &'static str, reason: String },
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("State machine error: {0}")]
    StateMachine(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Failures caused by a missing or unusable ambient context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("Could not infer an active flow context")]
    NoActiveFlow,
}

/// Failures while matching an invocation against a task's declared inputs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("Argument mismatch for task {task}: {reason}")]
    ArgumentMismatch { task: String, reason: String },
}

/// Failures while registering nodes or edges on a flow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Flow {flow} already contains a task with slug '{slug}'")]
    DuplicateSlug { flow: String, slug: String },
    #[error("Edge {upstream} -> {downstream} would introduce a cycle in flow {flow}")]
    Cycle {
        flow: String,
        upstream: String,
        downstream: String,
    },
    #[error("Argument '{key}' of task {task} is already bound in flow {flow}")]
    DuplicateBinding {
        flow: String,
        task: String,
        key: String,
    },
}

impl From<StateMachineError> for TaskflowError {
    fn from(err: StateMachineError) -> Self {
        TaskflowError::StateMachine(format!("{err}"))
    }
}

impl From<ConfigurationError> for TaskflowError {
    fn from(err: ConfigurationError) -> Self {
        TaskflowError::Configuration(format!("{err}"))
    }
}

pub type TaskflowResult<T> = std::result::Result<T, TaskflowError>;

/// Helper function to create argument mismatch errors
pub fn argument_mismatch(task: impl Into<String>, reason: impl Into<String>) -> TaskflowError {
    TaskflowError::Binding(BindingError::ArgumentMismatch {
        task: task.into(),
        reason: reason.into(),
    })
}
