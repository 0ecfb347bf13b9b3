use crate::task::TaskId;
use thiserror::Error;

/// Misuse of the state machine by its caller.
///
/// Entrypoint failures never surface here; they end up in a `Failed` state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Task {task} started before upstream task {upstream} reached a terminal state ({state})")]
    UpstreamNotFinished {
        task: String,
        upstream: TaskId,
        state: String,
    },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for state machine operations
pub type StateMachineResult<T> = Result<T, StateMachineError>;

