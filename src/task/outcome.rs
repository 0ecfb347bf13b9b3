use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tagged result of one entrypoint invocation.
///
/// Plain returns and the three signals are ordinary values inspected by the state
/// machine; only genuine errors travel through the `Err` side of the entrypoint's
/// `anyhow::Result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Normal return with the task's result
    Return(Value),
    /// SUCCESS signal: succeed with this value regardless of anything else
    Success(Value),
    /// FAIL signal: fail with this message, eligible for retry
    Fail(String),
    /// WAIT signal: stop this run and wait to be resumed
    Wait(String),
}

impl TaskOutcome {
    /// Normal return with a result value
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Return(value.into())
    }

    /// Normal return without a result
    pub fn empty() -> Self {
        Self::Return(Value::Null)
    }

    pub fn succeed(value: impl Into<Value>) -> Self {
        Self::Success(value.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }

    pub fn wait(message: impl Into<String>) -> Self {
        Self::Wait(message.into())
    }

    /// Get a string representation of the outcome type for logging
    pub fn outcome_type(&self) -> &'static str {
        match self {
            Self::Return(_) => "return",
            Self::Success(_) => "success",
            Self::Fail(_) => "fail",
            Self::Wait(_) => "wait",
        }
    }

    /// Whether this outcome is one of the out-of-band signals
    pub fn is_signal(&self) -> bool {
        !matches!(self, Self::Return(_))
    }
}

impl From<Value> for TaskOutcome {
    fn from(value: Value) -> Self {
        Self::Return(value)
    }
}
