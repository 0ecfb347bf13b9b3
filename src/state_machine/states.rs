use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Task state definitions for one task instance within a flow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    /// Initial state before the first attempt
    Pending,
    /// Entrypoint is currently executing
    Running,
    /// Task completed with a result
    Success { result: Value },
    /// Task failed, either by signal or by error
    Failed { message: String },
    /// A failed attempt is scheduled to run again
    Retrying {
        attempt: u32,
        scheduled_at: DateTime<Utc>,
    },
    /// Task did not run because of its upstream tasks or trigger
    Skipped { message: String },
    /// Attempt exceeded the configured timeout
    TimedOut { message: String },
    /// A previously stored result was reused
    Cached {
        result: Value,
        cached_at: DateTime<Utc>,
    },
    /// Task asked to be resumed by a later run
    WaitingForUpstream { message: String },
}

impl TaskState {
    pub fn success(result: impl Into<Value>) -> Self {
        Self::Success {
            result: result.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self::Skipped {
            message: message.into(),
        }
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::TimedOut {
            message: message.into(),
        }
    }

    pub fn waiting(message: impl Into<String>) -> Self {
        Self::WaitingForUpstream {
            message: message.into(),
        }
    }

    /// Check if this is a terminal state for the current run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success { .. }
                | Self::Failed { .. }
                | Self::Skipped { .. }
                | Self::TimedOut { .. }
                | Self::Cached { .. }
                | Self::WaitingForUpstream { .. }
        )
    }

    /// Check if this state counts as success for downstream triggers
    pub fn is_successful(&self) -> bool {
        matches!(
            self,
            Self::Success { .. } | Self::Cached { .. } | Self::Skipped { .. }
        )
    }

    /// Check if this is a failure state (retry eligible while retries remain)
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::TimedOut { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::WaitingForUpstream { .. })
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached { .. })
    }

    /// Result value carried by Success and Cached states
    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Success { result } | Self::Cached { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Message carried by failure, skip and wait states
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Failed { message }
            | Self::Skipped { message }
            | Self::TimedOut { message }
            | Self::WaitingForUpstream { message } => Some(message),
            _ => None,
        }
    }

    /// Snake-case state name used in logs and snapshots
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success { .. } => "success",
            Self::Failed { .. } => "failed",
            Self::Retrying { .. } => "retrying",
            Self::Skipped { .. } => "skipped",
            Self::TimedOut { .. } => "timed_out",
            Self::Cached { .. } => "cached",
            Self::WaitingForUpstream { .. } => "waiting_for_upstream",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Default state for new task instances
impl Default for TaskState {
    fn default() -> Self {
        Self::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_state_terminal_check() {
        assert!(TaskState::success(json!(1)).is_terminal());
        assert!(TaskState::failed("x").is_terminal());
        assert!(TaskState::skipped("x").is_terminal());
        assert!(TaskState::timed_out("x").is_terminal());
        assert!(TaskState::waiting("x").is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(!TaskState::Retrying {
            attempt: 2,
            scheduled_at: Utc::now()
        }
        .is_terminal());
    }

    #[test]
    fn test_success_classification() {
        assert!(TaskState::skipped("upstream skipped").is_successful());
        assert!(!TaskState::timed_out("slow").is_successful());
        assert!(TaskState::timed_out("slow").is_failed());
        assert!(!TaskState::waiting("later").is_successful());
    }

    #[test]
    fn test_result_and_message_accessors() {
        assert_eq!(TaskState::success(json!(10)).result(), Some(&json!(10)));
        assert_eq!(TaskState::failed("boom").message(), Some("boom"));
        assert_eq!(TaskState::Pending.result(), None);
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_value(TaskState::failed("boom")).unwrap();
        assert_eq!(json, json!({"state": "failed", "message": "boom"}));
        assert_eq!(TaskState::WaitingForUpstream { message: String::new() }.to_string(), "waiting_for_upstream");
    }
}
