use super::states::TaskState;
use crate::task::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One state entered by a task during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub task_id: TaskId,
    pub task_name: String,
    pub attempt: u32,
    pub state: TaskState,
    pub recorded_at: DateTime<Utc>,
}

/// States entered by one attempt, ending in the attempt's final state
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    pub records: Vec<ExecutionRecord>,
    pub state: TaskState,
}

impl AttemptOutcome {
    /// Whether the attempt ended by scheduling another one
    pub fn is_retry_scheduled(&self) -> bool {
        matches!(self.state, TaskState::Retrying { .. })
    }
}

/// Every attempt of one task within a run, ending in a terminal state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRunReport {
    pub task_id: TaskId,
    pub task_name: String,
    pub state: TaskState,
    pub records: Vec<ExecutionRecord>,
}

impl TaskRunReport {
    /// Number of attempts that reached the Running state
    pub fn attempts(&self) -> usize {
        self.records
            .iter()
            .filter(|record| matches!(record.state, TaskState::Running))
            .count()
    }

    /// Whether the entrypoint ran during this run
    pub fn entered_running(&self) -> bool {
        self.attempts() > 0
    }

    pub fn states(&self) -> impl Iterator<Item = &TaskState> {
        self.records.iter().map(|record| &record.state)
    }
}
