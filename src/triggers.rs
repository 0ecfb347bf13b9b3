//! # Triggers
//!
//! A trigger decides, from the terminal states of a task's upstream tasks, whether
//! the task should run. Triggers are pure: they see only the upstream states and
//! are only consulted once every upstream task has reached a terminal state.
//!
//! Skipped upstream tasks count as successful. Whether a skip short-circuits the
//! downstream task is decided before the trigger runs, by the task's
//! `skip_on_upstream_skip` flag.

use crate::constants::triggers as names;
use crate::state_machine::TaskState;
use crate::task::TaskId;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Terminal states of a task's upstream tasks, keyed by task identity
pub type UpstreamStates = HashMap<TaskId, TaskState>;

type TriggerFn = dyn Fn(&UpstreamStates) -> bool + Send + Sync;

#[derive(Clone)]
pub struct Trigger {
    name: Cow<'static, str>,
    predicate: Arc<TriggerFn>,
}

impl Trigger {
    fn builtin(name: &'static str, predicate: fn(&UpstreamStates) -> bool) -> Self {
        Self {
            name: Cow::Borrowed(name),
            predicate: Arc::new(predicate),
        }
    }

    /// A user-supplied trigger; the predicate must be free of side effects
    pub fn custom<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&UpstreamStates) -> bool + Send + Sync + 'static,
    {
        Self {
            name: Cow::Owned(name.into()),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, upstream: &UpstreamStates) -> bool {
        (self.predicate)(upstream)
    }
}

impl Default for Trigger {
    fn default() -> Self {
        all_successful()
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger").field("name", &self.name).finish()
    }
}

/// Runs when every upstream task succeeded (Success, Cached or Skipped)
pub fn all_successful() -> Trigger {
    Trigger::builtin(names::ALL_SUCCESSFUL, |upstream| {
        upstream.values().all(TaskState::is_successful)
    })
}

/// Runs once every upstream task finished, whatever the outcome
pub fn all_finished() -> Trigger {
    Trigger::builtin(names::ALL_FINISHED, |upstream| {
        upstream.values().all(TaskState::is_terminal)
    })
}

/// Same behavior as [`all_finished`], named for readability in flow definitions
pub fn always_run() -> Trigger {
    Trigger::builtin(names::ALWAYS_RUN, |upstream| {
        upstream.values().all(TaskState::is_terminal)
    })
}

/// Never runs automatically
pub fn manual_only() -> Trigger {
    Trigger::builtin(names::MANUAL_ONLY, |_| false)
}

/// Runs when every upstream task failed (Failed or TimedOut)
pub fn all_failed() -> Trigger {
    Trigger::builtin(names::ALL_FAILED, |upstream| {
        upstream.values().all(TaskState::is_failed)
    })
}

/// Runs when at least one upstream task succeeded; no upstream tasks also counts
pub fn any_successful() -> Trigger {
    Trigger::builtin(names::ANY_SUCCESSFUL, |upstream| {
        upstream.is_empty() || upstream.values().any(TaskState::is_successful)
    })
}

/// Runs when at least one upstream task failed; no upstream tasks also counts
pub fn any_failed() -> Trigger {
    Trigger::builtin(names::ANY_FAILED, |upstream| {
        upstream.is_empty() || upstream.values().any(TaskState::is_failed)
    })
}
