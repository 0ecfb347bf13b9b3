//! # Task Runner
//!
//! Drives one declared task from `Pending` to a terminal state for a single flow
//! run. Each attempt:
//!
//! 1. requires every upstream task to be terminal, then decides from the upstream
//!    states whether the task waits, is skipped, or proceeds;
//! 2. replays a stored result when the cache policy allows it;
//! 3. otherwise runs the entrypoint on its own blocking-pool thread, bounded by
//!    the task's timeout, and maps the outcome to a state.
//!
//! Failed and timed-out attempts are rescheduled while retries remain. The caller
//! is responsible for running a task only after its upstream tasks finished; the
//! runner performs no cross-task locking.

use super::errors::{StateMachineError, StateMachineResult};
use super::record::{AttemptOutcome, ExecutionRecord, TaskRunReport};
use super::run_context::RunContext;
use super::states::TaskState;
use crate::cache::{CacheContext, CacheStore, CachedResult};
use crate::constants::events;
use crate::logging::log_task_transition;
use crate::task::{DeclaredTask, TaskArguments, TaskOutcome, TaskRef};
use crate::triggers::UpstreamStates;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{debug, info, instrument, warn};

/// Executes the attempts of one declared task
#[derive(Clone)]
pub struct TaskRunner {
    task: TaskRef,
    cache: Option<Arc<dyn CacheStore>>,
}

impl TaskRunner {
    pub fn new(task: TaskRef) -> Self {
        Self { task, cache: None }
    }

    /// Use `store` for cache lookups and writes
    #[must_use]
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(store);
        self
    }

    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    /// Run attempts until the task reaches a terminal state.
    ///
    /// Between a failed attempt and its retry the runner awaits a tokio timer for
    /// the task's retry delay.
    pub async fn run(
        &self,
        upstream: &UpstreamStates,
        inputs: TaskArguments,
        ctx: RunContext,
    ) -> StateMachineResult<TaskRunReport> {
        let mut ctx = self.prepare_context(&ctx);
        let mut records = Vec::new();

        loop {
            let outcome = self.run_attempt(upstream, &inputs, &ctx).await?;
            records.extend(outcome.records);

            if let TaskState::Retrying { attempt, .. } = outcome.state {
                let delay = self.task.declaration().retry_delay();
                debug!(
                    task_name = self.task.name(),
                    next_attempt = attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Waiting before retry"
                );
                tokio::time::sleep(delay).await;
                ctx = ctx.next_attempt();
                continue;
            }

            return Ok(TaskRunReport {
                task_id: self.task.id(),
                task_name: self.task.name().to_string(),
                state: outcome.state,
                records,
            });
        }
    }

    /// Run a single attempt.
    ///
    /// When retries remain after a failure the outcome ends in `Retrying` with the
    /// time the next attempt is due; rescheduling is left to the caller.
    #[instrument(skip_all, fields(task_name = %self.task.name(), attempt = ctx.attempt))]
    pub async fn run_attempt(
        &self,
        upstream: &UpstreamStates,
        inputs: &TaskArguments,
        ctx: &RunContext,
    ) -> StateMachineResult<AttemptOutcome> {
        let ctx = self.prepare_context(ctx);
        let mut attempt = AttemptRecorder::start(&self.task, &ctx);

        for (upstream_id, state) in upstream {
            if !state.is_terminal() {
                return Err(StateMachineError::UpstreamNotFinished {
                    task: self.task.name().to_string(),
                    upstream: *upstream_id,
                    state: state.name().to_string(),
                });
            }
        }

        if let Some(state) = self.check_upstream(upstream, &ctx) {
            attempt.transition(state)?;
            return Ok(attempt.finish());
        }

        if let Some(state) = self.check_cache(inputs, &ctx).await {
            attempt.transition(state)?;
            return Ok(attempt.finish());
        }

        attempt.transition(TaskState::Running)?;
        let state = self.invoke(inputs, &ctx).await;
        let succeeded = state.result().cloned();
        attempt.transition(state)?;

        if let Some(value) = succeeded {
            self.store_result(value, inputs, &ctx).await;
        }

        if attempt.current().is_failed() {
            let retry = self.task.declaration().retry_policy();
            if retry.allows_retry_after(ctx.attempt) {
                let scheduled_at = schedule_after(retry.retry_delay);
                info!(
                    event = events::TASK_RETRY_SCHEDULED,
                    task_name = self.task.name(),
                    attempt = ctx.attempt,
                    max_retries = retry.max_retries,
                    scheduled_at = %scheduled_at,
                    "Retry scheduled"
                );
                attempt.transition(TaskState::Retrying {
                    attempt: ctx.attempt + 1,
                    scheduled_at,
                })?;
            }
        }

        Ok(attempt.finish())
    }

    fn prepare_context(&self, ctx: &RunContext) -> RunContext {
        let declaration = self.task.declaration();
        RunContext {
            task_name: declaration.name().to_string(),
            task_slug: declaration.slug().map(str::to_string),
            attempt: ctx.attempt.max(1),
            max_retries: declaration.max_retries(),
            ..ctx.clone()
        }
    }

    /// Decide wait, skip or trigger failure from the upstream states.
    ///
    /// A waiting upstream task only holds this task back when the trigger would
    /// not fire; triggers that accept any terminal upstream state run regardless.
    fn check_upstream(&self, upstream: &UpstreamStates, ctx: &RunContext) -> Option<TaskState> {
        if ctx.is_waiting {
            debug!(
                task_name = self.task.name(),
                "Resuming a waiting task, upstream checks bypassed"
            );
            return None;
        }

        let declaration = self.task.declaration();
        if declaration.skip_on_upstream_skip() && upstream.values().any(TaskState::is_skipped) {
            return Some(TaskState::skipped("Upstream task was skipped"));
        }

        let trigger = declaration.trigger();
        if trigger.evaluate(upstream) {
            return None;
        }

        if upstream.values().any(TaskState::is_waiting) {
            return Some(TaskState::waiting("Upstream task is waiting"));
        }

        Some(TaskState::skipped(format!(
            "Trigger '{}' was not satisfied",
            trigger.name()
        )))
    }

    async fn check_cache(&self, inputs: &TaskArguments, ctx: &RunContext) -> Option<TaskState> {
        let policy = self.task.declaration().cache_policy();
        let cache_for = policy.cache_for()?;
        let store = self.cache.as_ref()?;
        let key = self.task.cache_key(&ctx.flow_name);

        let previous = match store.get(&key).await {
            Ok(previous) => previous?,
            Err(err) => {
                warn!(task_name = self.task.name(), cache_key = %key, error = %err, "Cache lookup failed");
                return None;
            }
        };

        let cache_ctx = CacheContext {
            cache_for: Some(cache_for),
            inputs,
            parameters: ctx.parameters.as_ref(),
        };
        if !policy.validator().is_valid(&previous, Utc::now(), &cache_ctx) {
            debug!(
                task_name = self.task.name(),
                cache_validator = policy.validator().name(),
                cached_at = %previous.cached_at,
                "Stored result is no longer valid"
            );
            return None;
        }

        info!(
            event = events::TASK_CACHE_HIT,
            task_name = self.task.name(),
            cached_at = %previous.cached_at,
            "Reusing cached result"
        );
        Some(TaskState::Cached {
            result: previous.value,
            cached_at: previous.cached_at,
        })
    }

    /// Write at most one cache entry for a successful attempt
    async fn store_result(&self, value: serde_json::Value, inputs: &TaskArguments, ctx: &RunContext) {
        if !self.task.declaration().cache_policy().is_enabled() {
            return;
        }
        let Some(store) = self.cache.as_ref() else {
            return;
        };

        let key = self.task.cache_key(&ctx.flow_name);
        let entry = CachedResult::new(value, Utc::now())
            .with_inputs(inputs.clone())
            .with_parameters(ctx.parameters.as_ref().clone());
        if let Err(err) = store.put(&key, entry).await {
            warn!(task_name = self.task.name(), cache_key = %key, error = %err, "Cache write failed");
        }
    }

    /// Run the entrypoint on a blocking-pool thread, bounded by the task's timeout.
    ///
    /// The entrypoint is driven by that thread, so the timeout fires even when it
    /// never yields. On timeout the attempt ends at once; an entrypoint suspended
    /// at an await point is dropped there, one stuck in synchronous code is left
    /// to finish on its own thread and its result is discarded.
    async fn invoke(&self, inputs: &TaskArguments, ctx: &RunContext) -> TaskState {
        let entrypoint = self.task.entrypoint();
        let args = inputs.clone();
        let run_ctx = ctx.clone();
        let runtime = Handle::current();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let handle = tokio::task::spawn_blocking(move || {
            runtime.block_on(async move {
                tokio::select! {
                    outcome = entrypoint.run(&run_ctx, &args) => Some(outcome),
                    _ = cancel_rx => None,
                }
            })
        });

        let joined = match self.task.declaration().timeout() {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    let _ = cancel_tx.send(());
                    return TaskState::timed_out(timeout_message(limit));
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(Some(Ok(outcome))) => {
                debug!(
                    task_name = self.task.name(),
                    outcome = outcome.outcome_type(),
                    "Entrypoint returned"
                );
                outcome_state(outcome)
            }
            Ok(Some(Err(err))) => TaskState::failed(format!("{err:#}")),
            Ok(None) => TaskState::failed("Task was cancelled"),
            Err(err) => TaskState::failed(join_error_message(err)),
        }
    }
}

fn outcome_state(outcome: TaskOutcome) -> TaskState {
    match outcome {
        TaskOutcome::Return(value) | TaskOutcome::Success(value) => TaskState::success(value),
        TaskOutcome::Fail(message) => TaskState::failed(message),
        TaskOutcome::Wait(message) => TaskState::waiting(message),
    }
}

fn timeout_message(limit: Duration) -> String {
    format!("Task timed out after {:.3}s", limit.as_secs_f64())
}

fn join_error_message(err: JoinError) -> String {
    if err.is_panic() {
        format!("Task panicked: {}", panic_message(err.into_panic().as_ref()))
    } else {
        "Task was cancelled".to_string()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn schedule_after(delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| Utc::now().checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn is_valid_transition(from: &TaskState, to: &TaskState) -> bool {
    use TaskState::{
        Cached, Failed, Pending, Retrying, Running, Skipped, Success, TimedOut, WaitingForUpstream,
    };
    matches!(
        (from, to),
        (
            Pending | Retrying { .. },
            Running | Skipped { .. } | Cached { .. } | WaitingForUpstream { .. }
        ) | (
            Running,
            Success { .. } | Failed { .. } | TimedOut { .. } | WaitingForUpstream { .. }
        ) | (Failed { .. } | TimedOut { .. }, Retrying { .. })
    )
}

/// Validates and records the transitions of one attempt
struct AttemptRecorder<'a> {
    task: &'a DeclaredTask,
    attempt: u32,
    current: TaskState,
    records: Vec<ExecutionRecord>,
}

impl<'a> AttemptRecorder<'a> {
    fn start(task: &'a DeclaredTask, ctx: &RunContext) -> Self {
        // Later attempts continue from the Retrying state that scheduled them
        let current = if ctx.attempt > 1 {
            TaskState::Retrying {
                attempt: ctx.attempt,
                scheduled_at: Utc::now(),
            }
        } else {
            TaskState::Pending
        };
        Self {
            task,
            attempt: ctx.attempt,
            current,
            records: Vec::new(),
        }
    }

    fn current(&self) -> &TaskState {
        &self.current
    }

    fn transition(&mut self, to: TaskState) -> StateMachineResult<()> {
        if !is_valid_transition(&self.current, &to) {
            return Err(StateMachineError::InvalidTransition {
                from: self.current.name().to_string(),
                to: to.name().to_string(),
            });
        }

        log_task_transition(
            self.task.id(),
            self.task.name(),
            self.attempt,
            &self.current,
            &to,
        );

        self.records.push(ExecutionRecord {
            task_id: self.task.id(),
            task_name: self.task.name().to_string(),
            attempt: self.attempt,
            state: to.clone(),
            recorded_at: Utc::now(),
        });
        self.current = to;
        Ok(())
    }

    fn finish(self) -> AttemptOutcome {
        AttemptOutcome {
            records: self.records,
            state: self.current,
        }
    }
}
