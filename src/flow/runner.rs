//! # Flow Runner
//!
//! Local scheduler for a flow: runs tasks in dependency order, one attempt at a
//! time through each task's [`TaskRunner`]. A task becomes ready as soon as all of
//! its upstream tasks reached a terminal state. At most the configured number of
//! attempts run at once; a task waiting out its retry delay sits on a timer and
//! holds no slot, then queues again for its next attempt.
//!
//! A finished run can be resumed: results of tasks that succeeded or were cached
//! are carried over, as are skips whose upstream states were all carried over too.
//! Tasks that asked to wait are re-entered with the "was waiting" marker, and every
//! other task runs again.

use super::graph::{Edge, FlowRef};
use crate::cache::CacheStore;
use crate::config::EngineConfig;
use crate::constants::{events, DEFAULT_MAX_CONCURRENT_TASKS};
use crate::context;
use crate::error::{TaskflowError, TaskflowResult};
use crate::state_machine::{
    AttemptOutcome, ExecutionRecord, RunContext, StateMachineError, StateMachineResult,
    TaskRunReport, TaskRunner, TaskState,
};
use crate::task::{TaskArguments, TaskId, TaskRef};
use crate::triggers::UpstreamStates;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Final states and per-task histories of one flow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRunReport {
    pub flow_name: String,
    pub correlation_id: Uuid,
    pub states: HashMap<TaskId, TaskState>,
    pub task_reports: HashMap<TaskId, TaskRunReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl FlowRunReport {
    pub fn state_of(&self, task: &TaskRef) -> Option<&TaskState> {
        self.states.get(&task.id())
    }

    pub fn report_of(&self, task: &TaskRef) -> Option<&TaskRunReport> {
        self.task_reports.get(&task.id())
    }

    /// State of the first task reported under `name`
    pub fn state_by_name(&self, name: &str) -> Option<&TaskState> {
        self.task_reports
            .values()
            .find(|report| report.task_name == name)
            .and_then(|report| self.states.get(&report.task_id))
    }

    /// Whether every task ended in a successful state
    pub fn is_successful(&self) -> bool {
        self.states.values().all(TaskState::is_successful)
    }

    /// Whether any task is waiting to be resumed
    pub fn is_waiting(&self) -> bool {
        self.states.values().any(TaskState::is_waiting)
    }
}

pub struct FlowRunner {
    flow: FlowRef,
    cache: Option<Arc<dyn CacheStore>>,
    max_concurrency: usize,
}

impl FlowRunner {
    pub fn new(flow: FlowRef) -> Self {
        Self {
            flow,
            cache: None,
            max_concurrency: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }

    #[must_use]
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(store);
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_config(self, config: &EngineConfig) -> Self {
        self.with_max_concurrency(config.max_concurrent_tasks)
    }

    pub fn flow(&self) -> &FlowRef {
        &self.flow
    }

    /// Run every task of the flow with the given parameters
    pub async fn run(&self, parameters: BTreeMap<String, Value>) -> TaskflowResult<FlowRunReport> {
        self.execute(parameters, None).await
    }

    /// Run again after a previous run of the same flow
    pub async fn resume(
        &self,
        previous: &FlowRunReport,
        parameters: BTreeMap<String, Value>,
    ) -> TaskflowResult<FlowRunReport> {
        self.execute(parameters, Some(previous)).await
    }

    /// Run with the parameters of the ambient context.
    ///
    /// The context is captured when this is called, not when the returned future is
    /// first polled. When it carries the "was waiting" marker and a previous run is
    /// given, the previous run is resumed.
    pub fn run_in_context<'a>(
        &'a self,
        previous: Option<&'a FlowRunReport>,
    ) -> impl Future<Output = TaskflowResult<FlowRunReport>> + 'a {
        let frame = context::current();
        async move {
            match previous {
                Some(previous) if frame.is_waiting => {
                    self.resume(previous, frame.parameters).await
                }
                _ => self.run(frame.parameters).await,
            }
        }
    }

    async fn execute(
        &self,
        parameters: BTreeMap<String, Value>,
        previous: Option<&FlowRunReport>,
    ) -> TaskflowResult<FlowRunReport> {
        let started_at = Utc::now();
        let correlation_id = Uuid::new_v4();
        let parameters = Arc::new(parameters);
        let tasks = self.flow.sorted_tasks()?;

        let mut upstream_edges: HashMap<TaskId, Vec<Edge>> = HashMap::new();
        for edge in self.flow.edges() {
            upstream_edges
                .entry(edge.downstream.id())
                .or_default()
                .push(edge);
        }

        info!(
            event = events::FLOW_RUN_STARTED,
            flow = self.flow.name(),
            correlation_id = %correlation_id,
            task_count = tasks.len(),
            resumed = previous.is_some(),
            "Flow run started"
        );

        let mut states: HashMap<TaskId, TaskState> = HashMap::new();
        let mut task_reports: HashMap<TaskId, TaskRunReport> = HashMap::new();
        let mut resuming: HashSet<TaskId> = HashSet::new();

        if let Some(previous) = previous {
            // Topological order: a task's upstream tasks are decided before it
            for task in &tasks {
                let Some(report) = previous.report_of(task) else {
                    continue;
                };
                let upstream_reused = upstream_done(&upstream_edges, task, &states);
                match &report.state {
                    // A skip is only as current as the upstream states it was decided on
                    TaskState::Skipped { .. } if !upstream_reused => {}
                    state if state.is_successful() => {
                        states.insert(task.id(), state.clone());
                        task_reports.insert(task.id(), report.clone());
                    }
                    TaskState::WaitingForUpstream { .. } if report.entered_running() => {
                        resuming.insert(task.id());
                    }
                    _ => {}
                }
            }
        }

        let mut blocked: Vec<TaskRef> = tasks
            .into_iter()
            .filter(|task| !states.contains_key(&task.id()))
            .collect();
        let mut ready: VecDeque<(TaskRef, RunContext)> = VecDeque::new();
        let mut records: HashMap<TaskId, Vec<ExecutionRecord>> = HashMap::new();
        let mut in_flight: FuturesUnordered<BoxFuture<'static, Progress>> = FuturesUnordered::new();
        let mut running = 0_usize;

        loop {
            let (unblocked, still_blocked): (Vec<TaskRef>, Vec<TaskRef>) = blocked
                .into_iter()
                .partition(|task| upstream_done(&upstream_edges, task, &states));
            blocked = still_blocked;
            for task in unblocked {
                let ctx = RunContext {
                    flow_name: self.flow.name().to_string(),
                    attempt: 1,
                    parameters: Arc::clone(&parameters),
                    is_waiting: resuming.contains(&task.id()),
                    correlation_id,
                    ..RunContext::default()
                };
                ready.push_back((task, ctx));
            }

            // Only running attempts count against the limit; pending retries wait on timers
            while running < self.max_concurrency {
                let Some((task, ctx)) = ready.pop_front() else {
                    break;
                };
                let edges = upstream_edges.get(&task.id()).map_or(&[][..], Vec::as_slice);
                in_flight.push(self.attempt(task, ctx, edges, &states));
                running += 1;
            }

            let Some(progress) = in_flight.next().await else {
                break;
            };
            match progress {
                Progress::Attempted { task, ctx, outcome } => {
                    running -= 1;
                    let outcome = outcome?;
                    records.entry(task.id()).or_default().extend(outcome.records);

                    if let TaskState::Retrying { scheduled_at, .. } = outcome.state {
                        in_flight.push(retry_timer(task, ctx.next_attempt(), scheduled_at));
                        continue;
                    }

                    states.insert(task.id(), outcome.state.clone());
                    task_reports.insert(
                        task.id(),
                        TaskRunReport {
                            task_id: task.id(),
                            task_name: task.name().to_string(),
                            state: outcome.state,
                            records: records.remove(&task.id()).unwrap_or_default(),
                        },
                    );
                }
                Progress::RetryDue { task, ctx } => ready.push_back((task, ctx)),
            }
        }

        if !blocked.is_empty() {
            return Err(TaskflowError::from(StateMachineError::Internal(format!(
                "No runnable task among {} remaining in flow {}",
                blocked.len(),
                self.flow.name()
            ))));
        }

        let report = FlowRunReport {
            flow_name: self.flow.name().to_string(),
            correlation_id,
            states,
            task_reports,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            event = events::FLOW_RUN_FINISHED,
            flow = self.flow.name(),
            correlation_id = %correlation_id,
            successful = report.is_successful(),
            waiting = report.is_waiting(),
            "Flow run finished"
        );
        Ok(report)
    }

    /// One attempt of `task` against the current upstream states
    fn attempt(
        &self,
        task: TaskRef,
        ctx: RunContext,
        edges: &[Edge],
        states: &HashMap<TaskId, TaskState>,
    ) -> BoxFuture<'static, Progress> {
        let upstream: UpstreamStates = edges
            .iter()
            .filter_map(|edge| {
                let id = edge.upstream.id();
                states.get(&id).map(|state| (id, state.clone()))
            })
            .collect();
        let inputs = self.inputs_for(&task, edges, states);
        let runner = self.task_runner(&task);
        debug!(
            flow = self.flow.name(),
            task_name = task.name(),
            attempt = ctx.attempt,
            "Starting attempt"
        );
        async move {
            let outcome = runner.run_attempt(&upstream, &inputs, &ctx).await;
            Progress::Attempted { task, ctx, outcome }
        }
        .boxed()
    }

    fn task_runner(&self, task: &TaskRef) -> TaskRunner {
        let runner = TaskRunner::new(Arc::clone(task));
        match &self.cache {
            Some(store) => runner.with_cache_store(Arc::clone(store)),
            None => runner,
        }
    }

    /// Literal bindings plus upstream results for keyed edges
    fn inputs_for(
        &self,
        task: &TaskRef,
        edges: &[Edge],
        states: &HashMap<TaskId, TaskState>,
    ) -> TaskArguments {
        let mut inputs = TaskArguments::from(self.flow.literal_inputs(task));
        for edge in edges {
            if let Some(key) = &edge.key {
                let value = states
                    .get(&edge.upstream.id())
                    .and_then(TaskState::result)
                    .cloned()
                    .unwrap_or(Value::Null);
                inputs.insert(key.clone(), value);
            }
        }
        inputs
    }
}

/// Events driving the scheduler loop
enum Progress {
    Attempted {
        task: TaskRef,
        ctx: RunContext,
        outcome: StateMachineResult<AttemptOutcome>,
    },
    RetryDue {
        task: TaskRef,
        ctx: RunContext,
    },
}

/// Re-queue `task` once its retry is due, without holding a concurrency slot
fn retry_timer(task: TaskRef, ctx: RunContext, scheduled_at: DateTime<Utc>) -> BoxFuture<'static, Progress> {
    let delay = (scheduled_at - Utc::now()).to_std().unwrap_or_default();
    debug!(
        task_name = task.name(),
        next_attempt = ctx.attempt,
        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        "Waiting before retry"
    );
    async move {
        tokio::time::sleep(delay).await;
        Progress::RetryDue { task, ctx }
    }
    .boxed()
}

fn upstream_done(
    upstream_edges: &HashMap<TaskId, Vec<Edge>>,
    task: &TaskRef,
    states: &HashMap<TaskId, TaskState>,
) -> bool {
    upstream_edges.get(&task.id()).map_or(true, |edges| {
        edges.iter().all(|edge| states.contains_key(&edge.upstream.id()))
    })
}
