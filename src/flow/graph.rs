//! # Flow Graph
//!
//! The directed acyclic graph of declared tasks and the edges between them. Keyed
//! edges carry an upstream result into a named argument of the downstream task;
//! unkeyed edges only order execution. Literal arguments recorded at bind time are
//! kept next to the graph and handed to the task unchanged at run time.
//!
//! Registration is serialized by a mutex. Every change is validated in full before
//! any of it is applied, so a rejected change leaves the graph untouched.

use crate::context::{self, ContextGuard};
use crate::error::{GraphError, TaskflowError, TaskflowResult};
use crate::task::{TaskId, TaskRef};
use parking_lot::Mutex;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graphmap::DiGraphMap;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Dependency between two tasks of a flow
#[derive(Debug, Clone)]
pub struct Edge {
    pub upstream: TaskRef,
    pub downstream: TaskRef,
    /// Argument of the downstream task that receives the upstream result
    pub key: Option<String>,
}

impl Edge {
    pub fn new(upstream: TaskRef, downstream: TaskRef, key: Option<String>) -> Self {
        Self {
            upstream,
            downstream,
            key,
        }
    }

    pub fn is_keyed(&self) -> bool {
        self.key.is_some()
    }

    fn same_as(&self, other: &Edge) -> bool {
        self.upstream.id() == other.upstream.id()
            && self.downstream.id() == other.downstream.id()
            && self.key == other.key
    }
}

/// A set of registrations applied to a flow as one unit
#[derive(Debug, Default)]
pub(crate) struct GraphChange {
    pub tasks: Vec<TaskRef>,
    pub edges: Vec<Edge>,
    pub literals: Vec<(TaskRef, String, Value)>,
}

#[derive(Default)]
struct GraphInner {
    tasks: Vec<TaskRef>,
    index: HashMap<TaskId, usize>,
    slugs: HashMap<String, TaskId>,
    edges: Vec<Edge>,
    literals: HashMap<TaskId, BTreeMap<String, Value>>,
}

impl GraphInner {
    fn contains(&self, id: TaskId) -> bool {
        self.index.contains_key(&id)
    }

    fn is_bound(&self, task: TaskId, key: &str) -> bool {
        self.literals
            .get(&task)
            .is_some_and(|literals| literals.contains_key(key))
            || self
                .edges
                .iter()
                .any(|edge| edge.downstream.id() == task && edge.key.as_deref() == Some(key))
    }

    fn dependency_map(&self) -> DiGraphMap<TaskId, ()> {
        let mut graph = DiGraphMap::new();
        for task in &self.tasks {
            graph.add_node(task.id());
        }
        for edge in &self.edges {
            graph.add_edge(edge.upstream.id(), edge.downstream.id(), ());
        }
        graph
    }
}

/// Shared handle to a flow
pub type FlowRef = Arc<FlowGraph>;

pub struct FlowGraph {
    name: String,
    inner: Mutex<GraphInner>,
}

impl FlowGraph {
    pub fn new(name: impl Into<String>) -> FlowRef {
        Arc::new(Self {
            name: name.into(),
            inner: Mutex::new(GraphInner::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make this flow the active flow until the guard is dropped
    pub fn activate(self: &Arc<Self>) -> ContextGuard {
        context::with_flow(Arc::clone(self))
    }

    /// Register a task node; registering the same task again is a no-op
    pub fn add_task(&self, task: &TaskRef) -> TaskflowResult<()> {
        self.commit(GraphChange {
            tasks: vec![Arc::clone(task)],
            ..GraphChange::default()
        })
    }

    /// Register an edge, adding both tasks when they are not yet part of the flow
    pub fn add_edge(
        &self,
        upstream: &TaskRef,
        downstream: &TaskRef,
        key: Option<&str>,
    ) -> TaskflowResult<()> {
        self.commit(GraphChange {
            tasks: vec![Arc::clone(upstream), Arc::clone(downstream)],
            edges: vec![Edge::new(
                Arc::clone(upstream),
                Arc::clone(downstream),
                key.map(str::to_string),
            )],
            ..GraphChange::default()
        })
    }

    pub fn has_slug(&self, slug: &str) -> bool {
        self.inner.lock().slugs.contains_key(slug)
    }

    pub fn contains(&self, task: &TaskRef) -> bool {
        self.inner.lock().contains(task.id())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().tasks.is_empty()
    }

    /// Tasks in registration order
    pub fn tasks(&self) -> Vec<TaskRef> {
        self.inner.lock().tasks.clone()
    }

    pub fn task(&self, id: TaskId) -> Option<TaskRef> {
        let inner = self.inner.lock();
        inner.index.get(&id).map(|&i| Arc::clone(&inner.tasks[i]))
    }

    pub fn task_by_slug(&self, slug: &str) -> Option<TaskRef> {
        let id = *self.inner.lock().slugs.get(slug)?;
        self.task(id)
    }

    /// First task registered under `name`
    pub fn task_by_name(&self, name: &str) -> Option<TaskRef> {
        self.inner
            .lock()
            .tasks
            .iter()
            .find(|task| task.name() == name)
            .cloned()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.inner.lock().edges.clone()
    }

    pub fn upstream_edges(&self, task: &TaskRef) -> Vec<Edge> {
        self.inner
            .lock()
            .edges
            .iter()
            .filter(|edge| edge.downstream.id() == task.id())
            .cloned()
            .collect()
    }

    pub fn downstream_edges(&self, task: &TaskRef) -> Vec<Edge> {
        self.inner
            .lock()
            .edges
            .iter()
            .filter(|edge| edge.upstream.id() == task.id())
            .cloned()
            .collect()
    }

    /// Literal arguments recorded for `task` at bind time
    pub fn literal_inputs(&self, task: &TaskRef) -> BTreeMap<String, Value> {
        self.inner
            .lock()
            .literals
            .get(&task.id())
            .cloned()
            .unwrap_or_default()
    }

    /// Tasks ordered so every task comes after all of its upstream tasks
    pub fn sorted_tasks(&self) -> TaskflowResult<Vec<TaskRef>> {
        let inner = self.inner.lock();
        let order = toposort(&inner.dependency_map(), None).map_err(|cycle| {
            let task = inner
                .index
                .get(&cycle.node_id())
                .map_or_else(|| cycle.node_id().to_string(), |&i| inner.tasks[i].name().to_string());
            GraphError::Cycle {
                flow: self.name.clone(),
                upstream: task.clone(),
                downstream: task,
            }
        })?;
        Ok(order
            .into_iter()
            .map(|id| Arc::clone(&inner.tasks[inner.index[&id]]))
            .collect())
    }

    /// Validate and apply a change in one critical section
    pub(crate) fn commit(&self, change: GraphChange) -> TaskflowResult<()> {
        let mut inner = self.inner.lock();
        let GraphChange {
            tasks,
            edges,
            literals,
        } = change;

        // Nodes: every task referenced by the change, once
        let mut new_tasks: Vec<TaskRef> = Vec::new();
        let mut new_ids = HashSet::new();
        let referenced = tasks
            .iter()
            .chain(edges.iter().flat_map(|edge| [&edge.upstream, &edge.downstream]))
            .chain(literals.iter().map(|(task, _, _)| task));
        for task in referenced {
            if !inner.contains(task.id()) && new_ids.insert(task.id()) {
                new_tasks.push(Arc::clone(task));
            }
        }

        let mut new_slugs = HashSet::new();
        for task in &new_tasks {
            if let Some(slug) = task.declaration().slug() {
                if inner.slugs.contains_key(slug) || !new_slugs.insert(slug) {
                    return Err(GraphError::DuplicateSlug {
                        flow: self.name.clone(),
                        slug: slug.to_string(),
                    }
                    .into());
                }
            }
        }

        // Edges: no self edges, no cycles, each argument bound at most once
        let mut dependencies = inner.dependency_map();
        for task in &new_tasks {
            dependencies.add_node(task.id());
        }
        let mut new_edges: Vec<Edge> = Vec::new();
        let mut new_keys: HashSet<(TaskId, &str)> = HashSet::new();
        for edge in &edges {
            if inner.edges.iter().chain(&new_edges).any(|e| e.same_as(edge)) {
                continue;
            }
            let (up, down) = (edge.upstream.id(), edge.downstream.id());
            if up == down || has_path_connecting(&dependencies, down, up, None) {
                return Err(self.cycle_error(edge));
            }
            if let Some(key) = edge.key.as_deref() {
                if inner.is_bound(down, key) || !new_keys.insert((down, key)) {
                    return Err(self.duplicate_binding(&edge.downstream, key));
                }
            }
            dependencies.add_edge(up, down, ());
            new_edges.push(edge.clone());
        }

        for (task, key, _) in &literals {
            if inner.is_bound(task.id(), key) || !new_keys.insert((task.id(), key.as_str())) {
                return Err(self.duplicate_binding(task, key));
            }
        }

        // Apply
        for task in new_tasks {
            let id = task.id();
            if let Some(slug) = task.declaration().slug() {
                inner.slugs.insert(slug.to_string(), id);
            }
            let position = inner.tasks.len();
            inner.index.insert(id, position);
            inner.tasks.push(task);
            debug!(flow = %self.name, task_id = %id, "Task registered");
        }
        for edge in new_edges {
            debug!(
                flow = %self.name,
                upstream = edge.upstream.name(),
                downstream = edge.downstream.name(),
                key = edge.key.as_deref(),
                "Edge registered"
            );
            inner.edges.push(edge);
        }
        for (task, key, value) in literals {
            inner.literals.entry(task.id()).or_default().insert(key, value);
        }

        Ok(())
    }

    fn cycle_error(&self, edge: &Edge) -> TaskflowError {
        GraphError::Cycle {
            flow: self.name.clone(),
            upstream: edge.upstream.name().to_string(),
            downstream: edge.downstream.name().to_string(),
        }
        .into()
    }

    fn duplicate_binding(&self, task: &TaskRef, key: &str) -> TaskflowError {
        GraphError::DuplicateBinding {
            flow: self.name.clone(),
            task: task.name().to_string(),
            key: key.to_string(),
        }
        .into()
    }
}

impl fmt::Debug for FlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("FlowGraph")
            .field("name", &self.name)
            .field("tasks", &inner.tasks.len())
            .field("edges", &inner.edges.len())
            .finish()
    }
}
