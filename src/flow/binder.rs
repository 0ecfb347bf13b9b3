//! # Dependency Binding
//!
//! Turns a call-style invocation of a declared task into graph registrations on the
//! active flow. Arguments are matched by name against the task's declared inputs;
//! task-valued arguments become keyed edges, everything else is stored as an inert
//! literal and passed through unchanged at run time. Entries captured by a
//! variable-keyword parameter are flattened into the same argument set.
//!
//! A binding either registers every node, edge and literal it resolves or none of
//! them.

use super::graph::{Edge, FlowRef, GraphChange};
use crate::context;
use crate::error::{argument_mismatch, ContextError, TaskflowResult};
use crate::task::{DeclaredTask, ParameterKind, TaskRef, TaskSignature};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// One argument of a task invocation
#[derive(Debug, Clone)]
pub enum BindValue {
    /// Result of another task, substituted at run time
    Task(TaskRef),
    /// Constant value passed through unchanged
    Literal(Value),
}

impl From<TaskRef> for BindValue {
    fn from(task: TaskRef) -> Self {
        Self::Task(task)
    }
}

impl From<&TaskRef> for BindValue {
    fn from(task: &TaskRef) -> Self {
        Self::Task(Arc::clone(task))
    }
}

impl From<Value> for BindValue {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

/// Positional arguments, keyword arguments and ordering-only upstream tasks of a call
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    positional: Vec<BindValue>,
    keyword: Vec<(String, BindValue)>,
    upstream: Vec<TaskRef>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn arg(mut self, value: impl Into<BindValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<BindValue>) -> Self {
        self.keyword.push((name.into(), value.into()));
        self
    }

    /// Add a task that must finish first without passing its result
    #[must_use]
    pub fn upstream(mut self, task: &TaskRef) -> Self {
        self.upstream.push(Arc::clone(task));
        self
    }
}

/// Match an invocation against a signature, by name.
///
/// Returns one value per bound argument name. Var-keyword entries appear under
/// their own names alongside the named parameters.
pub fn resolve_arguments(
    task_name: &str,
    signature: &TaskSignature,
    positional: Vec<BindValue>,
    keyword: Vec<(String, BindValue)>,
) -> TaskflowResult<BTreeMap<String, BindValue>> {
    let slots: Vec<&str> = signature
        .parameters()
        .iter()
        .filter(|p| p.kind == ParameterKind::PositionalOrKeyword)
        .map(|p| p.name.as_str())
        .collect();

    if positional.len() > slots.len() {
        return Err(argument_mismatch(
            task_name,
            format!(
                "takes {} positional argument(s) but {} were given",
                slots.len(),
                positional.len()
            ),
        ));
    }

    let mut bound: BTreeMap<String, BindValue> = slots
        .iter()
        .zip(positional)
        .map(|(name, value)| ((*name).to_string(), value))
        .collect();

    let accepts_extra = signature.var_keyword().is_some();
    for (name, value) in keyword {
        let named = signature.find(&name).is_some_and(|p| p.is_named());
        if !named && !accepts_extra {
            return Err(argument_mismatch(
                task_name,
                format!("got an unexpected keyword argument '{name}'"),
            ));
        }
        if bound.contains_key(&name) {
            return Err(argument_mismatch(
                task_name,
                format!("got multiple values for argument '{name}'"),
            ));
        }
        bound.insert(name, value);
    }

    let missing: Vec<&str> = signature
        .parameters()
        .iter()
        .filter(|p| p.is_named() && p.required && !bound.contains_key(&p.name))
        .map(|p| p.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(argument_mismatch(
            task_name,
            format!("missing required argument(s): {}", missing.join(", ")),
        ));
    }

    Ok(bound)
}

fn active_flow() -> TaskflowResult<FlowRef> {
    context::current_flow().ok_or_else(|| ContextError::NoActiveFlow.into())
}

impl DeclaredTask {
    /// Bind this task into the active flow.
    ///
    /// Fails with `ContextError::NoActiveFlow` outside a flow scope and with
    /// `BindingError::ArgumentMismatch` when the arguments do not fit the declared
    /// inputs; in both cases the flow is left unchanged.
    pub fn bind(self: &Arc<Self>, call: CallArgs) -> TaskflowResult<TaskRef> {
        let flow = active_flow()?;
        let CallArgs {
            positional,
            keyword,
            upstream,
        } = call;

        let arguments = resolve_arguments(self.name(), self.declaration().signature(), positional, keyword)?;

        let mut change = GraphChange {
            tasks: vec![Arc::clone(self)],
            ..GraphChange::default()
        };
        for (key, value) in arguments {
            match value {
                BindValue::Task(upstream) => {
                    change
                        .edges
                        .push(Edge::new(upstream, Arc::clone(self), Some(key)));
                }
                BindValue::Literal(value) => change.literals.push((Arc::clone(self), key, value)),
            }
        }
        for task in upstream {
            change.edges.push(Edge::new(task, Arc::clone(self), None));
        }

        let keyed = change.edges.iter().filter(|edge| edge.is_keyed()).count();
        let literals = change.literals.len();
        flow.commit(change)?;

        debug!(
            flow = flow.name(),
            task_name = self.name(),
            keyed_edges = keyed,
            literals = literals,
            "Task bound"
        );
        Ok(Arc::clone(self))
    }

    /// Register explicit dependencies of this task.
    ///
    /// Uses `flow` when given, the active flow otherwise. Keyword tasks become keyed
    /// edges and must name a declared input (or be captured by a variable-keyword
    /// parameter); upstream and downstream tasks become ordering-only edges.
    pub fn set_dependencies(
        self: &Arc<Self>,
        flow: Option<&FlowRef>,
        upstream_tasks: &[TaskRef],
        downstream_tasks: &[TaskRef],
        keyword_tasks: &[(String, TaskRef)],
    ) -> TaskflowResult<()> {
        let flow = match flow {
            Some(flow) => Arc::clone(flow),
            None => active_flow()?,
        };

        let signature = self.declaration().signature();
        let accepts_extra = signature.var_keyword().is_some();
        for (key, _) in keyword_tasks {
            let named = signature.find(key).is_some_and(|p| p.is_named());
            if !named && !accepts_extra {
                return Err(argument_mismatch(
                    self.name(),
                    format!("got an unexpected keyword argument '{key}'"),
                ));
            }
        }

        let mut change = GraphChange {
            tasks: vec![Arc::clone(self)],
            ..GraphChange::default()
        };
        change.edges.extend(
            upstream_tasks
                .iter()
                .map(|task| Edge::new(Arc::clone(task), Arc::clone(self), None)),
        );
        change.edges.extend(
            downstream_tasks
                .iter()
                .map(|task| Edge::new(Arc::clone(self), Arc::clone(task), None)),
        );
        change.edges.extend(keyword_tasks.iter().map(|(key, task)| {
            Edge::new(Arc::clone(task), Arc::clone(self), Some(key.clone()))
        }));

        flow.commit(change)
    }
}
