//! # Ambient Context
//!
//! Scoped, stack-based state consulted while declaring tasks: the active flow, the
//! current group, the current tag set, the current parameter mapping and the
//! "was waiting" marker.
//!
//! The stack is thread-local. Entering a scope returns a [`ContextGuard`]; dropping
//! the guard pops the scope, so every exit path unwinds it, including `?` returns
//! and panics. Guards are `!Send` so a scope cannot leak onto another thread.
//!
//! Execution does not read the ambient stack from inside entrypoints: the runner
//! captures what it needs once and passes an explicit `RunContext` to each task.
//!
//! ```rust
//! use taskflow_core::context;
//! use taskflow_core::flow::FlowGraph;
//!
//! let flow = FlowGraph::new("etl");
//! {
//!     let _flow_scope = flow.activate();
//!     let _group_scope = context::with_group("extract");
//!     assert_eq!(context::current().group.as_deref(), Some("extract"));
//!     assert!(context::current_flow().is_some());
//! }
//! assert!(context::current_flow().is_none());
//! ```

use crate::flow::FlowRef;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;

/// One scope on the ambient context stack
#[derive(Debug, Clone, Default)]
pub struct ContextFrame {
    pub flow: Option<FlowRef>,
    pub group: Option<String>,
    pub tags: BTreeSet<String>,
    pub parameters: BTreeMap<String, Value>,
    pub is_waiting: bool,
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextFrame>> = const { RefCell::new(Vec::new()) };
}

/// Pops its scope from the ambient stack when dropped
#[must_use = "the context scope ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ContextGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().truncate(self.depth));
    }
}

/// Push a complete frame
pub fn enter(frame: ContextFrame) -> ContextGuard {
    CONTEXT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let depth = stack.len();
        stack.push(frame);
        ContextGuard {
            depth,
            _not_send: PhantomData,
        }
    })
}

/// Snapshot of the innermost frame, or an empty frame outside any scope
pub fn current() -> ContextFrame {
    CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_default())
}

pub fn current_flow() -> Option<FlowRef> {
    CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|frame| frame.flow.clone()))
}

/// Nest a scope that makes `flow` the active flow
pub fn with_flow(flow: FlowRef) -> ContextGuard {
    let mut frame = current();
    frame.flow = Some(flow);
    enter(frame)
}

/// Nest a scope with a new group label
pub fn with_group(group: impl Into<String>) -> ContextGuard {
    let mut frame = current();
    frame.group = Some(group.into());
    enter(frame)
}

/// Nest a scope whose tags are the current tags plus `tags`
pub fn with_tags<I, S>(tags: I) -> ContextGuard
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut frame = current();
    frame.tags.extend(tags.into_iter().map(Into::into));
    enter(frame)
}

/// Nest a scope carrying flow parameters
pub fn with_parameters(parameters: BTreeMap<String, Value>) -> ContextGuard {
    let mut frame = current();
    frame.parameters = parameters;
    enter(frame)
}

/// Nest a scope carrying the "was waiting" marker
pub fn with_waiting(is_waiting: bool) -> ContextGuard {
    let mut frame = current();
    frame.is_waiting = is_waiting;
    enter(frame)
}
