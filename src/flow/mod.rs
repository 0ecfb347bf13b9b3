//! Flows: the task graph, call-style binding into it, and a local runner.

pub mod binder;
pub mod graph;
pub mod runner;

pub use binder::{resolve_arguments, BindValue, CallArgs};
pub use graph::{Edge, FlowGraph, FlowRef};
pub use runner::{FlowRunReport, FlowRunner};
