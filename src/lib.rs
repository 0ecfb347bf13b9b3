#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Taskflow Core
//!
//! Task declarations, dependency binding and per-task execution state machines for
//! dataflow pipelines.
//!
//! ## Overview
//!
//! A flow is a directed acyclic graph of tasks. Each task is a concrete type that
//! declares the ordered parameters of its entrypoint, plus an execution policy:
//! retries, timeout, trigger, skip behavior and result caching. Calling a declared
//! task inside an active flow binds it into the graph; task-valued arguments become
//! keyed edges that carry upstream results, and everything else is passed through
//! as a literal.
//!
//! At run time every task is driven from `Pending` to a terminal state by its own
//! state machine, which interprets the entrypoint's outcome (a plain return, or one
//! of the `Success`, `Fail` and `Wait` signals) and schedules retries on the tokio
//! runtime.
//!
//! ## Module Organization
//!
//! - [`task`] - Task trait, declarations, signatures and parameters
//! - [`flow`] - Flow graph, dependency binding and the local flow runner
//! - [`state_machine`] - Per-task execution states and the task runner
//! - [`triggers`] - Built-in and custom triggers over upstream states
//! - [`cache`] - Cache validators and the cache store seam
//! - [`context`] - Scoped ambient context used while declaring flows
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use taskflow_core::flow::{CallArgs, FlowGraph, FlowRunner};
//! use taskflow_core::task::{DeclaredTask, FnTask, ParameterTask, TaskOptions, TaskOutcome, TaskSignature};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let flow = FlowGraph::new("doubling");
//! let double = DeclaredTask::declare(
//!     FnTask::new("double", TaskSignature::positional(["x"]), |_ctx, args| async move {
//!         Ok(TaskOutcome::value(json!(args.require_i64("x")? * 2)))
//!     }),
//!     TaskOptions::new(),
//! )?;
//! {
//!     let _active = flow.activate();
//!     let x = ParameterTask::new("x").declare()?;
//!     double.bind(CallArgs::new().arg(&x))?;
//! }
//!
//! let report = FlowRunner::new(flow)
//!     .run([("x".to_string(), json!(5))].into())
//!     .await?;
//! assert_eq!(report.state_of(&double).and_then(|s| s.result()), Some(&json!(10)));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod flow;
pub mod logging;
pub mod state_machine;
pub mod task;
pub mod triggers;
pub mod utils;

pub use crate::config::{ConfigManager, EngineConfig, TaskflowConfig};
pub use error::{TaskflowError, TaskflowResult};
pub use flow::{CallArgs, FlowGraph, FlowRef, FlowRunReport, FlowRunner};
pub use logging::init_structured_logging;
pub use state_machine::{RunContext, TaskRunner, TaskState};
pub use task::{
    DeclaredTask, FnTask, ParameterTask, Task, TaskArguments, TaskId, TaskOptions, TaskOutcome,
    TaskRef, TaskSignature,
};
pub use triggers::Trigger;
