//! Shared helpers for integration tests
#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use taskflow_core::state_machine::RunContext;
use taskflow_core::task::{DeclaredTask, FnTask, TaskArguments, TaskOptions, TaskOutcome, TaskRef, TaskSignature};

/// Declare a closure-backed task
pub fn declare<F, Fut>(name: &str, signature: TaskSignature, options: TaskOptions, func: F) -> TaskRef
where
    F: Fn(RunContext, TaskArguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<TaskOutcome>> + Send + 'static,
{
    DeclaredTask::declare(FnTask::new(name, signature, func), options).expect("task declares")
}

/// `double(x) = x * 2`
pub fn double_task() -> TaskRef {
    declare("double", TaskSignature::positional(["x"]), TaskOptions::new(), |_ctx, args| async move {
        let x = args.require_i64("x")?;
        Ok(TaskOutcome::value(json!(x * 2)))
    })
}

/// A task returning `value` and counting its invocations
pub fn counting_task(name: &str, options: TaskOptions, value: Value) -> (TaskRef, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let task = declare(name, TaskSignature::empty(), options, move |_ctx, _args| {
        counter.fetch_add(1, Ordering::SeqCst);
        let value = value.clone();
        async move { Ok(TaskOutcome::value(value)) }
    });
    (task, calls)
}

pub fn params<const N: usize>(entries: [(&str, Value); N]) -> BTreeMap<String, Value> {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

pub fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
