//! Closure-backed tasks.
//!
//! [`FnTask`] adapts an async closure into a [`Task`] with an explicitly declared
//! signature, for tasks that carry no state of their own.

use super::{Task, TaskArguments, TaskOutcome, TaskSignature};
use crate::state_machine::RunContext;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;

pub struct FnTask<F> {
    name: String,
    signature: TaskSignature,
    func: F,
}

impl<F, Fut> FnTask<F>
where
    F: Fn(RunContext, TaskArguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<TaskOutcome>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, signature: TaskSignature, func: F) -> Self {
        Self {
            name: name.into(),
            signature,
            func,
        }
    }
}

impl<F> fmt::Debug for FnTask<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(RunContext, TaskArguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<TaskOutcome>> + Send + 'static,
{
    fn signature(&self) -> TaskSignature {
        self.signature.clone()
    }

    fn default_name(&self) -> String {
        self.name.clone()
    }

    async fn run(&self, ctx: &RunContext, args: &TaskArguments) -> anyhow::Result<TaskOutcome> {
        (self.func)(ctx.clone(), args.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{DeclaredTask, TaskOptions};
    use serde_json::json;

    #[tokio::test]
    async fn test_closure_receives_arguments() {
        let task = FnTask::new("double", TaskSignature::positional(["x"]), |_ctx, args| async move {
            let x = args.require_i64("x")?;
            Ok(TaskOutcome::value(json!(x * 2)))
        });
        let args: TaskArguments = [("x", json!(21))].into_iter().collect();
        let outcome = task.run(&RunContext::default(), &args).await.unwrap();
        assert_eq!(outcome, TaskOutcome::value(json!(42)));
    }

    #[test]
    fn test_declared_name_comes_from_closure_task() {
        let task = FnTask::new("noop", TaskSignature::empty(), |_ctx, _args| async {
            Ok(TaskOutcome::empty())
        });
        let declared = DeclaredTask::declare(task, TaskOptions::new()).unwrap();
        assert_eq!(declared.name(), "noop");
        assert_eq!(declared.inputs(), Vec::<String>::new());
    }
}
