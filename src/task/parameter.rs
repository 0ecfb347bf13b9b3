//! # Parameter Tasks
//!
//! A parameter is a task that surfaces one flow input. Its slug is bound to its
//! name when it is declared and neither can change afterwards. At run time it reads
//! the value from the run context, falling back to its default.

use super::{DeclaredTask, ParameterInfo, Task, TaskArguments, TaskDeclaration, TaskOptions};
use super::{TaskOutcome, TaskRef, TaskSignature};
use crate::error::TaskflowResult;
use crate::state_machine::RunContext;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ParameterTask {
    name: String,
    default: Option<Value>,
    required: bool,
}

impl ParameterTask {
    /// A required parameter with no default
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            required: true,
        }
    }

    /// Set a default; a non-null default makes the parameter optional
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        if !default.is_null() {
            self.required = false;
        }
        self.default = Some(default);
        self
    }

    /// Override whether the parameter is required; ignored once a non-null default is set
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        let has_default = self.default.as_ref().is_some_and(|v| !v.is_null());
        self.required = required && !has_default;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Resolve the declaration with the identity locked to the parameter name
    pub fn declaration(&self) -> TaskflowResult<TaskDeclaration> {
        self.declaration_with(TaskOptions::new())
    }

    fn declaration_with(&self, options: TaskOptions) -> TaskflowResult<TaskDeclaration> {
        let declaration = DeclaredTask::declaration_for(self, options.name(self.name.clone()))?;
        Ok(declaration.into_parameter(ParameterInfo {
            required: self.required,
            default: self.default.clone(),
        }))
    }

    /// Declare the parameter as a task
    pub fn declare(self) -> TaskflowResult<TaskRef> {
        self.declare_with(TaskOptions::new())
    }

    /// Declare with extra options (tags, description); name and slug always follow the parameter
    pub fn declare_with(self, options: TaskOptions) -> TaskflowResult<TaskRef> {
        let declaration = self.declaration_with(options)?;
        Ok(DeclaredTask::from_parts(declaration, Arc::new(self)))
    }
}

#[async_trait]
impl Task for ParameterTask {
    fn signature(&self) -> TaskSignature {
        TaskSignature::empty()
    }

    fn default_name(&self) -> String {
        self.name.clone()
    }

    async fn run(&self, ctx: &RunContext, _args: &TaskArguments) -> anyhow::Result<TaskOutcome> {
        match ctx.parameter(&self.name) {
            Some(value) => Ok(TaskOutcome::value(value.clone())),
            None if self.required => Ok(TaskOutcome::fail(format!(
                "Parameter \"{}\" was required but not provided.",
                self.name
            ))),
            None => {
                debug!(parameter = %self.name, "Parameter not supplied, using default");
                Ok(TaskOutcome::value(self.default.clone().unwrap_or(Value::Null)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskflowError;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn context_with(parameters: BTreeMap<String, Value>) -> RunContext {
        RunContext {
            parameters: Arc::new(parameters),
            ..RunContext::default()
        }
    }

    #[test]
    fn test_default_makes_parameter_optional() {
        assert!(ParameterTask::new("x").is_required());
        assert!(!ParameterTask::new("x").with_default(json!(3)).is_required());
        assert!(ParameterTask::new("x").with_default(Value::Null).is_required());
        assert!(!ParameterTask::new("x")
            .with_default(json!(3))
            .required(true)
            .is_required());
    }

    #[test]
    fn test_identity_is_locked() {
        let mut declaration = ParameterTask::new("x").declaration().unwrap();
        assert_eq!(declaration.name(), "x");
        assert_eq!(declaration.slug(), Some("x"));

        let err = declaration.set_name("y").unwrap_err();
        assert!(matches!(err, TaskflowError::ImmutableField { field: "name", .. }));

        let err = declaration.set_slug("y").unwrap_err();
        assert!(matches!(err, TaskflowError::ImmutableField { field: "slug", .. }));

        declaration.set_slug("x").unwrap();
        assert_eq!(declaration.slug(), Some("x"));
    }

    #[test]
    fn test_name_option_cannot_override_parameter_name() {
        let declaration = ParameterTask::new("x")
            .declaration_with(TaskOptions::new().name("other").tags(["input"]))
            .unwrap();
        assert_eq!(declaration.name(), "x");
        assert!(declaration.tags().contains("input"));
    }

    #[tokio::test]
    async fn test_run_reads_supplied_value() {
        let task = ParameterTask::new("x");
        let ctx = context_with([("x".to_string(), json!(5))].into());
        let outcome = task.run(&ctx, &TaskArguments::new()).await.unwrap();
        assert_eq!(outcome, TaskOutcome::value(json!(5)));
    }

    #[tokio::test]
    async fn test_run_missing_required_fails() {
        let task = ParameterTask::new("x");
        let outcome = task
            .run(&RunContext::default(), &TaskArguments::new())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TaskOutcome::fail("Parameter \"x\" was required but not provided.")
        );
    }

    #[tokio::test]
    async fn test_run_missing_optional_uses_default() {
        let task = ParameterTask::new("x").with_default(json!("fallback"));
        let outcome = task
            .run(&RunContext::default(), &TaskArguments::new())
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::value(json!("fallback")));
    }
}
