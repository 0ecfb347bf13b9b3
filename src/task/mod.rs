//! # Tasks
//!
//! A task is a concrete type implementing [`Task`]: it states the ordered
//! parameters of its entrypoint and runs with named arguments. Declaring a task
//! registers its type (validating the signature once per type), resolves its
//! [`TaskDeclaration`] from options and the ambient context, and yields a shared
//! [`TaskRef`] that flows bind and run.

pub mod arguments;
pub mod declaration;
pub mod function;
pub mod outcome;
pub mod parameter;
pub mod signature;

pub use arguments::TaskArguments;
pub use declaration::{
    CachePolicy, ParameterInfo, RetryPolicy, TaskDeclaration, TaskOptions, TaskSnapshot,
};
pub use function::FnTask;
pub use outcome::TaskOutcome;
pub use parameter::ParameterTask;
pub use signature::{register_task_type, ParameterKind, ParameterSpec, TaskSignature};

use crate::error::TaskflowResult;
use crate::state_machine::RunContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// Identity of one declared task instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A unit of work with a statically declared entrypoint signature
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Ordered parameters the entrypoint accepts
    fn signature(&self) -> TaskSignature;

    /// Name used when no explicit name is configured
    fn default_name(&self) -> String {
        short_type_name(std::any::type_name::<Self>()).to_string()
    }

    /// Entrypoint.
    ///
    /// Plain results are returned as [`TaskOutcome::Return`]; explicit outcomes
    /// (`Success`, `Fail`, `Wait`) are interpreted by the state machine. Any error is
    /// folded into a failed, retry-eligible attempt.
    async fn run(&self, ctx: &RunContext, args: &TaskArguments) -> anyhow::Result<TaskOutcome>;
}

/// Last path segment of a type name, ignoring generic arguments
pub fn short_type_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

/// A task paired with its resolved declaration
pub struct DeclaredTask {
    id: TaskId,
    declaration: TaskDeclaration,
    entrypoint: Arc<dyn Task>,
}

/// Shared handle to a declared task, compared by identity
pub type TaskRef = Arc<DeclaredTask>;

impl DeclaredTask {
    /// Register the task's type and declare an instance of it
    pub fn declare<T: Task>(task: T, options: TaskOptions) -> TaskflowResult<TaskRef> {
        let declaration = Self::declaration_for(&task, options)?;
        Ok(Self::from_parts(declaration, Arc::new(task)))
    }

    pub(crate) fn declaration_for<T: Task>(
        task: &T,
        options: TaskOptions,
    ) -> TaskflowResult<TaskDeclaration> {
        let signature = register_task_type(task)?;
        Ok(TaskDeclaration::build(
            std::any::type_name::<T>(),
            task.default_name(),
            signature,
            options,
        ))
    }

    pub(crate) fn from_parts(declaration: TaskDeclaration, entrypoint: Arc<dyn Task>) -> TaskRef {
        Arc::new(Self {
            id: TaskId::new(),
            declaration,
            entrypoint,
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.declaration.name()
    }

    pub fn declaration(&self) -> &TaskDeclaration {
        &self.declaration
    }

    pub fn inputs(&self) -> Vec<String> {
        self.declaration.inputs()
    }

    /// Key under which results of this task are cached within `flow_name`.
    ///
    /// Slugs are unique within a flow and stable across processes; a task without
    /// one is keyed by its instance id.
    pub fn cache_key(&self, flow_name: &str) -> String {
        match self.declaration.slug() {
            Some(slug) => format!("{flow_name}/{slug}"),
            None => format!("{flow_name}/{}#{}", self.name(), self.id),
        }
    }

    pub(crate) fn entrypoint(&self) -> Arc<dyn Task> {
        Arc::clone(&self.entrypoint)
    }
}

impl fmt::Debug for DeclaredTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclaredTask")
            .field("id", &self.id)
            .field("name", &self.declaration.name())
            .field("slug", &self.declaration.slug())
            .finish()
    }
}

impl PartialEq for DeclaredTask {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DeclaredTask {}

impl Hash for DeclaredTask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
