//! # Entrypoint Signatures
//!
//! Every concrete task type declares the ordered parameter list of its entrypoint
//! as a [`TaskSignature`]. Arguments are always bound by name, so a signature that
//! would accept variable positional arguments is rejected when the type is first
//! registered.
//!
//! Registration is memoized per concrete type (`TypeId`). A type whose first
//! declaration is rejected stays rejected; otherwise every declaration validates
//! and returns the signature of its own instance, so one type may back tasks with
//! different parameter lists (closure tasks built by a shared helper, for
//! example). Wrapping or composing a task type never inherits a registration.

use super::Task;
use crate::error::{TaskflowError, TaskflowResult};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error};

/// How an entrypoint parameter accepts its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// Bound by position or by name
    PositionalOrKeyword,
    /// Bound by name only
    KeywordOnly,
    /// Captures any extra positional arguments (never supported)
    VarPositional,
    /// Captures any extra keyword arguments
    VarKeyword,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    pub required: bool,
}

impl ParameterSpec {
    /// A required parameter that may be passed by position or by name
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::PositionalOrKeyword,
            required: true,
        }
    }

    /// A parameter with an entrypoint-side default
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::PositionalOrKeyword,
            required: false,
        }
    }

    pub fn keyword_only(name: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::KeywordOnly,
            required,
        }
    }

    pub fn var_keyword(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::VarKeyword,
            required: false,
        }
    }

    pub fn var_positional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::VarPositional,
            required: false,
        }
    }

    /// Whether this parameter can be matched by an explicit name
    pub fn is_named(&self) -> bool {
        matches!(
            self.kind,
            ParameterKind::PositionalOrKeyword | ParameterKind::KeywordOnly
        )
    }
}

/// Ordered parameter list of a task entrypoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSignature {
    parameters: Vec<ParameterSpec>,
}

impl TaskSignature {
    /// An entrypoint that takes no arguments
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(parameters: Vec<ParameterSpec>) -> Self {
        Self { parameters }
    }

    /// Shorthand for a signature made only of required positional-or-keyword parameters
    pub fn positional<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(ParameterSpec::required).collect())
    }

    #[must_use]
    pub fn with(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Parameter names in declaration order
    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn var_keyword(&self) -> Option<&ParameterSpec> {
        self.parameters
            .iter()
            .find(|p| p.kind == ParameterKind::VarKeyword)
    }

    /// Validate the signature for a task type, naming the type in any error
    pub fn validate(&self, type_name: &str) -> TaskflowResult<()> {
        if let Some(varargs) = self
            .parameters
            .iter()
            .find(|p| p.kind == ParameterKind::VarPositional)
        {
            return Err(definition_error(
                type_name,
                format!(
                    "Tasks with variable positional arguments (*{}) are not supported, \
                     because all arguments are bound by name. Accept variable keyword \
                     arguments instead.",
                    varargs.name
                ),
            ));
        }

        let mut seen = HashSet::new();
        for parameter in &self.parameters {
            if !seen.insert(parameter.name.as_str()) {
                return Err(definition_error(
                    type_name,
                    format!("Duplicate parameter name '{}'", parameter.name),
                ));
            }
        }

        let var_keyword_count = self
            .parameters
            .iter()
            .filter(|p| p.kind == ParameterKind::VarKeyword)
            .count();
        if var_keyword_count > 1 {
            return Err(definition_error(
                type_name,
                "At most one variable keyword parameter may be declared",
            ));
        }

        Ok(())
    }
}

fn definition_error(type_name: &str, reason: impl Into<String>) -> TaskflowError {
    TaskflowError::Definition {
        type_name: type_name.to_string(),
        reason: reason.into(),
    }
}

type Registration = TaskflowResult<()>;

fn registry() -> &'static DashMap<TypeId, Registration> {
    static REGISTRY: OnceLock<DashMap<TypeId, Registration>> = OnceLock::new();
    REGISTRY.get_or_init(DashMap::new)
}

/// Register a concrete task type and validate the signature of `task`.
///
/// A rejection on first registration is memoized by type identity, so every
/// later declaration of that type reports the same `Definition` error. Accepted
/// types still validate each instance's signature.
pub fn register_task_type<T: Task>(task: &T) -> TaskflowResult<Arc<TaskSignature>> {
    let type_id = TypeId::of::<T>();
    if let Some(Err(rejected)) = registry().get(&type_id).map(|entry| entry.value().clone()) {
        return Err(rejected);
    }

    let type_name = std::any::type_name::<T>();
    let signature = task.signature();
    let outcome = signature.validate(type_name);

    match &outcome {
        Ok(()) => debug!(
            task_type = type_name,
            inputs = ?signature.names(),
            "Registered task signature"
        ),
        Err(err) => error!(task_type = type_name, error = %err, "Rejected task signature"),
    }

    let first = registry()
        .entry(type_id)
        .or_insert_with(|| outcome.clone())
        .value()
        .clone();
    first.and(outcome).map(|()| Arc::new(signature))
}

/// Whether a task type has already been through registration
pub fn is_registered<T: Task>() -> bool {
    registry().contains_key(&TypeId::of::<T>())
}
