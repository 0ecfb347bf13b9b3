//! # Task Declarations
//!
//! A [`TaskDeclaration`] is the identity and execution policy of a unit of work:
//! name, slug, description, group, tags, retry policy, timeout, trigger, skip
//! behavior and cache policy. Policy fields are fixed at construction; only the
//! identity of an unlocked declaration may be adjusted before it is shared.
//!
//! Declarations are built from [`TaskOptions`]. Unset options fall back to the
//! ambient context (group, tags) and to the crate's immutable defaults (retry
//! delay, max retries, trigger, skip behavior).

use super::signature::TaskSignature;
use crate::cache::validators::{self, CacheValidator};
use crate::constants::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};
use crate::context;
use crate::error::{TaskflowError, TaskflowResult};
use crate::triggers::{self, Trigger};
use crate::utils::serde::{duration_seconds, option_duration_seconds};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(with = "duration_seconds")]
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Whether a failure on the given 1-based attempt may be retried
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }
}

#[derive(Debug, Clone)]
pub struct CachePolicy {
    cache_for: Option<Duration>,
    validator: CacheValidator,
}

impl CachePolicy {
    /// Resolve the effective policy.
    ///
    /// Without `cache_for` nothing is cached: a supplied validator is reported and
    /// replaced by `never_use`. With `cache_for` and no validator, `duration_only`
    /// applies.
    fn resolve(
        task_name: &str,
        cache_for: Option<Duration>,
        validator: Option<CacheValidator>,
    ) -> Self {
        match (cache_for, validator) {
            (None, Some(validator)) => {
                warn!(
                    task_name = task_name,
                    cache_validator = validator.name(),
                    "cache_validator provided without specifying cache expiration (cache_for); this task will not be cached"
                );
                Self {
                    cache_for: None,
                    validator: validators::never_use(),
                }
            }
            (None, None) => Self {
                cache_for: None,
                validator: validators::never_use(),
            },
            (Some(cache_for), validator) => Self {
                cache_for: Some(cache_for),
                validator: validator.unwrap_or_else(validators::duration_only),
            },
        }
    }

    pub fn cache_for(&self) -> Option<Duration> {
        self.cache_for
    }

    pub fn validator(&self) -> &CacheValidator {
        &self.validator
    }

    pub fn is_enabled(&self) -> bool {
        self.cache_for.is_some()
    }
}

/// Extra identity carried by parameter declarations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub required: bool,
    pub default: Option<Value>,
}

/// Builder-style options for a task declaration
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    name: Option<String>,
    slug: Option<String>,
    description: Option<String>,
    group: Option<String>,
    tags: Option<BTreeSet<String>>,
    max_retries: Option<u32>,
    retry_delay: Option<Duration>,
    timeout: Option<Duration>,
    trigger: Option<Trigger>,
    skip_on_upstream_skip: Option<bool>,
    cache_for: Option<Duration>,
    cache_validator: Option<CacheValidator>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Explicit tags, unioned with the ambient tags at construction
    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Tags from untyped input (configuration, transport payloads).
    ///
    /// Only an array of strings is accepted. A bare string is rejected rather than
    /// being read as a collection of characters or as a single tag.
    pub fn tags_from_json(self, tags: Value) -> TaskflowResult<Self> {
        match tags {
            Value::Null => Ok(self),
            Value::String(tag) => Err(TaskflowError::InvalidTags(format!(
                "Tags should be a set of tags, not a string: \"{tag}\""
            ))),
            Value::Array(items) => {
                let mut tags = BTreeSet::new();
                for item in items {
                    match item {
                        Value::String(tag) => {
                            tags.insert(tag);
                        }
                        other => {
                            return Err(TaskflowError::InvalidTags(format!(
                                "Every tag must be a string, found {other}"
                            )))
                        }
                    }
                }
                Ok(self.tags(tags))
            }
            other => Err(TaskflowError::InvalidTags(format!(
                "Tags should be a set of tags, found {other}"
            ))),
        }
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = Some(retry_delay);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    #[must_use]
    pub fn skip_on_upstream_skip(mut self, skip: bool) -> Self {
        self.skip_on_upstream_skip = Some(skip);
        self
    }

    #[must_use]
    pub fn cache_for(mut self, cache_for: Duration) -> Self {
        self.cache_for = Some(cache_for);
        self
    }

    #[must_use]
    pub fn cache_validator(mut self, validator: CacheValidator) -> Self {
        self.cache_validator = Some(validator);
        self
    }

    /// Fill retry and timeout options that are still unset
    #[must_use]
    pub fn with_defaults(
        mut self,
        max_retries: u32,
        retry_delay: Duration,
        timeout: Option<Duration>,
    ) -> Self {
        self.max_retries.get_or_insert(max_retries);
        self.retry_delay.get_or_insert(retry_delay);
        if self.timeout.is_none() {
            self.timeout = timeout;
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct TaskDeclaration {
    name: String,
    slug: Option<String>,
    description: Option<String>,
    group: String,
    tags: BTreeSet<String>,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    trigger: Trigger,
    skip_on_upstream_skip: bool,
    cache: CachePolicy,
    signature: Arc<TaskSignature>,
    type_name: &'static str,
    parameter: Option<ParameterInfo>,
    identity_locked: bool,
}

impl TaskDeclaration {
    /// Build a declaration for a registered task type
    pub fn build(
        type_name: &'static str,
        default_name: String,
        signature: Arc<TaskSignature>,
        options: TaskOptions,
    ) -> Self {
        let ambient = context::current();
        let name = options.name.unwrap_or(default_name);

        let group = options.group.or(ambient.group).unwrap_or_default();

        let mut tags = ambient.tags;
        tags.extend(options.tags.unwrap_or_default());

        let cache = CachePolicy::resolve(&name, options.cache_for, options.cache_validator);

        Self {
            slug: options.slug,
            description: options.description,
            group,
            tags,
            retry: RetryPolicy {
                max_retries: options.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
                retry_delay: options.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
            },
            timeout: options.timeout,
            trigger: options.trigger.unwrap_or_else(triggers::all_successful),
            skip_on_upstream_skip: options.skip_on_upstream_skip.unwrap_or(true),
            cache,
            signature,
            type_name,
            parameter: None,
            identity_locked: false,
            name,
        }
    }

    /// Bind the slug to the name permanently and attach parameter details
    pub(crate) fn into_parameter(mut self, info: ParameterInfo) -> Self {
        self.slug = Some(self.name.clone());
        self.parameter = Some(info);
        self.identity_locked = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> TaskflowResult<()> {
        if self.identity_locked {
            return Err(TaskflowError::ImmutableField {
                field: "name",
                reason: "Parameter name can not be changed".to_string(),
            });
        }
        self.name = name.into();
        Ok(())
    }

    pub fn set_slug(&mut self, slug: impl Into<String>) -> TaskflowResult<()> {
        let slug = slug.into();
        if self.identity_locked {
            if slug != self.name {
                return Err(TaskflowError::ImmutableField {
                    field: "slug",
                    reason: "Parameter slug must be the same as its name".to_string(),
                });
            }
            return Ok(());
        }
        self.slug = Some(slug);
        Ok(())
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn max_retries(&self) -> u32 {
        self.retry.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry.retry_delay
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn skip_on_upstream_skip(&self) -> bool {
        self.skip_on_upstream_skip
    }

    pub fn cache_policy(&self) -> &CachePolicy {
        &self.cache
    }

    pub fn signature(&self) -> &TaskSignature {
        &self.signature
    }

    /// Qualified type identifier of the entrypoint
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn parameter_info(&self) -> Option<&ParameterInfo> {
        self.parameter.as_ref()
    }

    /// Ordered parameter names declared by the entrypoint
    pub fn inputs(&self) -> Vec<String> {
        self.signature.names()
    }

    /// Canonical snapshot of identity and policy, for inspection and transport only
    pub fn serialize(&self) -> TaskSnapshot {
        TaskSnapshot {
            name: self.name.clone(),
            slug: self.slug.clone(),
            description: self.description.clone(),
            group: self.group.clone(),
            tags: self.tags.clone(),
            type_name: self.type_name.to_string(),
            max_retries: self.retry.max_retries,
            retry_delay: self.retry.retry_delay,
            timeout: self.timeout,
            trigger: self.trigger.name().to_string(),
            skip_on_upstream_skip: self.skip_on_upstream_skip,
            cache_for: self.cache.cache_for,
            cache_validator: self.cache.validator.name().to_string(),
            parameter: self.parameter.clone(),
        }
    }
}

/// Fixed-key serialized form of a declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub group: String,
    pub tags: BTreeSet<String>,
    #[serde(rename = "type")]
    pub type_name: String,
    pub max_retries: u32,
    #[serde(with = "duration_seconds")]
    pub retry_delay: Duration,
    #[serde(with = "option_duration_seconds")]
    pub timeout: Option<Duration>,
    pub trigger: String,
    pub skip_on_upstream_skip: bool,
    #[serde(with = "option_duration_seconds")]
    pub cache_for: Option<Duration>,
    pub cache_validator: String,
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<ParameterInfo>,
}
