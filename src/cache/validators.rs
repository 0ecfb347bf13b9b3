//! # Cache Validators
//!
//! A cache validator decides whether a previously stored result may be reused
//! instead of running the task again. Validators are pure predicates over the
//! stored result, the current time, and a [`CacheContext`] describing the run that
//! is about to happen.

use super::store::CachedResult;
use crate::constants::cache_validators as names;
use crate::task::TaskArguments;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What the upcoming run would be computed from
#[derive(Debug, Clone, Copy)]
pub struct CacheContext<'a> {
    pub cache_for: Option<Duration>,
    pub inputs: &'a TaskArguments,
    pub parameters: &'a BTreeMap<String, Value>,
}

type ValidatorFn = dyn Fn(&CachedResult, DateTime<Utc>, &CacheContext<'_>) -> bool + Send + Sync;

#[derive(Clone)]
pub struct CacheValidator {
    name: Cow<'static, str>,
    predicate: Arc<ValidatorFn>,
}

impl CacheValidator {
    fn named<F>(name: Cow<'static, str>, predicate: F) -> Self
    where
        F: Fn(&CachedResult, DateTime<Utc>, &CacheContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            name,
            predicate: Arc::new(predicate),
        }
    }

    /// A user-supplied validator; it may inspect the context but must not mutate anything
    pub fn custom<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&CachedResult, DateTime<Utc>, &CacheContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self::named(Cow::Owned(name.into()), predicate)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_valid(
        &self,
        previous: &CachedResult,
        now: DateTime<Utc>,
        context: &CacheContext<'_>,
    ) -> bool {
        (self.predicate)(previous, now, context)
    }
}

impl fmt::Debug for CacheValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheValidator")
            .field("name", &self.name)
            .finish()
    }
}

fn within_expiration(previous: &CachedResult, now: DateTime<Utc>, cache_for: Option<Duration>) -> bool {
    let Some(cache_for) = cache_for else {
        return false;
    };
    match chrono::Duration::from_std(cache_for) {
        Ok(limit) => now.signed_duration_since(previous.cached_at) <= limit,
        Err(_) => true,
    }
}

/// Never reuse a stored result
pub fn never_use() -> CacheValidator {
    CacheValidator::named(Cow::Borrowed(names::NEVER_USE), |_, _, _| false)
}

/// Reuse while the stored result is younger than `cache_for`
pub fn duration_only() -> CacheValidator {
    CacheValidator::named(Cow::Borrowed(names::DURATION_ONLY), |previous, now, ctx| {
        within_expiration(previous, now, ctx.cache_for)
    })
}

/// Reuse while unexpired and computed from identical inputs
pub fn all_inputs() -> CacheValidator {
    CacheValidator::named(Cow::Borrowed(names::ALL_INPUTS), |previous, now, ctx| {
        within_expiration(previous, now, ctx.cache_for) && &previous.inputs == ctx.inputs
    })
}

/// Reuse while unexpired and computed under identical flow parameters
pub fn all_parameters() -> CacheValidator {
    CacheValidator::named(Cow::Borrowed(names::ALL_PARAMETERS), |previous, now, ctx| {
        within_expiration(previous, now, ctx.cache_for) && &previous.parameters == ctx.parameters
    })
}

/// Reuse while unexpired and the named flow parameters are unchanged
pub fn partial_parameters_only<I, S>(validate_on: I) -> CacheValidator
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let keys: Vec<String> = validate_on.into_iter().map(Into::into).collect();
    CacheValidator::named(
        Cow::Borrowed(names::PARTIAL_PARAMETERS_ONLY),
        move |previous, now, ctx| {
            within_expiration(previous, now, ctx.cache_for)
                && keys
                    .iter()
                    .all(|key| previous.parameters.get(key) == ctx.parameters.get(key))
        },
    )
}

/// Reuse while unexpired and the named inputs are unchanged
pub fn partial_inputs_only<I, S>(validate_on: I) -> CacheValidator
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let keys: Vec<String> = validate_on.into_iter().map(Into::into).collect();
    CacheValidator::named(
        Cow::Borrowed(names::PARTIAL_INPUTS_ONLY),
        move |previous, now, ctx| {
            within_expiration(previous, now, ctx.cache_for)
                && previous.inputs.subset(&keys) == ctx.inputs.subset(&keys)
        },
    )
}
