//! # Cache Store
//!
//! The cache store is an external key-value collaborator. The state machine reads
//! the most recent stored result for a task before running it and writes at most
//! once per successful attempt; synchronization of the store is the store's own
//! concern.

use crate::error::TaskflowResult;
use crate::task::TaskArguments;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A stored task result together with what it was computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub value: Value,
    pub cached_at: DateTime<Utc>,
    #[serde(default)]
    pub inputs: TaskArguments,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

impl CachedResult {
    pub fn new(value: Value, cached_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at,
            inputs: TaskArguments::default(),
            parameters: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_inputs(mut self, inputs: TaskArguments) -> Self {
        self.inputs = inputs;
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: BTreeMap<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Key-value storage for cached task results
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Most recent result stored under `key`
    async fn get(&self, key: &str) -> TaskflowResult<Option<CachedResult>>;

    /// Replace the result stored under `key`
    async fn put(&self, key: &str, entry: CachedResult) -> TaskflowResult<()>;
}

/// Process-local cache store backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, CachedResult>,
    writes: AtomicUsize,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes performed since creation
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> TaskflowResult<Option<CachedResult>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, entry: CachedResult) -> TaskflowResult<()> {
        self.entries.insert(key.to_string(), entry);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_replaces_previous_entry() {
        let store = InMemoryCacheStore::new();
        assert!(store.get("double").await.unwrap().is_none());

        store
            .put("double", CachedResult::new(json!(10), Utc::now()))
            .await
            .unwrap();
        store
            .put("double", CachedResult::new(json!(12), Utc::now()))
            .await
            .unwrap();

        let entry = store.get("double").await.unwrap().unwrap();
        assert_eq!(entry.value, json!(12));
        assert_eq!(store.len(), 1);
        assert_eq!(store.write_count(), 2);
    }
}
