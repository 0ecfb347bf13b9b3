use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Named arguments handed to a task entrypoint.
///
/// Keyed upstream results and literal bindings are merged into one map before
/// the entrypoint runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskArguments(BTreeMap<String, Value>);

impl TaskArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Get an argument that must be present
    pub fn require(&self, name: &str) -> anyhow::Result<&Value> {
        self.0
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Missing argument '{name}'"))
    }

    /// Get an argument that must be present and an integer
    pub fn require_i64(&self, name: &str) -> anyhow::Result<i64> {
        self.require(name)?
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("Argument '{name}' is not an integer"))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Project onto a subset of names, skipping the ones that are absent
    pub fn subset(&self, names: &[String]) -> BTreeMap<String, Value> {
        names
            .iter()
            .filter_map(|name| self.0.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for TaskArguments {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for TaskArguments {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
