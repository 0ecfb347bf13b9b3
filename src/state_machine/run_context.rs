use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Explicit execution context handed to every entrypoint invocation.
///
/// The runner builds one per attempt; entrypoints never consult the ambient
/// declaration context.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub flow_name: String,
    pub task_name: String,
    pub task_slug: Option<String>,
    /// 1-based attempt number
    pub attempt: u32,
    pub max_retries: u32,
    pub parameters: Arc<BTreeMap<String, Value>>,
    /// Set when this task is being re-entered after it asked to wait
    pub is_waiting: bool,
    pub correlation_id: Uuid,
}

impl RunContext {
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }

    /// Context for the next attempt of the same task
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            is_waiting: false,
            ..self.clone()
        }
    }
}
