//! Persisted executor state keyed by thread id.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent_loop::{Interrupt, Phase};
use crate::error::Result;
use crate::types::{Message, ToolCall, ToolResult};

pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;

/// The tool batch of the last assistant message while it is being executed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingBatch {
    /// Calls in emission order.
    pub calls: Vec<ToolCall>,
    /// One slot per call; filled as calls complete.
    pub results: Vec<Option<ToolResult>>,
    /// Unresolved interrupts.
    #[serde(default)]
    pub interrupts: Vec<Interrupt>,
    /// Captured by the structured-output tool within this batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_response: Option<Value>,
}

impl PendingBatch {
    pub fn new(calls: Vec<ToolCall>) -> Self {
        let results = vec![None; calls.len()];
        Self {
            calls,
            results,
            interrupts: Vec::new(),
            structured_response: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.interrupts.is_empty() && self.results.iter().all(Option::is_some)
    }

    pub fn slot_of(&self, tool_call_id: &str) -> Option<usize> {
        self.calls.iter().position(|call| call.id == tool_call_id)
    }
}

/// Snapshot of one thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    /// Incremented by the store on every successful `put`; 0 before the
    /// first write.
    pub version: u64,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingBatch>,
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub runtime: Value,
    /// Model calls made in the current turn.
    #[serde(default)]
    pub iterations: usize,
    pub phase: Phase,
    /// Composed system prompt sent with the last model request. Recorded for
    /// inspection; each request recomposes it from the base prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            version: 0,
            messages: Vec::new(),
            pending: None,
            state: Map::new(),
            runtime: Value::Object(Map::new()),
            iterations: 0,
            phase: Phase::default(),
            system_prompt: None,
            structured_response: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Open interrupts of the pending batch.
    pub fn interrupts(&self) -> &[Interrupt] {
        self.pending
            .as_ref()
            .map(|batch| batch.interrupts.as_slice())
            .unwrap_or_default()
    }
}

/// Checkpoint backend. Writes are compare-and-swap on `version`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Store `checkpoint` if the stored version (0 when absent) equals
    /// `checkpoint.version`; otherwise fail with `VersionConflict`. Returns
    /// the stored copy with its version incremented.
    async fn put(&self, checkpoint: Checkpoint) -> Result<Checkpoint>;

    async fn delete(&self, thread_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_completion_requires_all_slots_and_no_interrupts() {
        let mut batch = PendingBatch::new(vec![
            ToolCall::new("a", "x", json!({})),
            ToolCall::new("b", "y", json!({})),
        ]);
        assert!(!batch.is_complete());
        batch.results[0] = Some(ToolResult::success("a", "ok"));
        batch.results[1] = Some(ToolResult::success("b", "ok"));
        assert!(batch.is_complete());
        assert_eq!(batch.slot_of("b"), Some(1));
    }
}
