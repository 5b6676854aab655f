//! Turn event stream types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Message, ToolCall, ToolResult};

use super::types::{Interrupt, Phase};

/// Concrete event payloads emitted by the executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEventPayload {
    TurnStarted {
        resumed: bool,
    },
    ModelCall {
        model: String,
        iteration: usize,
    },
    AssistantDelta {
        text: String,
    },
    AssistantMessage {
        message: Message,
    },
    ToolStarted {
        call: ToolCall,
    },
    ToolProgress {
        tool_call_id: String,
        update: serde_json::Value,
    },
    ToolFinished {
        result: ToolResult,
    },
    InterruptRaised {
        interrupt: Interrupt,
    },
    CheckpointSaved {
        version: u64,
        phase: Phase,
    },
    Suspended {
        interrupts: usize,
    },
    Completed,
    Failed {
        error: String,
    },
}

/// Envelope for streamed turn events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnEvent {
    pub thread_id: String,
    /// Monotonic per executor, starting at 1.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: TurnEventPayload,
}

/// Receives every event the executor emits.
pub type TurnEventSink = Arc<dyn Fn(TurnEvent) + Send + Sync>;

pub(crate) struct TurnEventEmitter {
    seq: AtomicU64,
    sink: Option<TurnEventSink>,
}

impl TurnEventEmitter {
    pub(crate) fn new(sink: Option<TurnEventSink>) -> Self {
        Self {
            seq: AtomicU64::new(1),
            sink,
        }
    }

    pub(crate) fn sink(&self) -> Option<&TurnEventSink> {
        self.sink.as_ref()
    }

    pub(crate) fn emit(&self, thread_id: &str, payload: TurnEventPayload) {
        let Some(sink) = &self.sink else { return };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        (sink)(TurnEvent {
            thread_id: thread_id.to_string(),
            seq,
            timestamp: Utc::now(),
            payload,
        });
    }
}
