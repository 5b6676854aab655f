//! Streaming types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::generation::FinishReason;
use super::message::{Message, ToolCall};

/// A delta emitted by a streaming provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageChunk {
    /// Incremental text.
    #[serde(default)]
    pub text: String,
    /// Partial tool calls keyed by their position in the assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallChunk>,
    /// Finish reason (only on the final delta).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl MessageChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Turn a complete message into a single chunk.
    pub fn from_message(message: &Message) -> Self {
        let tool_calls = message
            .tool_calls
            .iter()
            .enumerate()
            .map(|(index, call)| ToolCallChunk {
                index,
                id: Some(call.id.clone()),
                name: Some(call.name.clone()),
                arguments_delta: call.arguments.to_string(),
            })
            .collect::<Vec<_>>();
        let finish_reason = if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };
        Self {
            text: message.content.clone(),
            tool_calls,
            finish_reason: Some(finish_reason),
        }
    }
}

/// A fragment of a tool call. Only the first fragment for an index carries
/// `id` and `name`; arguments arrive as concatenable JSON text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolCallChunk {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments_delta: String,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds [`MessageChunk`]s into a complete assistant [`Message`].
#[derive(Debug, Default)]
pub struct MessageAccumulator {
    text: String,
    calls: BTreeMap<usize, PartialToolCall>,
    finish_reason: Option<FinishReason>,
}

impl MessageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &MessageChunk) {
        self.text.push_str(&chunk.text);
        for delta in &chunk.tool_calls {
            let entry = self.calls.entry(delta.index).or_default();
            if let Some(id) = &delta.id {
                entry.id.clone_from(id);
            }
            if let Some(name) = &delta.name {
                entry.name.push_str(name);
            }
            entry.arguments.push_str(&delta.arguments_delta);
        }
        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason;
        }
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    /// Build the final message. Argument text that does not parse as JSON is
    /// kept as a JSON string so validation reports it instead of panicking.
    pub fn finish(self) -> Message {
        let tool_calls = self
            .calls
            .into_values()
            .map(|partial| {
                let arguments = if partial.arguments.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(&partial.arguments)
                        .unwrap_or(serde_json::Value::String(partial.arguments))
                };
                ToolCall::new(partial.id, partial.name, arguments)
            })
            .collect();
        Message::assistant_with_tool_calls(self.text, tool_calls)
    }
}
