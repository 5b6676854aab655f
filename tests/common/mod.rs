//! Shared test helpers and scripted provider.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use turnstile::agent_loop::{TurnEvent, TurnEventSink};
use turnstile::error::{Result, TurnstileError};
use turnstile::provider::{ModelCapabilities, ModelProvider, ProviderRequest};
use turnstile::tools::{FunctionTool, Tool, ToolOutput, ToolParameters};
use turnstile::types::{Message, MessageChunk, ToolCall};

/// A provider that replays queued replies and records every request.
pub struct ScriptedProvider {
    model_id: String,
    capabilities: ModelCapabilities,
    replies: Mutex<VecDeque<Result<Message>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            capabilities: ModelCapabilities::default(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Queue a plain text reply.
    pub fn reply(self, text: &str) -> Self {
        self.push(Ok(Message::assistant(text)));
        self
    }

    /// Queue a reply requesting one tool call.
    pub fn tool_call(self, id: &str, name: &str, args: Value) -> Self {
        self.tool_calls(vec![ToolCall::new(id, name, args)])
    }

    /// Queue a reply requesting several tool calls in one batch.
    pub fn tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.push(Ok(Message::assistant_with_tool_calls("", calls)));
        self
    }

    /// Queue a failure.
    pub fn error(self, error: TurnstileError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, reply: Result<Message>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> ProviderRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("provider was never called")
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }

    async fn invoke(&self, request: &ProviderRequest) -> Result<Message> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Message::assistant("Mock response")))
    }

    async fn stream(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<MessageChunk>>> {
        let message = self.invoke(request).await?;
        let text: Vec<char> = message.content.chars().collect();
        let mut tail = MessageChunk::from_message(&message);
        tail.text.clear();
        let stream = async_stream::stream! {
            for piece in text.chunks(5) {
                yield Ok(MessageChunk::text(piece.iter().collect::<String>()));
            }
            yield Ok(tail);
        };
        Ok(Box::pin(stream))
    }
}

/// An event sink that collects events.
pub fn collecting_sink() -> (TurnEventSink, Arc<Mutex<Vec<TurnEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = Arc::clone(&events);
    let sink: TurnEventSink = Arc::new(move |event| sink_events.lock().unwrap().push(event));
    (sink, events)
}

/// A tool that echoes a `to`/`body` message and counts invocations.
pub fn send_message_tool(counter: Arc<Mutex<Vec<Value>>>) -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        "send_message",
        "Send a message to a contact",
        ToolParameters::object()
            .string("to", "Recipient", true)
            .string("body", "Message text", false)
            .default_value("body", serde_json::json!("hello"))
            .build(),
        move |args, _ctx| {
            let counter = Arc::clone(&counter);
            async move {
                counter.lock().unwrap().push(args.raw().clone());
                let to = args.get_str("to")?;
                Ok(ToolOutput::value(format!("sent to {to}")))
            }
        },
    ))
}

/// A tool that always succeeds with a fixed string.
pub fn static_tool(name: &str, output: &'static str) -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        name.to_string(),
        format!("Returns {output}"),
        ToolParameters::empty(),
        move |_args, _ctx| async move { Ok(ToolOutput::value(output)) },
    ))
}
