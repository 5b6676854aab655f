//! OpenAI-compatible Chat Completions and Embeddings clients.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Result, TurnstileError};
use crate::types::{
    FinishReason, Message, MessageChunk, ResponseFormat, Role, ToolCall, ToolCallChunk, ToolChoice,
};

use super::http::{bearer_headers, error_from_response, parse_sse_data, shared_client, SseLineBuffer};
use super::{Embedder, ModelCapabilities, ModelProvider, ProviderRequest};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat Completions client for OpenAI and API-compatible servers.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    model: String,
    api_key: String,
    base_url: String,
    capabilities: ModelCapabilities,
}

impl OpenAiProvider {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
            api_key: api_key.into(),
            capabilities: ModelCapabilities::full(128_000),
        }
    }

    /// Override advertised capabilities (e.g. for servers without JSON-schema support).
    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn build_request_body(&self, request: &ProviderRequest, stream: bool) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(prompt) = request.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            messages.push(json!({ "role": "system", "content": prompt }));
        }
        messages.extend(request.messages.iter().map(message_to_openai));

        let mut obj = serde_json::Map::new();
        obj.insert("model".into(), self.model.clone().into());
        obj.insert("messages".into(), messages.into());
        obj.insert("stream".into(), stream.into());

        let settings = &request.settings;
        if let Some(max) = settings.max_tokens {
            obj.insert("max_tokens".into(), max.into());
        }
        if let Some(temp) = settings.temperature {
            obj.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = settings.top_p {
            obj.insert("top_p".into(), top_p.into());
        }
        if let Some(ref stops) = settings.stop_sequences {
            obj.insert("stop".into(), json!(stops));
        }
        if let Some(seed) = settings.seed {
            obj.insert("seed".into(), seed.into());
        }
        if let Some(ref user) = settings.user {
            obj.insert("user".into(), user.clone().into());
        }

        if !request.tools.is_empty() {
            let tool_defs: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            obj.insert("tools".into(), tool_defs.into());
            obj.insert("tool_choice".into(), tool_choice_to_openai(&request.tool_choice));
        }

        match &request.response_format {
            Some(ResponseFormat::JsonObject) => {
                obj.insert("response_format".into(), json!({ "type": "json_object" }));
            }
            Some(ResponseFormat::JsonSchema { schema, name }) => {
                obj.insert(
                    "response_format".into(),
                    json!({
                        "type": "json_schema",
                        "json_schema": { "name": name, "schema": schema, "strict": true },
                    }),
                );
            }
            Some(ResponseFormat::Text) | None => {}
        }

        Value::Object(obj)
    }

    async fn post(&self, request: &ProviderRequest, stream: bool) -> Result<reqwest::Response> {
        let body = self.build_request_body(request, stream);
        let url = format!("{}/chat/completions", self.base_url);
        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(resp)
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }

    async fn invoke(&self, request: &ProviderRequest) -> Result<Message> {
        debug!(model = %self.model, messages = request.messages.len(), "OpenAI invoke");
        let resp = self.post(request, false).await?;
        let data: ChatResponse = resp.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TurnstileError::provider("openai", "No choices in response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let arguments = serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(Value::String(tc.function.arguments));
                ToolCall::new(tc.id, tc.function.name, arguments)
            })
            .collect();

        Ok(Message::assistant_with_tool_calls(
            choice.message.content.unwrap_or_default(),
            tool_calls,
        ))
    }

    async fn stream(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<MessageChunk>>> {
        debug!(model = %self.model, messages = request.messages.len(), "OpenAI stream");
        let resp = self.post(request, true).await?;
        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut lines = SseLineBuffer::default();
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        yield Err(TurnstileError::Network(e));
                        break;
                    }
                };
                lines.extend(&bytes);

                while let Some(line) = lines.next_line() {
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(data) = parse_sse_data(&line) else {
                        continue;
                    };
                    match serde_json::from_str::<StreamChunk>(data) {
                        Ok(parsed) => {
                            if let Some(chunk) = stream_chunk_to_message_chunk(parsed) {
                                yield Ok(chunk);
                            }
                        }
                        Err(err) => debug!(error = %err, "skipping unparseable SSE chunk"),
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// OpenAI `/embeddings` client.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, inputs = texts.len(), "OpenAI embed");
        let resp = shared_client()
            .post(format!("{}/embeddings", self.base_url))
            .headers(bearer_headers(&self.api_key))
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let mut data: EmbeddingResponse = resp.json().await?;
        data.data.sort_by_key(|item| item.index);
        Ok(data.data.into_iter().map(|item| item.embedding).collect())
    }
}

fn tool_choice_to_openai(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Required => json!("required"),
        ToolChoice::None => json!("none"),
        ToolChoice::Function(name) => json!({ "type": "function", "function": { "name": name } }),
    }
}

fn parse_finish_reason(s: &str) -> Option<FinishReason> {
    match s {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "tool_calls" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

fn message_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
            "content": msg.content,
        }),
        Role::Assistant if msg.has_tool_calls() => {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": { "name": tc.name, "arguments": tc.arguments.to_string() },
                    })
                })
                .collect();
            let content = if msg.content.is_empty() {
                Value::Null
            } else {
                Value::String(msg.content.clone())
            };
            json!({ "role": "assistant", "content": content, "tool_calls": calls })
        }
        role => json!({ "role": role.to_string(), "content": msg.content }),
    }
}

fn stream_chunk_to_message_chunk(chunk: StreamChunk) -> Option<MessageChunk> {
    let choice = chunk.choices.into_iter().next()?;
    let tool_calls = choice
        .delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let (name, arguments_delta) = match tc.function {
                Some(f) => (f.name, f.arguments.unwrap_or_default()),
                None => (None, String::new()),
            };
            ToolCallChunk {
                index: tc.index,
                id: tc.id,
                name,
                arguments_delta,
            }
        })
        .collect();
    Some(MessageChunk {
        text: choice.delta.content.unwrap_or_default(),
        tool_calls,
        finish_reason: choice.finish_reason.as_deref().and_then(parse_finish_reason),
    })
}

// OpenAI API response types (internal)

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatFunction,
}

#[derive(Deserialize)]
struct ChatFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Deserialize)]
struct StreamToolCall {
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}
