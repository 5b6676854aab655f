//! Model provider seam, model routing, and the OpenAI-compatible client.

pub mod capabilities;
pub mod http;
pub mod router;

#[cfg(feature = "openai")]
pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{GenerationSettings, Message, MessageChunk, ResponseFormat, ToolChoice};

pub use capabilities::ModelCapabilities;
pub use router::ModelRouter;

/// A request sent to a model provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderRequest {
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    pub response_format: Option<ResponseFormat>,
    pub settings: GenerationSettings,
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Core trait implemented by model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "openai").
    fn provider_name(&self) -> &str;
    /// The model ID this provider instance serves.
    fn model_id(&self) -> &str;

    fn capabilities(&self) -> &ModelCapabilities;

    /// Produce one assistant message.
    async fn invoke(&self, request: &ProviderRequest) -> Result<Message>;

    /// Stream an assistant message. Defaults to a single chunk from `invoke`.
    async fn stream(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<MessageChunk>>> {
        let message = self.invoke(request).await?;
        let chunk = MessageChunk::from_message(&message);
        Ok(Box::pin(futures::stream::once(async move { Ok(chunk) })))
    }
}

/// Text embedding model consumed as an opaque service.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
