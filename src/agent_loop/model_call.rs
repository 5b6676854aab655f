//! Innermost model handler: routing, retries, and stream assembly.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::StreamExt;

use crate::error::Result;
use crate::middleware::{ModelHandler, ModelRequest};
use crate::provider::{ModelProvider, ModelRouter, ProviderRequest};
use crate::structured::StructuredOutput;
use crate::types::{Message, MessageAccumulator};
use crate::util::retry::RetryPolicy;

use super::events::{TurnEventEmitter, TurnEventPayload};

/// Settings captured by the base model handler at build time.
pub(crate) struct ModelCallSettings {
    pub router: Arc<ModelRouter>,
    pub retry: RetryPolicy,
    pub streaming: bool,
    pub structured: Option<StructuredOutput>,
    pub emitter: Arc<TurnEventEmitter>,
}

/// The handler at the bottom of the `WrapModel` chain. Resolves the model
/// chosen by middleware and calls it with retries.
pub(crate) fn base_model_handler(settings: ModelCallSettings) -> ModelHandler {
    let settings = Arc::new(settings);
    Arc::new(move |request: ModelRequest| -> BoxFuture<'static, Result<Message>> {
        let settings = Arc::clone(&settings);
        Box::pin(async move {
            let provider = Arc::clone(settings.router.resolve(&request.model)?);
            if let Some(structured) = &settings.structured {
                structured.ensure_supported(&request.model, provider.capabilities())?;
            }
            let provider_request = request.to_provider_request();
            let streaming = settings.streaming && provider.capabilities().supports_streaming;
            tracing::debug!(
                thread_id = %request.thread_id,
                model = %request.model,
                provider = provider.provider_name(),
                messages = provider_request.messages.len(),
                streaming,
                "calling model"
            );
            settings
                .retry
                .execute(|| {
                    call_provider(
                        provider.as_ref(),
                        &provider_request,
                        streaming,
                        &settings.emitter,
                        &request.thread_id,
                    )
                })
                .await
        })
    })
}

async fn call_provider(
    provider: &dyn ModelProvider,
    request: &ProviderRequest,
    streaming: bool,
    emitter: &TurnEventEmitter,
    thread_id: &str,
) -> Result<Message> {
    if !streaming {
        return provider.invoke(request).await;
    }
    let mut stream = provider.stream(request).await?;
    let mut accumulator = MessageAccumulator::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if !chunk.text.is_empty() {
            emitter.emit(
                thread_id,
                TurnEventPayload::AssistantDelta {
                    text: chunk.text.clone(),
                },
            );
        }
        accumulator.push(&chunk);
    }
    Ok(accumulator.finish())
}
