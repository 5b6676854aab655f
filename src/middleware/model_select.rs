//! Route long conversations to a different model.

use std::sync::Arc;

use super::Middleware;

/// `WrapModel` middleware that switches the request to `model` once it
/// carries more than `threshold` messages. The name is resolved by the
/// executor's router after the chain returns.
pub fn select_model_by_message_count(threshold: usize, model: impl Into<String>) -> Middleware {
    let model: Arc<str> = Arc::from(model.into());
    Middleware::wrap_model(move |mut request, next| {
        let model = Arc::clone(&model);
        async move {
            if request.messages.len() > threshold {
                tracing::debug!(
                    thread_id = %request.thread_id,
                    messages = request.messages.len(),
                    from = %request.model,
                    to = %model,
                    "selecting model by message count"
                );
                request.model = model.to_string();
            }
            next(request).await
        }
    })
}
