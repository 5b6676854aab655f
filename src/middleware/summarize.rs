//! Summarize old history once the log grows past a token budget.

use std::sync::Arc;

use crate::error::Result;
use crate::provider::{ModelProvider, ProviderRequest};
use crate::types::{Message, Role};

use super::Middleware;

const DEFAULT_SUMMARY_PROMPT: &str = "Summarize the conversation below so it can replace the \
original messages. Keep names, decisions, open questions, and facts the assistant will need. \
Reply with the summary only.";

pub const SUMMARY_PREFIX: &str = "Here is a summary of the conversation to date:";

#[derive(Debug, Clone)]
pub struct SummarizationConfig {
    /// Summarize when the estimated token count exceeds this.
    pub trigger_tokens: usize,
    /// Most recent messages kept verbatim.
    pub keep_messages: usize,
    pub summary_prompt: String,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            trigger_tokens: 4000,
            keep_messages: 20,
            summary_prompt: DEFAULT_SUMMARY_PROMPT.to_string(),
        }
    }
}

impl SummarizationConfig {
    pub fn new(trigger_tokens: usize, keep_messages: usize) -> Self {
        Self {
            trigger_tokens,
            keep_messages,
            ..Self::default()
        }
    }
}

/// First index that is kept verbatim, or `None` when there is nothing to
/// summarize. Tool results are never separated from the assistant message
/// that requested them.
pub fn summary_cutoff(messages: &[Message], config: &SummarizationConfig) -> Option<usize> {
    let total: usize = messages.iter().map(Message::estimated_tokens).sum();
    if total <= config.trigger_tokens {
        return None;
    }
    let start = usize::from(messages.first().is_some_and(|m| m.role == Role::System));
    let mut cutoff = messages.len().saturating_sub(config.keep_messages);
    while cutoff > start && messages.get(cutoff).is_some_and(|m| m.role == Role::Tool) {
        cutoff -= 1;
    }
    (cutoff > start).then_some(cutoff)
}

fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let mut line = format!("{}: {}", m.role, m.content);
            for call in &m.tool_calls {
                line.push_str(&format!("\n  [tool call {}({})]", call.name, call.arguments));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace the summarized prefix with one summary message.
pub async fn summarize_messages(
    summarizer: &dyn ModelProvider,
    messages: &[Message],
    config: &SummarizationConfig,
) -> Result<Option<Vec<Message>>> {
    let Some(cutoff) = summary_cutoff(messages, config) else {
        return Ok(None);
    };
    let start = usize::from(messages[0].role == Role::System);
    let request = ProviderRequest {
        system_prompt: Some(config.summary_prompt.clone()),
        messages: vec![Message::user(render_transcript(&messages[start..cutoff]))],
        ..Default::default()
    };
    let summary = summarizer.invoke(&request).await?;

    let mut replaced = Vec::with_capacity(messages.len() - cutoff + 2);
    replaced.extend_from_slice(&messages[..start]);
    replaced.push(Message::user(format!("{SUMMARY_PREFIX}\n\n{}", summary.content.trim())));
    replaced.extend_from_slice(&messages[cutoff..]);
    Ok(Some(replaced))
}

/// `BeforeModel` middleware summarizing through `summarizer`.
pub fn summarization(summarizer: Arc<dyn ModelProvider>, config: SummarizationConfig) -> Middleware {
    let config = Arc::new(config);
    Middleware::before_model(move |state| {
        let summarizer = Arc::clone(&summarizer);
        let config = Arc::clone(&config);
        async move {
            let replaced = summarize_messages(summarizer.as_ref(), &state.messages, &config).await?;
            if let Some(log) = &replaced {
                tracing::info!(
                    thread_id = %state.thread_id,
                    before = state.messages.len(),
                    after = log.len(),
                    "summarized message log"
                );
            }
            Ok(replaced)
        }
    })
}
