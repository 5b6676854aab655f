//! Keep-recent message trimming.

use crate::types::{Message, Role};

use super::Middleware;

/// Trim a log longer than 3 messages to its first message plus the most
/// recent 3 (even length) or 4 (odd length). `None` when nothing changes.
///
/// Tool results at the front of the kept tail are dropped when their
/// assistant call message was cut. If the tail is nothing but tool results,
/// the cut moves back to include the assistant message that requested them.
///
/// Trimming twice is the same as trimming once.
pub fn trim_recent(messages: &[Message]) -> Option<Vec<Message>> {
    if messages.len() <= 3 {
        return None;
    }
    let keep = if messages.len() % 2 == 0 { 3 } else { 4 };
    if messages.len() <= keep + 1 {
        return None;
    }
    let cut = messages.len() - keep;
    let mut start = cut;
    while start < messages.len() && messages[start].role == Role::Tool {
        start += 1;
    }
    if start == messages.len() {
        start = cut;
        while start > 1 && messages[start].role == Role::Tool {
            start -= 1;
        }
    }
    if start <= 1 {
        return None;
    }
    let mut trimmed = Vec::with_capacity(messages.len() - start + 1);
    trimmed.push(messages[0].clone());
    trimmed.extend_from_slice(&messages[start..]);
    Some(trimmed)
}

/// `BeforeModel` middleware applying [`trim_recent`].
pub fn trim_messages() -> Middleware {
    Middleware::before_model(|state| async move {
        let trimmed = trim_recent(&state.messages);
        if let Some(kept) = &trimmed {
            tracing::debug!(
                thread_id = %state.thread_id,
                before = state.messages.len(),
                after = kept.len(),
                "trimmed message log"
            );
        }
        Ok(trimmed)
    })
}
