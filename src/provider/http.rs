//! Shared HTTP client, SSE parsing, and auth utilities.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};

use crate::error::TurnstileError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "falling back to default HTTP client");
                reqwest::Client::new()
            })
    })
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Parse an SSE "data:" line, returning None for "[DONE]".
pub fn parse_sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return None;
    }
    Some(data)
}

/// Accumulates raw body bytes and hands out complete lines.
///
/// Bytes are decoded only once a full line has arrived, so multi-byte
/// characters split across network chunks survive intact.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete line with surrounding whitespace trimmed.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

/// Read a non-success response into the matching error.
pub async fn error_from_response(resp: reqwest::Response) -> TurnstileError {
    let status = resp.status().as_u16();
    let header_retry = resp
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|secs| (secs * 1000.0) as u64);
    let body = resp.text().await.unwrap_or_default();
    match status_to_error(status, &body) {
        TurnstileError::RateLimited { retry_after_ms } => TurnstileError::RateLimited {
            retry_after_ms: retry_after_ms.or(header_retry),
        },
        other => other,
    }
}

/// Map an HTTP status code to an error.
pub fn status_to_error(status: u16, body: &str) -> TurnstileError {
    match status {
        401 | 403 => TurnstileError::Authentication(body.to_string()),
        404 => TurnstileError::ModelNotFound(body.to_string()),
        429 => TurnstileError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => TurnstileError::api(status, body),
    }
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_data_lines_skip_done_marker() {
        assert_eq!(parse_sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(parse_sse_data("data:{}"), Some("{}"));
        assert_eq!(parse_sse_data("data: [DONE]"), None);
        assert_eq!(parse_sse_data("event: ping"), None);
    }

    #[test]
    fn line_buffer_keeps_characters_split_across_chunks() {
        let line = "data: {\"content\":\"你好\"}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xe4).unwrap() + 2;
        let mut buffer = SseLineBuffer::default();

        buffer.extend(&line[..split]);
        assert_eq!(buffer.next_line(), None);
        buffer.extend(&line[split..]);
        assert_eq!(buffer.next_line().as_deref(), Some("data: {\"content\":\"你好\"}"));
        assert_eq!(buffer.next_line(), None);
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(matches!(status_to_error(401, "no"), TurnstileError::Authentication(_)));
        assert!(matches!(
            status_to_error(429, r#"{"error":{"retry_after":1.5}}"#),
            TurnstileError::RateLimited {
                retry_after_ms: Some(1500)
            }
        ));
        assert!(status_to_error(502, "bad gateway").is_retryable());
    }
}
