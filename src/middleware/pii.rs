//! PII detection and redaction around model calls.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

use crate::types::Role;

use super::Middleware;

/// Kinds of personal data recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum PiiKind {
    Email,
    CreditCard,
    Ip,
    Url,
    Phone,
}

/// What to do with a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum PiiStrategy {
    /// `[REDACTED_EMAIL]`
    Redact,
    /// Keep the last 4 characters: `**************.com`
    Mask,
    /// `<email_hash:1a2b3c4d>`
    Hash,
}

#[derive(Debug, Clone)]
pub struct PiiConfig {
    pub kind: PiiKind,
    pub strategy: PiiStrategy,
    /// Rewrite user messages before they reach the model.
    pub apply_to_input: bool,
    /// Rewrite the assistant reply before it is appended to the log.
    pub apply_to_output: bool,
}

impl PiiConfig {
    pub fn new(kind: PiiKind, strategy: PiiStrategy) -> Self {
        Self {
            kind,
            strategy,
            apply_to_input: true,
            apply_to_output: false,
        }
    }

    pub fn apply_to_output(mut self, enabled: bool) -> Self {
        self.apply_to_output = enabled;
        self
    }
}

fn pattern(kind: PiiKind) -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    static CREDIT_CARD: OnceLock<Regex> = OnceLock::new();
    static IP: OnceLock<Regex> = OnceLock::new();
    static URL: OnceLock<Regex> = OnceLock::new();
    static PHONE: OnceLock<Regex> = OnceLock::new();

    let (cell, source) = match kind {
        PiiKind::Email => (&EMAIL, r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
        PiiKind::CreditCard => (&CREDIT_CARD, r"\b\d(?:[ -]?\d){12,18}\b"),
        PiiKind::Ip => (
            &IP,
            r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b",
        ),
        PiiKind::Url => (&URL, r#"https?://[^\s<>"']+"#),
        PiiKind::Phone => (&PHONE, r"(?:\+?\d{1,3}[-. ]?)?\(?\d{3}\)?[-. ]\d{3}[-. ]\d{4}\b"),
    };
    cell.get_or_init(|| Regex::new(source).unwrap_or_else(|e| panic!("invalid {kind} pattern: {e}")))
}

fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

fn replacement(kind: PiiKind, strategy: PiiStrategy, matched: &str) -> String {
    match strategy {
        PiiStrategy::Redact => format!("[REDACTED_{}]", kind.to_string().to_uppercase()),
        PiiStrategy::Mask => {
            let chars: Vec<char> = matched.chars().collect();
            let visible = chars.len().min(4);
            let hidden = chars.len() - visible;
            std::iter::repeat('*')
                .take(hidden)
                .chain(chars[hidden..].iter().copied())
                .collect()
        }
        PiiStrategy::Hash => {
            let digest = Sha256::digest(matched.as_bytes());
            let prefix: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
            format!("<{kind}_hash:{prefix}>")
        }
    }
}

/// Apply `strategy` to every `kind` match in `text`.
pub fn apply_pii(text: &str, kind: PiiKind, strategy: PiiStrategy) -> String {
    pattern(kind)
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let matched = &caps[0];
            if kind == PiiKind::CreditCard && !luhn_valid(matched) {
                return matched.to_string();
            }
            replacement(kind, strategy, matched)
        })
        .into_owned()
}

/// `WrapModel` middleware rewriting user input and optionally model output.
///
/// The thread's log keeps the original user text; only the request sent to
/// the model is rewritten.
pub fn pii(config: PiiConfig) -> Middleware {
    let config = Arc::new(config);
    Middleware::wrap_model(move |mut request, next| {
        let config = Arc::clone(&config);
        async move {
            if config.apply_to_input {
                for message in request.messages.iter_mut().filter(|m| m.role == Role::User) {
                    message.content = apply_pii(&message.content, config.kind, config.strategy);
                }
            }
            let mut response = next(request).await?;
            if config.apply_to_output {
                response.content = apply_pii(&response.content, config.kind, config.strategy);
            }
            Ok(response)
        }
    })
}
