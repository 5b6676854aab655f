//! Error types for turnstile.

use thiserror::Error;

/// Primary error type for all turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Argument validation failed for '{tool_name}': {message}")]
    Validation { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Turn limit exceeded for thread '{thread_id}' (max_iterations={max_iterations})")]
    TurnLimitExceeded {
        thread_id: String,
        max_iterations: usize,
    },

    #[error("Unsupported structured output strategy: {0}")]
    UnsupportedStrategy(String),

    #[error("Unresolved interrupt on thread '{thread_id}': {message}")]
    UnresolvedInterrupt { thread_id: String, message: String },

    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Checkpoint version conflict on thread '{thread_id}': expected {expected}, found {found}")]
    VersionConflict {
        thread_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Structured output error: {0}")]
    StructuredOutput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Provider,
    Api,
    Configuration,
    Serialization,
    ToolExecution,
    Interrupt,
    Persistence,
    TurnLimit,
    Unknown,
}

impl TurnstileError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a provider error.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Provider { .. } => ErrorCategory::Provider,
            Self::Configuration(_) | Self::UnsupportedStrategy(_) | Self::ModelNotFound(_) => {
                ErrorCategory::Configuration
            }
            Self::Serialization(_) | Self::StructuredOutput(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::Validation { .. } | Self::InvalidArgument(_) | Self::ToolExecution { .. } => {
                ErrorCategory::ToolExecution
            }
            Self::UnresolvedInterrupt { .. } => ErrorCategory::Interrupt,
            Self::Checkpoint(_) | Self::VersionConflict { .. } | Self::Io(_) => {
                ErrorCategory::Persistence
            }
            Self::TurnLimitExceeded { .. } => ErrorCategory::TurnLimit,
            Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
                | ErrorCategory::Provider
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TurnstileError>;
