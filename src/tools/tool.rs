//! Tool trait, execution context, and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::arguments::ToolArguments;
use super::types::{ToolOutput, ToolParameters};
use crate::error::TurnstileError;
use crate::store::SharedStore;

/// Receives progress updates streamed by a running tool.
pub type ProgressSink = Arc<dyn Fn(&ToolContext, Value) + Send + Sync>;

/// Context available during tool execution.
#[derive(Clone)]
pub struct ToolContext {
    pub tool_call_id: String,
    pub tool_name: String,
    pub thread_id: String,
    /// Immutable runtime context supplied at `start_turn`.
    pub runtime: Value,
    /// Snapshot of the thread's custom state when the batch started.
    pub state: Map<String, Value>,
    pub store: Option<SharedStore>,
    /// Cancelled when the owning turn future is dropped. The call itself is
    /// dropped along with it; pass the token to work the tool spawns.
    pub cancel: CancellationToken,
    progress: Option<ProgressSink>,
}

impl ToolContext {
    pub fn new(
        thread_id: impl Into<String>,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            thread_id: thread_id.into(),
            runtime: Value::Object(Map::new()),
            state: Map::new(),
            store: None,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_runtime(mut self, runtime: Value) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_state(mut self, state: Map<String, Value>) -> Self {
        self.state = state;
        self
    }

    pub fn with_store(mut self, store: Option<SharedStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Stream an intermediate update to the caller. No-op without a sink.
    pub fn report_progress(&self, update: Value) {
        if let Some(sink) = &self.progress {
            sink(self, update);
        }
    }

    /// The store, or a configuration error when the executor has none.
    pub fn require_store(&self) -> Result<&SharedStore, TurnstileError> {
        self.store
            .as_ref()
            .ok_or_else(|| TurnstileError::Configuration("no key-value store configured".into()))
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("tool_call_id", &self.tool_call_id)
            .field("tool_name", &self.tool_name)
            .field("thread_id", &self.thread_id)
            .field("runtime", &self.runtime)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

/// Core tool trait. Implement it to create custom tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema parameters.
    fn parameters(&self) -> &ToolParameters;

    /// Per-tool execution timeout, overriding the executor default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Execute with validated, default-filled arguments.
    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, TurnstileError>;
}

type ToolFuture = Pin<Box<dyn Future<Output = Result<ToolOutput, TurnstileError>> + Send>>;

type ToolHandler = dyn Fn(ToolArguments, ToolContext) -> ToolFuture + Send + Sync;

/// Closure-based tool for quick tool creation.
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: ToolParameters,
    timeout: Option<Duration>,
    handler: Arc<ToolHandler>,
}

impl FunctionTool {
    /// Create a tool from a closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, TurnstileError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            timeout: None,
            handler: Arc::new(move |args, ctx| -> ToolFuture { Box::pin(handler(args, ctx)) }),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, TurnstileError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}
