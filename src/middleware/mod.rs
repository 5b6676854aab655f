//! Middleware chain: hooks around model and tool calls.
//!
//! Middleware is an ordered list of tagged hooks. At executor build time the
//! `WrapModel` and `WrapTool` hooks are folded into a single handler each, so
//! the first declared middleware is the outermost wrapper.

pub mod context;
pub mod model_select;
pub mod pii;
pub mod summarize;
pub mod tool_errors;
pub mod trim;

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::tools::ToolOutput;
use crate::types::Message;

pub use context::{BeforeModelState, ModelRequest, PromptContext, ToolRequest};
pub use model_select::select_model_by_message_count;
pub use pii::{pii, PiiConfig, PiiKind, PiiStrategy};
pub use summarize::{summarization, SummarizationConfig};
pub use tool_errors::{default_tool_errors, handle_tool_errors, handle_tool_errors_with_message};
pub use trim::{trim_messages, trim_recent};

/// Continuation of the model chain.
pub type ModelHandler = Arc<dyn Fn(ModelRequest) -> BoxFuture<'static, Result<Message>> + Send + Sync>;

/// Continuation of the tool chain.
pub type ToolHandler =
    Arc<dyn Fn(ToolRequest) -> BoxFuture<'static, Result<ToolOutput>> + Send + Sync>;

pub type BeforeModelHook =
    Arc<dyn Fn(BeforeModelState) -> BoxFuture<'static, Result<Option<Vec<Message>>>> + Send + Sync>;

pub type WrapModelHook =
    Arc<dyn Fn(ModelRequest, ModelHandler) -> BoxFuture<'static, Result<Message>> + Send + Sync>;

pub type WrapToolHook =
    Arc<dyn Fn(ToolRequest, ToolHandler) -> BoxFuture<'static, Result<ToolOutput>> + Send + Sync>;

/// Synchronous and deterministic: the same context must yield the same prompt.
pub type DynamicPromptHook = Arc<dyn Fn(&PromptContext) -> String + Send + Sync>;

/// One hook in the chain.
#[derive(Clone)]
pub enum Middleware {
    /// Runs before every model call; `Some(log)` replaces the whole message log.
    BeforeModel(BeforeModelHook),
    /// Wraps the model call. Must call `next` exactly once unless it
    /// short-circuits with a substitute response.
    WrapModel(WrapModelHook),
    /// Wraps a single tool call.
    WrapTool(WrapToolHook),
    /// Computes the system prompt.
    DynamicPrompt(DynamicPromptHook),
}

impl Middleware {
    pub fn before_model<F, Fut>(hook: F) -> Self
    where
        F: Fn(BeforeModelState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Vec<Message>>>> + Send + 'static,
    {
        Self::BeforeModel(Arc::new(
            move |state| -> BoxFuture<'static, Result<Option<Vec<Message>>>> { Box::pin(hook(state)) },
        ))
    }

    pub fn wrap_model<F, Fut>(hook: F) -> Self
    where
        F: Fn(ModelRequest, ModelHandler) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Message>> + Send + 'static,
    {
        Self::WrapModel(Arc::new(
            move |request, next| -> BoxFuture<'static, Result<Message>> { Box::pin(hook(request, next)) },
        ))
    }

    pub fn wrap_tool<F, Fut>(hook: F) -> Self
    where
        F: Fn(ToolRequest, ToolHandler) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        Self::WrapTool(Arc::new(
            move |request, next| -> BoxFuture<'static, Result<ToolOutput>> { Box::pin(hook(request, next)) },
        ))
    }

    pub fn dynamic_prompt<F>(hook: F) -> Self
    where
        F: Fn(&PromptContext) -> String + Send + Sync + 'static,
    {
        Self::DynamicPrompt(Arc::new(hook))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::BeforeModel(_) => "before_model",
            Self::WrapModel(_) => "wrap_model",
            Self::WrapTool(_) => "wrap_tool",
            Self::DynamicPrompt(_) => "dynamic_prompt",
        }
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// A middleware list split by tag, with wrappers folded around base handlers.
#[derive(Clone)]
pub struct MiddlewareChain {
    before_model: Vec<BeforeModelHook>,
    dynamic_prompts: Vec<DynamicPromptHook>,
    model: ModelHandler,
    tool: ToolHandler,
}

impl MiddlewareChain {
    pub fn build(middleware: &[Middleware], base_model: ModelHandler, base_tool: ToolHandler) -> Self {
        let mut before_model = Vec::new();
        let mut dynamic_prompts = Vec::new();
        let mut model_wraps = Vec::new();
        let mut tool_wraps = Vec::new();
        for entry in middleware {
            match entry {
                Middleware::BeforeModel(hook) => before_model.push(Arc::clone(hook)),
                Middleware::DynamicPrompt(hook) => dynamic_prompts.push(Arc::clone(hook)),
                Middleware::WrapModel(hook) => model_wraps.push(Arc::clone(hook)),
                Middleware::WrapTool(hook) => tool_wraps.push(Arc::clone(hook)),
            }
        }
        Self {
            before_model,
            dynamic_prompts,
            model: compose_model(&model_wraps, base_model),
            tool: compose_tool(&tool_wraps, base_tool),
        }
    }

    pub fn before_model_hooks(&self) -> &[BeforeModelHook] {
        &self.before_model
    }

    /// Base prompt, then each dynamic prompt in declaration order, each seeing
    /// the prompt produced so far.
    pub fn system_prompt(&self, base: Option<&str>, mut ctx: PromptContext) -> Option<String> {
        ctx.previous = base.map(str::to_string);
        for hook in &self.dynamic_prompts {
            ctx.previous = Some(hook(&ctx));
        }
        ctx.previous
    }

    pub fn model_handler(&self) -> &ModelHandler {
        &self.model
    }

    pub fn tool_handler(&self) -> &ToolHandler {
        &self.tool
    }
}

/// Fold wrappers so that `wraps[0]` is outermost.
pub fn compose_model(wraps: &[WrapModelHook], base: ModelHandler) -> ModelHandler {
    wraps.iter().rev().fold(base, |next, wrap| {
        let wrap = Arc::clone(wrap);
        let handler: ModelHandler = Arc::new(move |request| -> BoxFuture<'static, Result<Message>> {
            wrap(request, Arc::clone(&next))
        });
        handler
    })
}

/// Fold wrappers so that `wraps[0]` is outermost.
pub fn compose_tool(wraps: &[WrapToolHook], base: ToolHandler) -> ToolHandler {
    wraps.iter().rev().fold(base, |next, wrap| {
        let wrap = Arc::clone(wrap);
        let handler: ToolHandler = Arc::new(move |request| -> BoxFuture<'static, Result<ToolOutput>> {
            wrap(request, Arc::clone(&next))
        });
        handler
    })
}
