//! Values passed through the middleware chain.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::provider::{ProviderRequest, ToolDefinition};
use crate::store::SharedStore;
use crate::tools::{Tool, ToolArguments, ToolContext};
use crate::types::{GenerationSettings, Message, ResponseFormat, ToolCall, ToolChoice};

/// The outgoing model request as seen by `WrapModel` hooks.
#[derive(Clone)]
pub struct ModelRequest {
    pub thread_id: String,
    /// Model name resolved through the executor's router.
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    pub response_format: Option<ResponseFormat>,
    pub settings: GenerationSettings,
    /// Immutable runtime context.
    pub runtime: Value,
    /// Snapshot of custom state.
    pub state: Map<String, Value>,
    pub store: Option<SharedStore>,
}

impl ModelRequest {
    pub fn new(thread_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            model: model.into(),
            system_prompt: None,
            messages: Vec::new(),
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            response_format: None,
            settings: GenerationSettings::default(),
            runtime: Value::Object(Map::new()),
            state: Map::new(),
            store: None,
        }
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn to_provider_request(&self) -> ProviderRequest {
        ProviderRequest {
            system_prompt: self.system_prompt.clone(),
            messages: self.messages.clone(),
            tools: self.tools.clone(),
            tool_choice: self.tool_choice.clone(),
            response_format: self.response_format.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl std::fmt::Debug for ModelRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRequest")
            .field("thread_id", &self.thread_id)
            .field("model", &self.model)
            .field("messages", &self.messages.len())
            .field("tools", &self.tools.len())
            .field("tool_choice", &self.tool_choice)
            .finish()
    }
}

/// A single tool invocation as seen by `WrapTool` hooks.
#[derive(Clone)]
pub struct ToolRequest {
    pub call: ToolCall,
    pub tool: Arc<dyn Tool>,
    /// Validated arguments with defaults filled.
    pub args: ToolArguments,
    pub context: ToolContext,
}

impl std::fmt::Debug for ToolRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRequest")
            .field("call", &self.call)
            .field("args", &self.args)
            .finish()
    }
}

/// Input to `BeforeModel` hooks.
#[derive(Debug, Clone)]
pub struct BeforeModelState {
    pub thread_id: String,
    pub messages: Vec<Message>,
    pub state: Map<String, Value>,
    pub runtime: Value,
    pub cancel: CancellationToken,
}

/// Input to `DynamicPrompt` hooks.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub runtime: Value,
    pub state: Map<String, Value>,
    pub messages: Vec<Message>,
    /// Prompt produced by the base prompt and earlier dynamic prompts.
    pub previous: Option<String>,
}
