//! Convenience re-exports for common use.

pub use crate::agent_loop::{
    Decision, DecisionKind, Interrupt, InterruptOnConfig, InterruptPolicy, TurnEvent, TurnEventPayload,
    TurnExecutor, TurnResult,
};
pub use crate::checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
pub use crate::config::TurnstileConfig;
pub use crate::error::{Result, TurnstileError};
pub use crate::middleware::Middleware;
pub use crate::provider::{Embedder, ModelProvider, ModelRouter};
pub use crate::store::{InMemoryStore, KeyValueStore, SharedStore};
pub use crate::structured::StructuredOutput;
pub use crate::tools::{FunctionTool, StateUpdate, Tool, ToolArguments, ToolContext, ToolOutput, ToolParameters};
pub use crate::types::{GenerationSettings, Message, Role, ToolCall, ToolResult};
