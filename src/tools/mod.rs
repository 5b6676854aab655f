//! Tool system: definitions, validation, registry.

pub mod arguments;
pub mod builtin;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use registry::ToolRegistry;
pub use tool::{FunctionTool, ProgressSink, Tool, ToolContext};
pub use types::{ParameterBuilder, StateUpdate, ToolOutput, ToolParameters};
