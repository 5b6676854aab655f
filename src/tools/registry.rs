//! Name → tool mapping.

use std::collections::HashMap;
use std::sync::Arc;

use super::arguments::ToolArguments;
use super::tool::Tool;
use super::validation::{apply_defaults, validate_arguments};
use crate::error::{Result, TurnstileError};
use crate::provider::ToolDefinition;
use crate::types::ToolCall;

/// Registered tools in declaration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(TurnstileError::Configuration(format!(
                "duplicate tool name '{name}'"
            )));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|tool| tool.name())
    }

    /// Definitions advertised to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters().schema.clone(),
            })
            .collect()
    }

    /// Resolve the tool for a call, validate its arguments and fill defaults.
    pub fn prepare(&self, call: &ToolCall) -> Result<(Arc<dyn Tool>, ToolArguments)> {
        let tool = self
            .get(&call.name)
            .cloned()
            .ok_or_else(|| TurnstileError::tool(&call.name, format!("Tool '{}' not found", call.name)))?;
        let schema = &tool.parameters().schema;
        validate_arguments(&call.arguments, schema).map_err(|message| {
            TurnstileError::Validation {
                tool_name: call.name.clone(),
                message,
            }
        })?;
        let mut arguments = call.arguments.clone();
        apply_defaults(&mut arguments, schema);
        Ok((tool, ToolArguments::new(arguments)))
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
