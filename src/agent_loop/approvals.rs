//! Which tool calls pause for human approval.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::ToolCall;

use super::types::{DecisionKind, Interrupt};

const DEFAULT_DESCRIPTION_PREFIX: &str = "Tool execution pending approval";

/// Approval settings for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptOnConfig {
    pub allowed_decisions: Vec<DecisionKind>,
    /// Overrides the generated description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for InterruptOnConfig {
    fn default() -> Self {
        Self {
            allowed_decisions: DecisionKind::ALL.to_vec(),
            description: None,
        }
    }
}

impl InterruptOnConfig {
    pub fn allowing(decisions: impl IntoIterator<Item = DecisionKind>) -> Self {
        Self {
            allowed_decisions: decisions.into_iter().collect(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Tool names that require approval. Tools not listed run immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptPolicy {
    interrupt_on: HashMap<String, InterruptOnConfig>,
    description_prefix: String,
}

impl Default for InterruptPolicy {
    fn default() -> Self {
        Self {
            interrupt_on: HashMap::new(),
            description_prefix: DEFAULT_DESCRIPTION_PREFIX.to_string(),
        }
    }
}

impl InterruptPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require approval for `tool` with every decision allowed.
    pub fn on(self, tool: impl Into<String>) -> Self {
        self.on_with(tool, InterruptOnConfig::default())
    }

    pub fn on_with(mut self, tool: impl Into<String>, config: InterruptOnConfig) -> Self {
        self.interrupt_on.insert(tool.into(), config);
        self
    }

    pub fn with_description_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.description_prefix = prefix.into();
        self
    }

    pub fn requires_approval(&self, tool: &str) -> bool {
        self.interrupt_on.contains_key(tool)
    }

    pub fn is_empty(&self) -> bool {
        self.interrupt_on.is_empty()
    }

    /// The interrupt for `call`, or `None` when it may run immediately.
    pub fn interrupt_for(&self, call: &ToolCall) -> Option<Interrupt> {
        let config = self.interrupt_on.get(&call.name)?;
        let description = config.description.clone().unwrap_or_else(|| {
            format!(
                "{}\n\nTool: {}\nArgs: {}",
                self.description_prefix, call.name, call.arguments
            )
        });
        Some(Interrupt::new(
            call.clone(),
            description,
            config.allowed_decisions.clone(),
        ))
    }
}
