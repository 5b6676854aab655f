//! Structured output: schema-validated final answers.
//!
//! Two strategies are supported. `Provider` asks the model for a JSON-schema
//! response format and parses the final text. `Tool` exposes a synthetic tool
//! named after the schema and forces the model to call it; the call's
//! arguments become the structured response and no real tool runs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::error::{Result, TurnstileError};
use crate::provider::{ModelCapabilities, ToolDefinition};
use crate::tools::validation::validate_arguments;
use crate::types::{ResponseFormat, ToolCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StructuredStrategy {
    /// Native JSON-schema response format.
    Provider,
    /// Forced call to a synthetic tool.
    Tool,
}

/// A named JSON schema the turn's final answer must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredOutput {
    pub name: String,
    pub schema: Value,
    pub strategy: StructuredStrategy,
    pub description: Option<String>,
}

impl StructuredOutput {
    pub fn new(name: impl Into<String>, schema: Value, strategy: StructuredStrategy) -> Self {
        Self {
            name: name.into(),
            schema,
            strategy,
            description: None,
        }
    }

    pub fn provider(name: impl Into<String>, schema: Value) -> Self {
        Self::new(name, schema, StructuredStrategy::Provider)
    }

    pub fn tool(name: impl Into<String>, schema: Value) -> Self {
        Self::new(name, schema, StructuredStrategy::Tool)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Fails with `UnsupportedStrategy` when the provider strategy is used
    /// with a model lacking JSON-schema support.
    pub fn ensure_supported(&self, model: &str, capabilities: &ModelCapabilities) -> Result<()> {
        if self.strategy == StructuredStrategy::Provider && !capabilities.supports_json_schema {
            return Err(TurnstileError::UnsupportedStrategy(format!(
                "model '{model}' does not support JSON schema responses; use the tool strategy"
            )));
        }
        Ok(())
    }

    pub fn response_format(&self) -> Option<ResponseFormat> {
        match self.strategy {
            StructuredStrategy::Provider => Some(ResponseFormat::JsonSchema {
                schema: self.schema.clone(),
                name: self.name.clone(),
            }),
            StructuredStrategy::Tool => None,
        }
    }

    /// The synthetic tool offered to the model under the tool strategy.
    pub fn tool_definition(&self) -> Option<ToolDefinition> {
        match self.strategy {
            StructuredStrategy::Tool => Some(ToolDefinition {
                name: self.name.clone(),
                description: self.description.clone().unwrap_or_else(|| {
                    format!("Respond with the final answer as a {} object.", self.name)
                }),
                parameters: self.schema.clone(),
            }),
            StructuredStrategy::Provider => None,
        }
    }

    /// Whether `call` targets the synthetic tool.
    pub fn is_structured_call(&self, call: &ToolCall) -> bool {
        self.strategy == StructuredStrategy::Tool && call.name == self.name
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        validate_arguments(value, &self.schema).map_err(|message| {
            TurnstileError::StructuredOutput(format!("{} does not match its schema: {message}", self.name))
        })
    }

    /// Parse and validate final text produced under the provider strategy.
    pub fn parse_text(&self, text: &str) -> Result<Value> {
        let value: Value = serde_json::from_str(strip_code_fences(text)).map_err(|e| {
            TurnstileError::StructuredOutput(format!("{} is not valid JSON: {e}", self.name))
        })?;
        self.validate(&value)?;
        Ok(value)
    }
}

/// Strip markdown code fences around a JSON reply.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
