//! Running single tool calls and folding their outputs into results.

use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::middleware::{ToolHandler, ToolRequest};
use crate::structured::StructuredOutput;
use crate::tools::{ToolContext, ToolOutput, ToolRegistry};
use crate::types::{ToolCall, ToolResult};
use crate::util::timeout::with_timeout;

/// The handler at the bottom of the `WrapTool` chain.
pub(crate) fn base_tool_handler(default_timeout: Option<Duration>) -> ToolHandler {
    std::sync::Arc::new(move |request: ToolRequest| -> BoxFuture<'static, Result<ToolOutput>> {
        Box::pin(async move {
            let ToolRequest {
                tool, args, context, ..
            } = request;
            match tool.timeout().or(default_timeout) {
                Some(limit) => with_timeout(limit, tool.execute(&args, &context)).await,
                None => tool.execute(&args, &context).await,
            }
        })
    })
}

/// Outcome of one call: the result for its slot and any state fields to merge.
#[derive(Debug)]
pub(crate) struct CallOutcome {
    pub result: ToolResult,
    pub state_update: Option<Map<String, Value>>,
}

impl CallOutcome {
    fn result(result: ToolResult) -> Self {
        Self {
            result,
            state_update: None,
        }
    }
}

/// Look up, validate, and run `call` through `handler`. Never fails: every
/// error becomes an error result so one bad call cannot abort the turn.
pub(crate) async fn execute_call(
    registry: &ToolRegistry,
    handler: &ToolHandler,
    call: &ToolCall,
    context: ToolContext,
) -> CallOutcome {
    let (tool, args) = match registry.prepare(call) {
        Ok(prepared) => prepared,
        Err(err) => return CallOutcome::result(ToolResult::error(&call.id, err.to_string())),
    };
    let request = ToolRequest {
        call: call.clone(),
        tool,
        args,
        context,
    };
    match handler(request).await {
        Ok(ToolOutput::Update(update)) => CallOutcome {
            result: ToolResult::success(&call.id, update.content),
            state_update: Some(update.fields),
        },
        Ok(output) if output.is_error() => {
            CallOutcome::result(ToolResult::error(&call.id, output.content()))
        }
        Ok(output) => CallOutcome::result(ToolResult::success(&call.id, output.content())),
        Err(err) => {
            tracing::warn!(tool = %call.name, tool_call_id = %call.id, error = %err, "tool call failed");
            CallOutcome::result(ToolResult::error(&call.id, err.to_string()))
        }
    }
}

/// Validate a call to the synthetic structured-output tool. Returns the
/// result to record and the captured response when valid.
pub(crate) fn structured_call(
    structured: &StructuredOutput,
    call: &ToolCall,
) -> (ToolResult, Option<Value>) {
    match structured.validate(&call.arguments) {
        Ok(()) => (
            ToolResult::success(
                &call.id,
                format!("Returning structured response: {}", call.arguments),
            ),
            Some(call.arguments.clone()),
        ),
        Err(err) => (
            ToolResult::error(
                &call.id,
                format!("{err}. Please fix the arguments and call {} again.", structured.name),
            ),
            None,
        ),
    }
}

/// Result recorded for a rejected call. The call never runs.
pub(crate) fn declined_result(call: &ToolCall, message: Option<&str>) -> ToolResult {
    let content = message.map(str::to_string).unwrap_or_else(|| {
        format!("approval declined: tool '{}' was not executed", call.name)
    });
    ToolResult::error(&call.id, content)
}

/// Merge `fields` into `state`, last write wins per field.
pub(crate) fn merge_state(state: &mut Map<String, Value>, fields: Map<String, Value>) {
    for (key, value) in fields {
        state.insert(key, value);
    }
}
