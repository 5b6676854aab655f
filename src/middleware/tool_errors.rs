//! Turn tool failures into error results the model can react to.

use std::sync::Arc;

use crate::error::TurnstileError;
use crate::tools::ToolOutput;
use crate::types::ToolCall;

use super::Middleware;

/// `WrapTool` middleware formatting every tool error with `format`.
pub fn handle_tool_errors<F>(format: F) -> Middleware
where
    F: Fn(&ToolCall, &TurnstileError) -> String + Send + Sync + 'static,
{
    let format = Arc::new(format);
    Middleware::wrap_tool(move |request, next| {
        let format = Arc::clone(&format);
        async move {
            let call = request.call.clone();
            match next(request).await {
                Ok(output) => Ok(output),
                Err(err) => {
                    tracing::warn!(tool = %call.name, tool_call_id = %call.id, error = %err, "tool failed");
                    Ok(ToolOutput::error(format(&call, &err)))
                }
            }
        }
    })
}

/// Same as [`handle_tool_errors`] with a fixed prefix before the error text.
pub fn handle_tool_errors_with_message(message: impl Into<String>) -> Middleware {
    let message = message.into();
    handle_tool_errors(move |_call, err| format!("{message} ({err})"))
}

/// Default formatting: `Tool error: Please check your input and try again. (<error>)`.
pub fn default_tool_errors() -> Middleware {
    handle_tool_errors_with_message("Tool error: Please check your input and try again.")
}
