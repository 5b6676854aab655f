//! Executors exposed as tools of a supervising executor.
//!
//! Each call runs one turn of the wrapped executor on its own sub-thread,
//! `<parent thread>/<tool name>/<tool call id>`, and returns the sub-agent's
//! final answer as the tool result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::executor::TurnExecutor;
use super::types::{Decision, Interrupt, TurnResult};
use crate::error::{Result, TurnstileError};
use crate::tools::{Tool, ToolArguments, ToolContext, ToolOutput, ToolParameters};

/// Decides the interrupts a sub-agent's own approval policy raises.
pub type SubAgentApprover =
    Arc<dyn Fn(Vec<Interrupt>) -> BoxFuture<'static, Result<HashMap<String, Decision>>> + Send + Sync>;

/// A [`TurnExecutor`] callable as a tool with a single `request` argument.
pub struct SubAgentTool {
    name: String,
    description: String,
    parameters: ToolParameters,
    executor: TurnExecutor,
    approver: Option<SubAgentApprover>,
}

impl SubAgentTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, executor: TurnExecutor) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ToolParameters::object()
                .string("request", "Natural-language request for this agent", true)
                .build(),
            executor,
            approver: None,
        }
    }

    /// Answer the sub-agent's interrupts in place. Without an approver a
    /// suspended sub-turn becomes an error result naming the sub-thread,
    /// which can then be resumed on the wrapped executor directly.
    pub fn with_approver<F, Fut>(mut self, approver: F) -> Self
    where
        F: Fn(Vec<Interrupt>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HashMap<String, Decision>>> + Send + 'static,
    {
        self.approver = Some(Arc::new(move |interrupts| Box::pin(approver(interrupts))));
        self
    }

    fn sub_thread_id(&self, ctx: &ToolContext) -> String {
        format!("{}/{}/{}", ctx.thread_id, self.name, ctx.tool_call_id)
    }
}

#[async_trait]
impl Tool for SubAgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> std::result::Result<ToolOutput, TurnstileError> {
        let request = args.get_str("request")?;
        let thread_id = self.sub_thread_id(ctx);
        tracing::debug!(agent = %self.name, thread_id = %thread_id, "delegating to sub-agent");

        let mut result = self
            .executor
            .start_turn(&thread_id, request, ctx.runtime.clone())
            .await?;
        loop {
            let interrupts = match &result {
                TurnResult::Done { .. } => break,
                TurnResult::Suspended { interrupts } => interrupts.clone(),
            };
            let Some(approver) = &self.approver else {
                return Ok(ToolOutput::error(format!(
                    "{} is waiting for approval of {} action(s) on thread '{thread_id}'",
                    self.name,
                    interrupts.len()
                )));
            };
            let decisions = approver(interrupts).await?;
            result = self.executor.resume_turn(&thread_id, decisions).await?;
        }

        if let Some(structured) = result.structured_response() {
            return Ok(ToolOutput::value(structured.clone()));
        }
        let answer = result.message().map(|m| m.content.clone()).unwrap_or_default();
        Ok(ToolOutput::value(answer))
    }
}

impl std::fmt::Debug for SubAgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubAgentTool")
            .field("name", &self.name)
            .field("has_approver", &self.approver.is_some())
            .finish()
    }
}
