//! The turn executor: drives a thread from user input to a final answer or
//! a pause, checkpointing every transition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore, PendingBatch};
use crate::config::{ExecutorSettings, TurnstileConfig};
use crate::error::{Result, TurnstileError};
use crate::middleware::{BeforeModelState, Middleware, MiddlewareChain, ModelRequest, PromptContext};
use crate::provider::ModelRouter;
use crate::store::SharedStore;
use crate::structured::{StructuredOutput, StructuredStrategy};
use crate::tools::{ProgressSink, Tool, ToolContext, ToolRegistry};
use crate::types::{GenerationSettings, Message, Role, ToolCall, ToolChoice, ToolResult};
use crate::util::retry::RetryPolicy;

use super::approvals::InterruptPolicy;
use super::events::{TurnEventEmitter, TurnEventPayload, TurnEventSink};
use super::model_call::{base_model_handler, ModelCallSettings};
use super::tooling::{base_tool_handler, declined_result, execute_call, merge_state, structured_call};
use super::types::{Decision, Interrupt, Phase, TurnResult};

/// Drives turns for any number of threads.
///
/// Calls for the same thread id are serialized; distinct threads run in
/// parallel. Cloning shares the underlying executor.
#[derive(Clone)]
pub struct TurnExecutor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    router: Arc<ModelRouter>,
    tools: ToolRegistry,
    chain: MiddlewareChain,
    interrupt_policy: InterruptPolicy,
    structured: Option<StructuredOutput>,
    checkpoints: Arc<dyn CheckpointStore>,
    store: Option<SharedStore>,
    system_prompt: Option<String>,
    generation: GenerationSettings,
    max_iterations: usize,
    emitter: Arc<TurnEventEmitter>,
    thread_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TurnExecutor {
    pub fn builder(router: ModelRouter) -> TurnExecutorBuilder {
        TurnExecutorBuilder::new(router)
    }

    /// Append `user_message` to the thread and run until done or suspended.
    ///
    /// `runtime` is stored with the checkpoint and visible to tools,
    /// middleware and dynamic prompts for the rest of the turn, including
    /// after a resume.
    pub async fn start_turn(
        &self,
        thread_id: &str,
        user_message: impl Into<String>,
        runtime: Value,
    ) -> Result<TurnResult> {
        let lock = self.thread_lock(thread_id);
        let _held = lock.lock().await;
        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();

        let mut checkpoint = self
            .inner
            .checkpoints
            .get(thread_id)
            .await?
            .unwrap_or_else(|| Checkpoint::new(thread_id));
        if checkpoint.phase == Phase::Suspended {
            return Err(TurnstileError::InvalidState(format!(
                "thread '{thread_id}' is suspended on {} interrupt(s); resume it with decisions",
                checkpoint.interrupts().len()
            )));
        }
        close_abandoned_batch(&mut checkpoint);

        tracing::info!(thread_id, "turn started");
        self.emit(thread_id, TurnEventPayload::TurnStarted { resumed: false });
        checkpoint.runtime = runtime;
        checkpoint.iterations = 0;
        checkpoint.structured_response = None;
        checkpoint.error = None;
        checkpoint.phase = Phase::BuildingRequest;
        checkpoint.messages.push(Message::user(user_message));
        self.save(&mut checkpoint).await?;

        self.drive(checkpoint, &cancel, None).await
    }

    /// Resolve every open interrupt of a suspended thread and continue.
    ///
    /// `decisions` maps interrupt ids to decisions and must cover each open
    /// interrupt exactly once. On any mismatch the call fails with
    /// `UnresolvedInterrupt` and the checkpoint is left untouched.
    pub async fn resume_turn(
        &self,
        thread_id: &str,
        decisions: HashMap<String, Decision>,
    ) -> Result<TurnResult> {
        let lock = self.thread_lock(thread_id);
        let _held = lock.lock().await;
        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();

        let checkpoint = self.inner.checkpoints.get(thread_id).await?.ok_or_else(|| {
            TurnstileError::InvalidState(format!("no checkpoint for thread '{thread_id}'"))
        })?;
        if checkpoint.phase != Phase::Suspended {
            return Err(TurnstileError::InvalidState(format!(
                "thread '{thread_id}' is not suspended (phase {})",
                checkpoint.phase
            )));
        }
        check_decisions(thread_id, checkpoint.interrupts(), &decisions)?;

        tracing::info!(thread_id, decisions = decisions.len(), "turn resumed");
        self.emit(thread_id, TurnEventPayload::TurnStarted { resumed: true });
        self.drive(checkpoint, &cancel, Some(decisions)).await
    }

    /// The latest checkpoint of `thread_id`, if any.
    pub async fn checkpoint(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        self.inner.checkpoints.get(thread_id).await
    }

    pub fn router(&self) -> &ModelRouter {
        &self.inner.router
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.inner.tools
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .inner
            .thread_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(thread_id.to_string()).or_default())
    }

    fn emit(&self, thread_id: &str, payload: TurnEventPayload) {
        self.inner.emitter.emit(thread_id, payload);
    }

    async fn save(&self, checkpoint: &mut Checkpoint) -> Result<()> {
        checkpoint.updated_at = chrono::Utc::now();
        let stored = self.inner.checkpoints.put(checkpoint.clone()).await?;
        checkpoint.version = stored.version;
        tracing::debug!(
            thread_id = %checkpoint.thread_id,
            version = checkpoint.version,
            phase = %checkpoint.phase,
            "checkpoint saved"
        );
        self.emit(
            &checkpoint.thread_id,
            TurnEventPayload::CheckpointSaved {
                version: checkpoint.version,
                phase: checkpoint.phase,
            },
        );
        Ok(())
    }

    /// Run the loop; on failure record the error in a `failed` checkpoint.
    async fn drive(
        &self,
        mut checkpoint: Checkpoint,
        cancel: &CancellationToken,
        decisions: Option<HashMap<String, Decision>>,
    ) -> Result<TurnResult> {
        match self.run(&mut checkpoint, cancel, decisions).await {
            Ok(result) => Ok(result),
            Err(err) => {
                let thread_id = checkpoint.thread_id.clone();
                tracing::error!(thread_id = %thread_id, error = %err, "turn failed");
                checkpoint.phase = Phase::Failed;
                checkpoint.error = Some(err.to_string());
                if let Err(save_err) = self.save(&mut checkpoint).await {
                    tracing::warn!(thread_id = %thread_id, error = %save_err, "could not record failed turn");
                }
                self.emit(&thread_id, TurnEventPayload::Failed { error: err.to_string() });
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        checkpoint: &mut Checkpoint,
        cancel: &CancellationToken,
        decisions: Option<HashMap<String, Decision>>,
    ) -> Result<TurnResult> {
        if let Some(decisions) = decisions {
            self.apply_decisions(checkpoint, decisions, cancel).await;
        }

        loop {
            if let Some(result) = self.advance_batch(checkpoint, cancel).await? {
                return Ok(result);
            }

            let max_iterations = self.inner.max_iterations;
            if checkpoint.iterations >= max_iterations {
                return Err(TurnstileError::TurnLimitExceeded {
                    thread_id: checkpoint.thread_id.clone(),
                    max_iterations,
                });
            }

            checkpoint.phase = Phase::BuildingRequest;
            let request = self.build_request(checkpoint, cancel).await?;

            checkpoint.phase = Phase::CallingModel;
            checkpoint.iterations += 1;
            tracing::debug!(
                thread_id = %checkpoint.thread_id,
                iteration = checkpoint.iterations,
                model = %request.model,
                "model call"
            );
            self.emit(
                &checkpoint.thread_id,
                TurnEventPayload::ModelCall {
                    model: request.model.clone(),
                    iteration: checkpoint.iterations,
                },
            );
            let reply = (self.inner.chain.model_handler())(request).await?;
            let reply = Message {
                role: Role::Assistant,
                timestamp: reply.timestamp.or_else(|| Some(chrono::Utc::now())),
                ..reply
            };
            checkpoint.messages.push(reply.clone());
            self.emit(
                &checkpoint.thread_id,
                TurnEventPayload::AssistantMessage {
                    message: reply.clone(),
                },
            );

            if !reply.has_tool_calls() {
                let structured_response = match &self.inner.structured {
                    Some(structured) if structured.strategy == StructuredStrategy::Provider => {
                        Some(structured.parse_text(&reply.content)?)
                    }
                    _ => None,
                };
                return self.finish(checkpoint, reply, structured_response).await;
            }

            checkpoint.phase = Phase::ExecutingTools;
            checkpoint.pending = Some(PendingBatch::new(reply.tool_calls.clone()));
            self.save(checkpoint).await?;
        }
    }

    /// Execute the not-yet-run calls of the pending batch. Returns a result
    /// when the turn suspends or a structured response finishes it.
    async fn advance_batch(
        &self,
        checkpoint: &mut Checkpoint,
        cancel: &CancellationToken,
    ) -> Result<Option<TurnResult>> {
        let Some(mut batch) = checkpoint.pending.take() else {
            return Ok(None);
        };
        checkpoint.phase = Phase::ExecutingTools;

        for slot in 0..batch.calls.len() {
            let call = batch.calls[slot].clone();
            let awaiting = batch
                .interrupts
                .iter()
                .any(|interrupt| interrupt.pending_action.id == call.id);
            if batch.results[slot].is_some() || awaiting {
                continue;
            }

            if let Some(structured) = self
                .inner
                .structured
                .as_ref()
                .filter(|structured| structured.is_structured_call(&call))
            {
                let (result, captured) = structured_call(structured, &call);
                if captured.is_some() {
                    batch.structured_response = captured;
                }
                self.emit(&checkpoint.thread_id, TurnEventPayload::ToolFinished { result: result.clone() });
                batch.results[slot] = Some(result);
                continue;
            }

            if let Some(interrupt) = self.interrupt_for(&call) {
                tracing::info!(
                    thread_id = %checkpoint.thread_id,
                    tool = %call.name,
                    interrupt_id = %interrupt.id,
                    "tool call awaiting approval"
                );
                self.emit(
                    &checkpoint.thread_id,
                    TurnEventPayload::InterruptRaised {
                        interrupt: interrupt.clone(),
                    },
                );
                batch.interrupts.push(interrupt);
                continue;
            }

            let result = self.run_call(checkpoint, &call, cancel).await;
            batch.results[slot] = Some(result);
        }

        if !batch.interrupts.is_empty() {
            let interrupts = batch.interrupts.clone();
            checkpoint.pending = Some(batch);
            checkpoint.phase = Phase::Suspended;
            self.save(checkpoint).await?;
            tracing::info!(
                thread_id = %checkpoint.thread_id,
                interrupts = interrupts.len(),
                "turn suspended"
            );
            self.emit(
                &checkpoint.thread_id,
                TurnEventPayload::Suspended {
                    interrupts: interrupts.len(),
                },
            );
            return Ok(Some(TurnResult::Suspended { interrupts }));
        }

        checkpoint
            .messages
            .extend(batch.results.iter().flatten().map(Message::tool_result));
        checkpoint.phase = Phase::BuildingRequest;

        match batch.structured_response {
            Some(structured_response) => {
                let message = checkpoint
                    .messages
                    .iter()
                    .rev()
                    .find(|message| message.role == Role::Assistant)
                    .cloned()
                    .unwrap_or_else(|| Message::assistant(""));
                self.finish(checkpoint, message, Some(structured_response))
                    .await
                    .map(Some)
            }
            None => {
                self.save(checkpoint).await?;
                Ok(None)
            }
        }
    }

    /// The interrupt for a call that passes validation and matches the
    /// policy. Calls that fail lookup or validation run (and fail) instead.
    fn interrupt_for(&self, call: &ToolCall) -> Option<Interrupt> {
        if !self.inner.interrupt_policy.requires_approval(&call.name) {
            return None;
        }
        self.inner.tools.prepare(call).ok()?;
        self.inner.interrupt_policy.interrupt_for(call)
    }

    async fn apply_decisions(
        &self,
        checkpoint: &mut Checkpoint,
        decisions: HashMap<String, Decision>,
        cancel: &CancellationToken,
    ) {
        let Some(mut batch) = checkpoint.pending.take() else {
            return;
        };
        let interrupts = std::mem::take(&mut batch.interrupts);
        for interrupt in interrupts {
            let pending = &interrupt.pending_action;
            let Some(slot) = batch.slot_of(&pending.id) else {
                continue;
            };
            let Some(decision) = decisions.get(&interrupt.id) else {
                continue;
            };
            tracing::info!(
                thread_id = %checkpoint.thread_id,
                tool = %pending.name,
                decision = %decision.kind(),
                "interrupt resolved"
            );
            let result = match decision {
                Decision::Approve => self.run_call(checkpoint, pending, cancel).await,
                Decision::Reject { message } => {
                    let result = declined_result(pending, message.as_deref());
                    self.emit(&checkpoint.thread_id, TurnEventPayload::ToolFinished { result: result.clone() });
                    result
                }
                Decision::Edit { edited_action } => {
                    let mut edited = edited_action.clone();
                    if edited.id.is_empty() {
                        edited.id = pending.id.clone();
                    }
                    self.run_call(checkpoint, &edited, cancel).await
                }
            };
            batch.results[slot] = Some(result);
        }
        checkpoint.pending = Some(batch);
    }

    async fn run_call(
        &self,
        checkpoint: &mut Checkpoint,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> ToolResult {
        self.emit(&checkpoint.thread_id, TurnEventPayload::ToolStarted { call: call.clone() });
        let context = ToolContext::new(&checkpoint.thread_id, &call.id, &call.name)
            .with_runtime(checkpoint.runtime.clone())
            .with_state(checkpoint.state.clone())
            .with_store(self.inner.store.clone())
            .with_cancel(cancel.child_token())
            .with_progress(self.progress_sink());
        let outcome = execute_call(&self.inner.tools, self.inner.chain.tool_handler(), call, context).await;
        if let Some(fields) = outcome.state_update {
            merge_state(&mut checkpoint.state, fields);
        }
        tracing::debug!(
            thread_id = %checkpoint.thread_id,
            tool = %call.name,
            is_error = outcome.result.is_error,
            "tool call finished"
        );
        self.emit(
            &checkpoint.thread_id,
            TurnEventPayload::ToolFinished {
                result: outcome.result.clone(),
            },
        );
        outcome.result
    }

    fn progress_sink(&self) -> Option<ProgressSink> {
        self.inner.emitter.sink()?;
        let emitter = Arc::clone(&self.inner.emitter);
        Some(Arc::new(move |ctx: &ToolContext, update: Value| {
            emitter.emit(
                &ctx.thread_id,
                TurnEventPayload::ToolProgress {
                    tool_call_id: ctx.tool_call_id.clone(),
                    update,
                },
            );
        }))
    }

    async fn build_request(
        &self,
        checkpoint: &mut Checkpoint,
        cancel: &CancellationToken,
    ) -> Result<ModelRequest> {
        let chain = &self.inner.chain;
        for hook in chain.before_model_hooks() {
            let state = BeforeModelState {
                thread_id: checkpoint.thread_id.clone(),
                messages: checkpoint.messages.clone(),
                state: checkpoint.state.clone(),
                runtime: checkpoint.runtime.clone(),
                cancel: cancel.clone(),
            };
            if let Some(replaced) = hook(state).await? {
                checkpoint.messages = replaced;
            }
        }

        let system_prompt = chain.system_prompt(
            self.inner.system_prompt.as_deref(),
            PromptContext {
                runtime: checkpoint.runtime.clone(),
                state: checkpoint.state.clone(),
                messages: checkpoint.messages.clone(),
                previous: None,
            },
        );
        checkpoint.system_prompt = system_prompt.clone();

        let mut request = ModelRequest::new(&checkpoint.thread_id, self.inner.router.default_model())
            .with_messages(checkpoint.messages.clone());
        request.system_prompt = system_prompt;
        request.tools = self.inner.tools.definitions();
        request.settings = self.inner.generation.clone();
        request.runtime = checkpoint.runtime.clone();
        request.state = checkpoint.state.clone();
        request.store = self.inner.store.clone();
        if let Some(structured) = &self.inner.structured {
            request.response_format = structured.response_format();
            if let Some(definition) = structured.tool_definition() {
                request.tools.push(definition);
                request.tool_choice = ToolChoice::Required;
            }
        }
        Ok(request)
    }

    async fn finish(
        &self,
        checkpoint: &mut Checkpoint,
        message: Message,
        structured_response: Option<Value>,
    ) -> Result<TurnResult> {
        checkpoint.phase = Phase::Done;
        checkpoint.structured_response = structured_response.clone();
        self.save(checkpoint).await?;
        tracing::info!(
            thread_id = %checkpoint.thread_id,
            iterations = checkpoint.iterations,
            structured = structured_response.is_some(),
            "turn completed"
        );
        self.emit(&checkpoint.thread_id, TurnEventPayload::Completed);
        Ok(TurnResult::Done {
            message,
            structured_response,
        })
    }
}

impl std::fmt::Debug for TurnExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnExecutor")
            .field("router", &self.inner.router)
            .field("tools", &self.inner.tools)
            .field("max_iterations", &self.inner.max_iterations)
            .finish()
    }
}

/// Every open interrupt needs exactly one allowed decision, and nothing else
/// may be decided.
fn check_decisions(
    thread_id: &str,
    interrupts: &[Interrupt],
    decisions: &HashMap<String, Decision>,
) -> Result<()> {
    let unresolved = |message: String| TurnstileError::UnresolvedInterrupt {
        thread_id: thread_id.to_string(),
        message,
    };
    for interrupt in interrupts {
        let Some(decision) = decisions.get(&interrupt.id) else {
            return Err(unresolved(format!(
                "missing decision for interrupt {} ({})",
                interrupt.id, interrupt.pending_action.name
            )));
        };
        if !interrupt.allows(decision.kind()) {
            return Err(unresolved(format!(
                "decision '{}' is not allowed for interrupt {}",
                decision.kind(),
                interrupt.id
            )));
        }
        if let Decision::Edit { edited_action } = decision {
            if !edited_action.id.is_empty() && edited_action.id != interrupt.pending_action.id {
                return Err(unresolved(format!(
                    "edited action id '{}' does not match pending call '{}'",
                    edited_action.id, interrupt.pending_action.id
                )));
            }
        }
    }
    if let Some(extra) = decisions
        .keys()
        .find(|id| !interrupts.iter().any(|interrupt| &interrupt.id == *id))
    {
        return Err(unresolved(format!("no open interrupt with id {extra}")));
    }
    Ok(())
}

/// A batch left behind by a failed turn gets error results for its missing
/// slots so the log never holds a tool call without a result.
fn close_abandoned_batch(checkpoint: &mut Checkpoint) {
    let Some(batch) = checkpoint.pending.take() else {
        return;
    };
    for (call, result) in batch.calls.iter().zip(batch.results) {
        let result = result.unwrap_or_else(|| {
            ToolResult::error(&call.id, "turn ended before this tool call completed")
        });
        checkpoint.messages.push(Message::tool_result(&result));
    }
}

/// Builder for [`TurnExecutor`].
pub struct TurnExecutorBuilder {
    router: ModelRouter,
    tools: Vec<Arc<dyn Tool>>,
    middleware: Vec<Middleware>,
    interrupt_policy: InterruptPolicy,
    structured: Option<StructuredOutput>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    store: Option<SharedStore>,
    system_prompt: Option<String>,
    generation: GenerationSettings,
    settings: ExecutorSettings,
    event_sink: Option<TurnEventSink>,
}

impl TurnExecutorBuilder {
    pub fn new(router: ModelRouter) -> Self {
        Self {
            router,
            tools: Vec::new(),
            middleware: Vec::new(),
            interrupt_policy: InterruptPolicy::default(),
            structured: None,
            checkpoints: None,
            store: None,
            system_prompt: None,
            generation: GenerationSettings::default(),
            settings: ExecutorSettings::default(),
            event_sink: None,
        }
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Append middleware; earlier entries wrap later ones.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn interrupt_policy(mut self, policy: InterruptPolicy) -> Self {
        self.interrupt_policy = policy;
        self
    }

    pub fn structured_output(mut self, structured: StructuredOutput) -> Self {
        self.structured = Some(structured);
        self
    }

    pub fn checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn generation_settings(mut self, settings: GenerationSettings) -> Self {
        self.generation = settings;
        self
    }

    /// Take executor limits, streaming, timeouts and retries from `config`.
    pub fn config(mut self, config: &TurnstileConfig) -> Self {
        self.settings = config.executor.clone();
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.settings.max_iterations = max_iterations;
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.settings.streaming = streaming;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.settings.retry = retry;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.settings.tool_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn event_sink(mut self, sink: TurnEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<TurnExecutor> {
        if self.settings.max_iterations == 0 {
            return Err(TurnstileError::Configuration(
                "max_iterations must be at least 1".into(),
            ));
        }

        let mut registry = ToolRegistry::new();
        for tool in self.tools {
            registry.register(tool)?;
        }

        if let Some(structured) = &self.structured {
            let provider = self.router.default_provider()?;
            structured.ensure_supported(self.router.default_model(), provider.capabilities())?;
            if structured.strategy == StructuredStrategy::Tool && registry.contains(&structured.name) {
                return Err(TurnstileError::Configuration(format!(
                    "structured output '{}' collides with a registered tool",
                    structured.name
                )));
            }
        }

        let router = Arc::new(self.router);
        let emitter = Arc::new(TurnEventEmitter::new(self.event_sink));
        let base_model = base_model_handler(ModelCallSettings {
            router: Arc::clone(&router),
            retry: self.settings.retry.clone(),
            streaming: self.settings.streaming,
            structured: self.structured.clone(),
            emitter: Arc::clone(&emitter),
        });
        let base_tool = base_tool_handler(self.settings.tool_timeout());
        let chain = MiddlewareChain::build(&self.middleware, base_model, base_tool);

        Ok(TurnExecutor {
            inner: Arc::new(ExecutorInner {
                router,
                tools: registry,
                chain,
                interrupt_policy: self.interrupt_policy,
                structured: self.structured,
                checkpoints: self
                    .checkpoints
                    .unwrap_or_else(|| Arc::new(InMemoryCheckpointStore::new())),
                store: self.store,
                system_prompt: self.system_prompt,
                generation: self.generation,
                max_iterations: self.settings.max_iterations,
                emitter,
                thread_locks: StdMutex::new(HashMap::new()),
            }),
        })
    }
}
