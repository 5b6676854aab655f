//! Turn execution: the executor state machine, approvals, events, and
//! sub-agents wrapped as tools.

pub mod approvals;
pub mod events;
pub mod executor;
mod model_call;
pub mod subagent;
mod tooling;
pub mod types;

pub use approvals::{InterruptOnConfig, InterruptPolicy};
pub use events::{TurnEvent, TurnEventPayload, TurnEventSink};
pub use executor::{TurnExecutor, TurnExecutorBuilder};
pub use subagent::{SubAgentApprover, SubAgentTool};
pub use types::{Decision, DecisionKind, Interrupt, Phase, TurnResult};
