//! Core turn types: phases, interrupts, decisions, results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::types::{Message, ToolCall};

/// Executor state recorded in each checkpoint.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    #[default]
    BuildingRequest,
    CallingModel,
    ExecutingTools,
    Suspended,
    Done,
    Failed,
}

/// The kind of a [`Decision`], used to declare what an interrupt accepts.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DecisionKind {
    Approve,
    Reject,
    Edit,
}

impl DecisionKind {
    pub const ALL: [DecisionKind; 3] = [Self::Approve, Self::Reject, Self::Edit];
}

/// A human's answer to an [`Interrupt`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    /// Execute the pending action unchanged.
    Approve,
    /// Do not execute; record a declined result carrying `message` if given.
    Reject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Execute `edited_action` instead. Its id must be the pending call's id
    /// or empty (adopts the pending id).
    Edit { edited_action: ToolCall },
}

impl Decision {
    pub fn reject() -> Self {
        Self::Reject { message: None }
    }

    pub fn reject_with(message: impl Into<String>) -> Self {
        Self::Reject {
            message: Some(message.into()),
        }
    }

    pub fn edit(edited_action: ToolCall) -> Self {
        Self::Edit { edited_action }
    }

    pub fn kind(&self) -> DecisionKind {
        match self {
            Self::Approve => DecisionKind::Approve,
            Self::Reject { .. } => DecisionKind::Reject,
            Self::Edit { .. } => DecisionKind::Edit,
        }
    }
}

/// A pause point awaiting a decision on one pending tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interrupt {
    pub id: String,
    pub reason: String,
    pub description: String,
    pub pending_action: ToolCall,
    pub allowed_decisions: Vec<DecisionKind>,
}

impl Interrupt {
    pub fn new(
        pending_action: ToolCall,
        description: impl Into<String>,
        allowed_decisions: Vec<DecisionKind>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            reason: "tool_approval_required".into(),
            description: description.into(),
            pending_action,
            allowed_decisions,
        }
    }

    pub fn allows(&self, kind: DecisionKind) -> bool {
        self.allowed_decisions.contains(&kind)
    }
}

/// Outcome of `start_turn` / `resume_turn`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnResult {
    Done {
        message: Message,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        structured_response: Option<Value>,
    },
    Suspended {
        interrupts: Vec<Interrupt>,
    },
}

impl TurnResult {
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended { .. })
    }

    /// Open interrupts, empty when done.
    pub fn interrupts(&self) -> &[Interrupt] {
        match self {
            Self::Suspended { interrupts } => interrupts,
            Self::Done { .. } => &[],
        }
    }

    /// Final assistant message, if the turn finished.
    pub fn message(&self) -> Option<&Message> {
        match self {
            Self::Done { message, .. } => Some(message),
            Self::Suspended { .. } => None,
        }
    }

    pub fn structured_response(&self) -> Option<&Value> {
        match self {
            Self::Done {
                structured_response,
                ..
            } => structured_response.as_ref(),
            Self::Suspended { .. } => None,
        }
    }
}
