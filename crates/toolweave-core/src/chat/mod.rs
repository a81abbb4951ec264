//! Tool-enabled chat: the model/tool loop and its approval gate

mod approval;
mod service;

pub use approval::{
    ApprovalDecision, ApprovalGate, ApprovalHandler, ApprovalRequest, ApprovalResponse,
    AutoApprove, DenyAll, TimedApprovalGate,
};
pub use service::{GenerationOutcome, GenerationStream, ToolEnabledChatService};

use crate::providers::ProviderError;
use crate::types::ToolExecutionRound;

/// Errors that end a generation request
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Generation interrupted after {} tool rounds: {source}", .rounds.len())]
    Interrupted {
        rounds: Vec<ToolExecutionRound>,
        source: ProviderError,
    },

    #[error("Generation cancelled after {} tool rounds", .rounds.len())]
    Cancelled { rounds: Vec<ToolExecutionRound> },
}

impl ChatError {
    /// Tool rounds completed before the failure
    pub fn rounds(&self) -> &[ToolExecutionRound] {
        match self {
            ChatError::Interrupted { rounds, .. } | ChatError::Cancelled { rounds } => rounds,
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
