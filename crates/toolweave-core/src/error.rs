//! Error types shared by connectors, the registry and the executor

use std::time::Duration;
use thiserror::Error;

/// Failure to bring a connector up
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Tool listing timed out after {0:?}")]
    ListToolsTimeout(Duration),

    #[error("Transport failed: {0}")]
    Transport(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Tool listing failed: {0}")]
    ListTools(String),

    #[error("Missing secret: {0}")]
    MissingSecret(String),

    #[error("Connector {0} is disabled")]
    Disabled(String),

    #[error("Connector {0} is already connecting")]
    InProgress(String),

    #[error("Connect was superseded by a disconnect")]
    Superseded,
}

impl ConnectionError {
    /// Whether the registry should schedule a reconnect after this failure
    pub fn should_retry(&self) -> bool {
        !matches!(
            self,
            ConnectionError::MissingSecret(_)
                | ConnectionError::Disabled(_)
                | ConnectionError::InProgress(_)
                | ConnectionError::Superseded
        )
    }
}

/// Failure to run a tool call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Connector not found: {0}")]
    ConnectorNotFound(String),

    #[error("Connector {0} is not connected")]
    NotConnected(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Tool call cancelled")]
    Cancelled,

    #[error("Tool call timed out after {0:?}")]
    Timeout(Duration),
}

impl ToolError {
    /// Connection-related failures are worth retrying; lookup and validation failures are not
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ToolError::NotConnected(_) | ToolError::Transport(_) | ToolError::Timeout(_)
        )
    }
}

/// Failure to obtain an approval decision
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("Approval request cancelled")]
    Cancelled,

    #[error("Approval request timed out")]
    TimedOut,
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;
pub type ToolExecResult<T> = Result<T, ToolError>;
