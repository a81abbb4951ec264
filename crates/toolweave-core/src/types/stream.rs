//! Streaming types: model turn chunks and generation events

use serde::{Deserialize, Serialize};

use super::tool::{ToolCall, ToolCallRequest, ToolExecutionRound, ToolResult};

/// Chunk of one streamed model turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnChunk {
    /// Incremental text
    Text { text: String },
    /// End of the turn, with any tool calls the model requested
    Complete {
        #[serde(rename = "toolCalls")]
        tool_calls: Vec<ToolCallRequest>,
    },
}

impl TurnChunk {
    pub fn text(text: impl Into<String>) -> Self {
        TurnChunk::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TurnChunk::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Lifecycle state of a tool call, as reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Denied,
}

/// Event emitted while a tool-enabled generation runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    ContentChunk {
        text: String,
    },
    ToolCallsStarted {
        calls: Vec<ToolCall>,
    },
    ToolCallUpdated {
        id: String,
        state: ToolCallState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(rename = "durationMs", default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    ToolResultReady {
        result: ToolResult,
    },
    ToolRoundCompleted {
        round: ToolExecutionRound,
    },
    GenerationComplete {
        text: String,
        history: Vec<ToolExecutionRound>,
        /// Set when the round cap ended the loop
        forced: bool,
    },
    GenerationInterrupted {
        history: Vec<ToolExecutionRound>,
        error: String,
    },
}

impl GenerationEvent {
    /// Update event describing a finished result
    pub fn updated_from(result: &ToolResult, state: ToolCallState) -> Self {
        let (summary, error) = if result.is_success() {
            (Some(summarize(result.text())), None)
        } else {
            (None, Some(result.text().to_string()))
        };
        GenerationEvent::ToolCallUpdated {
            id: result.call_id.clone(),
            state,
            summary,
            error,
            duration_ms: Some(result.duration.as_millis() as u64),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GenerationEvent::GenerationComplete { .. } | GenerationEvent::GenerationInterrupted { .. }
        )
    }
}

const SUMMARY_CHARS: usize = 120;

fn summarize(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or_default();
    if first_line.chars().count() > SUMMARY_CHARS {
        let cut: String = first_line.chars().take(SUMMARY_CHARS).collect();
        format!("{}...", cut)
    } else {
        first_line.to_string()
    }
}
