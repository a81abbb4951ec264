//! Chat message types

use serde::{Deserialize, Serialize};

use super::tool::{ToolExecutionRound, ToolResult};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A chat message sent to a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// A user message carrying tool results back to the model
    pub fn tool_results(results: &[ToolResult]) -> Self {
        let body = results
            .iter()
            .map(|r| {
                if r.is_success() {
                    format!("[Tool result for {}]: {}", r.call_id, r.text())
                } else {
                    format!("[Tool error for {}]: {}", r.call_id, r.text())
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        Self::user(body)
    }

    /// Flatten tool rounds into alternating assistant/user messages for
    /// providers without native tool-history support
    pub fn from_history(history: &[ToolExecutionRound]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() * 2);
        for round in history {
            let calls = round
                .tool_calls
                .iter()
                .map(|c| {
                    format!(
                        "[Tool call {}]: {}({})",
                        c.id,
                        c.tool_name,
                        serde_json::Value::Object(c.arguments.clone())
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            let assistant = if round.assistant_text.is_empty() {
                calls
            } else {
                format!("{}\n{}", round.assistant_text, calls)
            };
            messages.push(ChatMessage::assistant(assistant));
            messages.push(ChatMessage::tool_results(&round.results));
        }
        messages
    }
}
