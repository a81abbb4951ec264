//! Scripted mock provider for testing
//!
//! Replays a queue of `MockStep`s, one per model turn, and records every
//! request it receives. Once the script runs out it falls back to a fixed
//! step, or echoes the last user message.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use super::error::{ProviderError, ProviderResult};
use super::traits::{ModelProvider, TurnStream};
use crate::logging::Logger;
use crate::types::{
    CancellationToken, ChatMessage, MessageRole, ToolCallRequest, ToolDefinition,
    ToolExecutionRound, TurnChunk,
};

/// One scripted model turn
#[derive(Debug, Clone, PartialEq)]
pub enum MockStep {
    /// Plain answer; the turn completes
    Text(String),
    /// Optional text followed by tool requests
    ToolCalls {
        text: String,
        calls: Vec<ToolCallRequest>,
    },
    /// The turn fails
    Error(String),
}

impl MockStep {
    pub fn text(text: impl Into<String>) -> Self {
        MockStep::Text(text.into())
    }

    pub fn call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        MockStep::ToolCalls {
            text: String::new(),
            calls: vec![ToolCallRequest::new(name, arguments)],
        }
    }
}

/// What the provider was asked for on one turn
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub messages: Vec<ChatMessage>,
    pub tool_names: Vec<String>,
    pub history: Vec<ToolExecutionRound>,
}

pub struct MockProvider {
    script: Mutex<VecDeque<MockStep>>,
    fallback: Option<MockStep>,
    requests: Mutex<Vec<MockRequest>>,
    chunk_size: usize,
    chunk_delay: Duration,
    logger: Arc<dyn Logger>,
}

impl MockProvider {
    /// Echoes the last user message on every turn
    pub fn echo(logger: Arc<dyn Logger>) -> Self {
        Self::scripted(Vec::new(), logger)
    }

    pub fn scripted(steps: Vec<MockStep>, logger: Arc<dyn Logger>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
            chunk_size: 10,
            chunk_delay: Duration::ZERO,
            logger,
        }
    }

    /// Requests the same tool on every turn
    pub fn always_call(
        name: impl Into<String>,
        arguments: serde_json::Value,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self::scripted(Vec::new(), logger).with_fallback(MockStep::call(name, arguments))
    }

    pub fn with_fallback(mut self, step: MockStep) -> Self {
        self.fallback = Some(step);
        self
    }

    /// Characters per text chunk; 0 sends the text whole
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_step(&self, messages: &[ChatMessage]) -> MockStep {
        if let Some(step) = self.script.lock().pop_front() {
            return step;
        }
        match &self.fallback {
            Some(step) => step.clone(),
            None => MockStep::Text(format!("Echo: {}", last_user_message(messages))),
        }
    }

    fn split_into_chunks(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        if self.chunk_size == 0 {
            return vec![text.to_string()];
        }
        text.chars()
            .collect::<Vec<_>>()
            .chunks(self.chunk_size)
            .map(|c| c.iter().collect())
            .collect()
    }
}

fn last_user_message(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User && !m.content.is_empty())
        .map(|m| m.content.as_str())
        .unwrap_or("Hello from MockProvider!")
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        history: &[ToolExecutionRound],
        cancel: &CancellationToken,
    ) -> ProviderResult<TurnStream> {
        self.requests.lock().push(MockRequest {
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            history: history.to_vec(),
        });

        let step = self.next_step(messages);
        self.logger.debug(&format!("[MockProvider] Turn {}: {:?}", self.call_count(), step));

        let items: Vec<ProviderResult<TurnChunk>> = match step {
            MockStep::Text(text) => self
                .split_into_chunks(&text)
                .into_iter()
                .map(|c| Ok(TurnChunk::text(c)))
                .chain(std::iter::once(Ok(TurnChunk::Complete { tool_calls: Vec::new() })))
                .collect(),
            MockStep::ToolCalls { text, calls } => self
                .split_into_chunks(&text)
                .into_iter()
                .map(|c| Ok(TurnChunk::text(c)))
                .chain(std::iter::once(Ok(TurnChunk::Complete { tool_calls: calls })))
                .collect(),
            MockStep::Error(message) => {
                vec![Err(ProviderError::Other(format!("Mock error: {}", message)))]
            }
        };

        let delay = self.chunk_delay;
        let cancel = cancel.clone();
        let stream = stream::iter(items.into_iter().enumerate()).then(move |(i, item)| {
            let cancel = cancel.clone();
            async move {
                if i > 0 && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if cancel.is_cancelled() {
                    return Err(ProviderError::Cancelled);
                }
                item
            }
        });

        Ok(Box::pin(stream))
    }
}
