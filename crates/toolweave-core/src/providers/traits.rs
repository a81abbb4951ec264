//! Model provider trait definition

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

use super::error::ProviderResult;
use crate::types::{
    CancellationToken, ChatMessage, ToolCallRequest, ToolDefinition, ToolExecutionRound, TurnChunk,
};

/// Model configuration for provider requests
#[derive(Debug, Clone)]
pub struct ProviderModelConfig {
    /// Model identifier as used by the provider's API
    pub model: String,
    /// API key; looked up in the secret store when absent
    pub api_key: Option<String>,
    /// Custom API base URL
    pub api_base: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ProviderModelConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: None,
            api_base: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }
}

/// One complete model turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
    /// The model finished without requesting tools
    pub is_complete: bool,
}

impl ModelTurn {
    pub fn complete(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
            is_complete: true,
        }
    }

    pub fn with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        let is_complete = tool_calls.is_empty();
        Self {
            text: text.into(),
            tool_calls,
            is_complete,
        }
    }
}

/// Streamed model turn: text chunks, then one `TurnChunk::Complete`
pub type TurnStream = Pin<Box<dyn Stream<Item = ProviderResult<TurnChunk>> + Send>>;

/// Fold a turn stream into a `ModelTurn`, reporting text as it arrives.
///
/// A stream that ends without `Complete` is treated as a finished turn.
pub async fn collect_turn<F>(mut stream: TurnStream, mut on_text: F) -> ProviderResult<ModelTurn>
where
    F: FnMut(&str) + Send,
{
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    while let Some(chunk) = stream.next().await {
        match chunk? {
            TurnChunk::Text { text: piece } => {
                on_text(&piece);
                text.push_str(&piece);
            }
            TurnChunk::Complete { tool_calls: calls } => tool_calls = calls,
        }
    }
    Ok(ModelTurn::with_tool_calls(text, tool_calls))
}

/// The "generate with tools" contract
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "openai", "mock")
    fn name(&self) -> &str;

    /// Stream one turn. `history` holds the tool rounds of this request so far.
    async fn stream_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        history: &[ToolExecutionRound],
        cancel: &CancellationToken,
    ) -> ProviderResult<TurnStream>;

    /// Tool-free generation
    async fn generate(
        &self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> ProviderResult<String> {
        let stream = self.stream_with_tools(messages, &[], &[], cancel).await?;
        Ok(collect_turn(stream, |_| {}).await?.text)
    }

    async fn generate_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        history: &[ToolExecutionRound],
        cancel: &CancellationToken,
    ) -> ProviderResult<ModelTurn> {
        let stream = self.stream_with_tools(messages, tools, history, cancel).await?;
        collect_turn(stream, |_| {}).await
    }
}
