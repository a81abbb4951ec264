//! GenaiProvider: model access through the genai crate
//!
//! Handles every genai-native API (OpenAI, Anthropic, Gemini, ...) plus the
//! OpenAI-compatible ones routed by the service target resolver. Tool rounds
//! are flattened into plain text messages after the conversation.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

use genai::chat::{ChatRequest, ChatStreamEvent};
use genai::Client;

use crate::logging::Logger;
use crate::secrets::SecretStore;
use crate::types::{CancellationToken, ChatMessage, ToolDefinition, ToolExecutionRound};
use crate::{log_debug, log_error, log_info};

use super::error::{ProviderError, ProviderResult};
use super::genai_adapter::{
    create_client, from_genai_event, is_genai_supported, to_genai_messages, to_genai_options,
    to_genai_tools, ProviderConfig,
};
use super::traits::{ModelProvider, ProviderModelConfig, TurnStream};

pub struct GenaiProvider {
    provider_id: String,
    model: ProviderModelConfig,
    client: Client,
    logger: Arc<dyn Logger>,
}

impl GenaiProvider {
    pub fn new(
        provider_id: impl Into<String>,
        model: ProviderModelConfig,
        secrets: Arc<dyn SecretStore>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let provider_id = provider_id.into();
        let client = create_client(&ProviderConfig::new(provider_id.clone(), &model), secrets);
        Self {
            provider_id,
            model,
            client,
            logger,
        }
    }

    pub fn supports(provider_id: &str) -> bool {
        is_genai_supported(provider_id)
    }

    pub fn model(&self) -> &ProviderModelConfig {
        &self.model
    }

    /// Model name without a provider prefix ("openai/gpt-4" -> "gpt-4")
    pub fn extract_model_name(model: &str) -> &str {
        model.split_once('/').map(|(_, name)| name).unwrap_or(model)
    }

    /// Conversation followed by the flattened tool history
    fn request_messages(messages: &[ChatMessage], history: &[ToolExecutionRound]) -> Vec<ChatMessage> {
        let mut all = messages.to_vec();
        all.extend(ChatMessage::from_history(history));
        all
    }
}

#[async_trait]
impl ModelProvider for GenaiProvider {
    fn name(&self) -> &str {
        &self.provider_id
    }

    async fn stream_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        history: &[ToolExecutionRound],
        cancel: &CancellationToken,
    ) -> ProviderResult<TurnStream> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let model_name = Self::extract_model_name(&self.model.model);
        log_info!(
            self.logger,
            "[GenaiProvider] Streaming {}/{} with {} tools, {} prior rounds",
            self.provider_id,
            model_name,
            tools.len(),
            history.len()
        );

        let mut request = ChatRequest::new(to_genai_messages(&Self::request_messages(messages, history)));
        if !tools.is_empty() {
            request = request.with_tools(to_genai_tools(tools));
        }
        let options = to_genai_options(&self.model);

        let chat_stream = self
            .client
            .exec_chat_stream(model_name, request, Some(&options))
            .await
            .map_err(|e| ProviderError::from_genai(&self.provider_id, &e))?;

        let cancel = cancel.clone();
        let logger = Arc::clone(&self.logger);
        let provider_id = self.provider_id.clone();

        let stream = chat_stream.stream.filter_map(move |event| {
            let cancel = cancel.clone();
            let logger = Arc::clone(&logger);
            let provider_id = provider_id.clone();

            async move {
                if cancel.is_cancelled() {
                    logger.info("[GenaiProvider] Stream cancelled");
                    return Some(Err(ProviderError::Cancelled));
                }

                match event {
                    Ok(event) => {
                        if let ChatStreamEvent::End(_) = &event {
                            log_debug!(logger, "[GenaiProvider] Stream end for {}", provider_id);
                        }
                        from_genai_event(event)
                    }
                    Err(e) => {
                        log_error!(logger, "[GenaiProvider] Stream error: {}", e);
                        Some(Err(ProviderError::from_genai(provider_id, &e)))
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
