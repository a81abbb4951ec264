//! Conversions between toolweave types and genai types
//!
//! Auth flows through the injected `SecretStore`, not genai's default env var
//! lookup, so connector and model keys come from the same place.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use genai::chat::{
    ChatMessage as GenaiMessage, ChatOptions as GenaiOptions, ChatRole as GenaiRole,
    ChatStreamEvent, Tool as GenaiTool, ToolCall as GenaiToolCall,
};
use genai::resolver::{AuthData, AuthResolver, Endpoint, ServiceTargetResolver};
use genai::{adapter::AdapterKind, Client, ModelIden, ServiceTarget};

use crate::secrets::SecretStore;
use crate::types::{ChatMessage, MessageRole, ToolCallRequest, ToolDefinition, TurnChunk};

use super::error::ProviderResult;
use super::traits::ProviderModelConfig;

pub fn to_genai_role(role: MessageRole) -> GenaiRole {
    match role {
        MessageRole::System => GenaiRole::System,
        MessageRole::User => GenaiRole::User,
        MessageRole::Assistant => GenaiRole::Assistant,
    }
}

pub fn to_genai_message(msg: &ChatMessage) -> GenaiMessage {
    let content = msg.content.clone();
    match msg.role {
        MessageRole::System => GenaiMessage::system(content),
        MessageRole::User => GenaiMessage::user(content),
        MessageRole::Assistant => GenaiMessage::assistant(content),
    }
}

pub fn to_genai_messages(messages: &[ChatMessage]) -> Vec<GenaiMessage> {
    messages.iter().map(to_genai_message).collect()
}

pub fn to_genai_tool(tool: &ToolDefinition) -> GenaiTool {
    GenaiTool::new(tool.name.clone())
        .with_description(tool.description.clone())
        .with_schema(tool.input_schema.clone())
}

pub fn to_genai_tools(tools: &[ToolDefinition]) -> Vec<GenaiTool> {
    tools.iter().map(to_genai_tool).collect()
}

pub fn to_genai_options(config: &ProviderModelConfig) -> GenaiOptions {
    let mut options = GenaiOptions::default();
    if let Some(temp) = config.temperature {
        options = options.with_temperature(temp as f64);
    }
    if let Some(max_tokens) = config.max_tokens {
        options = options.with_max_tokens(max_tokens);
    }
    // Tool calls are read back from the End event
    options.with_capture_tool_calls(true)
}

pub fn from_genai_tool_call(tc: &GenaiToolCall) -> ToolCallRequest {
    ToolCallRequest::new(tc.fn_name.clone(), tc.fn_arguments.clone()).with_id(tc.call_id.clone())
}

/// Convert a genai stream event into a turn chunk.
///
/// Partial tool call chunks are skipped; the complete calls arrive with `End`.
pub fn from_genai_event(event: ChatStreamEvent) -> Option<ProviderResult<TurnChunk>> {
    match event {
        ChatStreamEvent::Chunk(chunk) if chunk.content.is_empty() => None,
        ChatStreamEvent::Chunk(chunk) => Some(Ok(TurnChunk::text(chunk.content))),
        ChatStreamEvent::End(end) => {
            let tool_calls = end
                .captured_tool_calls()
                .map(|calls| calls.iter().map(|tc| from_genai_tool_call(tc)).collect())
                .unwrap_or_default();
            Some(Ok(TurnChunk::Complete { tool_calls }))
        }
        _ => None,
    }
}

/// Routing information for one provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider identifier (e.g., "openai", "azure", "openrouter")
    pub provider: String,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
}

impl ProviderConfig {
    pub fn new(provider: impl Into<String>, model: &ProviderModelConfig) -> Self {
        Self {
            provider: provider.into(),
            api_key: model.api_key.clone(),
            api_base: model.api_base.clone(),
        }
    }
}

/// Secret store key holding a provider's API key
pub fn provider_to_secret_key(provider: &str) -> String {
    match provider.to_lowercase().as_str() {
        "gemini" | "google" => "GOOGLE_API_KEY".to_string(),
        "azure" => "AZURE_OPENAI_API_KEY".to_string(),
        "xai" => "XAI_API_KEY".to_string(),
        "redhat" | "rhel" | "rhai" => "REDHAT_API_KEY".to_string(),
        other => format!(
            "{}_API_KEY",
            other
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
                .collect::<String>()
        ),
    }
}

/// Secret store key for a genai adapter, used when no provider id is known
pub fn adapter_kind_to_secret_key(adapter: AdapterKind) -> String {
    match adapter {
        AdapterKind::OpenAI => "OPENAI_API_KEY".to_string(),
        AdapterKind::Anthropic => "ANTHROPIC_API_KEY".to_string(),
        AdapterKind::Gemini => "GOOGLE_API_KEY".to_string(),
        AdapterKind::Ollama => "OLLAMA_API_KEY".to_string(),
        AdapterKind::Groq => "GROQ_API_KEY".to_string(),
        AdapterKind::Xai => "XAI_API_KEY".to_string(),
        AdapterKind::DeepSeek => "DEEPSEEK_API_KEY".to_string(),
        AdapterKind::Cohere => "COHERE_API_KEY".to_string(),
        _ => format!("{:?}_API_KEY", adapter).to_uppercase(),
    }
}

/// Build a genai client whose auth and endpoints come from `config` and `secrets`
pub fn create_client(config: &ProviderConfig, secrets: Arc<dyn SecretStore>) -> Client {
    let auth_provider = config.provider.clone();
    let explicit_key = config.api_key.clone();

    let auth_resolver = AuthResolver::from_resolver_async_fn(
        move |model_iden: ModelIden| -> Pin<Box<dyn Future<Output = genai::resolver::Result<Option<AuthData>>> + Send>> {
            let provider = auth_provider.clone();
            let explicit_key = explicit_key.clone();
            let secrets = Arc::clone(&secrets);
            let adapter_kind = model_iden.adapter_kind;

            Box::pin(async move {
                if let Some(key) = explicit_key {
                    return Ok(Some(AuthData::from_single(key)));
                }
                let secret_key = if provider.is_empty() {
                    adapter_kind_to_secret_key(adapter_kind)
                } else {
                    provider_to_secret_key(&provider)
                };
                // Keyless providers such as ollama resolve to None
                Ok(secrets.get(&secret_key).map(AuthData::from_single))
            })
        },
    );

    let target_provider = config.provider.to_lowercase();
    let target_api_base = config.api_base.clone();

    let target_resolver = ServiceTargetResolver::from_resolver_fn(
        move |target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error> {
            let custom_base = target_api_base.as_ref().map(|u| Endpoint::from_owned(u.clone()));

            let (endpoint, adapter_kind) = match target_provider.as_str() {
                "openrouter" => (
                    Some(Endpoint::from_static("https://openrouter.ai/api/v1/")),
                    AdapterKind::OpenAI,
                ),
                "mistral" => (
                    Some(Endpoint::from_static("https://api.mistral.ai/v1/")),
                    AdapterKind::OpenAI,
                ),
                "azure" | "redhat" | "rhel" | "rhai" => (custom_base, AdapterKind::OpenAI),
                // Native adapters keep their protocol; an explicit base only moves the endpoint
                _ if custom_base.is_some() => (custom_base, target.model.adapter_kind),
                _ => return Ok(target),
            };

            Ok(ServiceTarget {
                endpoint: endpoint.unwrap_or(target.endpoint),
                auth: target.auth,
                model: ModelIden::new(adapter_kind, target.model.model_name.clone()),
            })
        },
    );

    Client::builder()
        .with_auth_resolver(auth_resolver)
        .with_service_target_resolver(target_resolver)
        .build()
}

pub fn is_genai_native(provider: &str) -> bool {
    matches!(
        provider.to_lowercase().as_str(),
        "openai"
            | "anthropic"
            | "gemini"
            | "ollama"
            | "groq"
            | "xai"
            | "deepseek"
            | "cohere"
            | "fireworks"
            | "together"
    )
}

/// Native, or reachable through an OpenAI-compatible endpoint
pub fn is_genai_supported(provider: &str) -> bool {
    is_genai_native(provider)
        || matches!(
            provider.to_lowercase().as_str(),
            "azure" | "openrouter" | "mistral" | "redhat" | "rhel" | "rhai"
        )
}
