//! Model providers
//!
//! `ModelProvider` is the "generate with tools" contract the chat service
//! drives. `GenaiProvider` covers real APIs through the `genai` crate, with
//! OpenAI-compatible services (Azure, OpenRouter, Mistral, Red Hat AI) routed
//! by its `ServiceTargetResolver`. `MockProvider` replays scripted turns.

mod error;
mod genai_adapter;
mod genai_provider;
mod mock;
mod traits;

pub use error::{ProviderError, ProviderResult};
pub use genai_adapter::{is_genai_native, is_genai_supported, provider_to_secret_key, ProviderConfig};
pub use genai_provider::GenaiProvider;
pub use mock::{MockProvider, MockRequest, MockStep};
pub use traits::{collect_turn, ModelProvider, ModelTurn, ProviderModelConfig, TurnStream};

use crate::logging::Logger;
use crate::secrets::SecretStore;
use std::sync::Arc;

/// Create a provider for the given provider id.
///
/// `mock` yields an echoing `MockProvider`; anything else goes through
/// `GenaiProvider`, which treats unknown ids as OpenAI-compatible endpoints
/// when `api_base` is set.
pub fn create_provider(
    provider_id: &str,
    model: ProviderModelConfig,
    secrets: Arc<dyn SecretStore>,
    logger: Arc<dyn Logger>,
) -> Arc<dyn ModelProvider> {
    match provider_id.to_lowercase().as_str() {
        "mock" => Arc::new(MockProvider::echo(logger)),
        _ => Arc::new(GenaiProvider::new(provider_id, model, secrets, logger)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NoOpLogger;
    use crate::secrets::MemorySecretStore;

    #[test]
    fn test_create_provider() {
        let secrets: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let mock = create_provider("Mock", ProviderModelConfig::new("m"), Arc::clone(&secrets), Arc::new(NoOpLogger));
        assert_eq!(mock.name(), "mock");

        let openai = create_provider("openai", ProviderModelConfig::new("openai/gpt-4o"), secrets, Arc::new(NoOpLogger));
        assert_eq!(openai.name(), "openai");
    }
}
