//! Connector configuration provider trait

use async_trait::async_trait;

use super::settings::{ConnectorConfig, EngineSettings};

/// Source of configured connectors and engine settings
///
/// Implementations:
/// - `MemoryConfigProvider`: In-memory for testing
/// - `FileConfigProvider`: YAML file (~/.config/toolweave/connectors.yaml)
#[async_trait]
pub trait ConnectorConfigProvider: Send + Sync {
    async fn get_connectors(&self) -> Vec<ConnectorConfig>;

    async fn settings(&self) -> EngineSettings;

    async fn update_connector(&self, id: &str, config: ConnectorConfig) -> ConfigResult<()>;

    async fn add_connector(&self, config: ConnectorConfig) -> ConfigResult<()>;

    async fn remove_connector(&self, id: &str) -> ConfigResult<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Connector not found: {0}")]
    ConnectorNotFound(String),

    #[error("Connector already exists: {0}")]
    ConnectorExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Other(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
