//! In-memory configuration provider

use async_trait::async_trait;
use parking_lot::RwLock;

use super::settings::{ConnectorConfig, EngineSettings};
use super::traits::{ConfigError, ConfigResult, ConnectorConfigProvider};

/// In-memory configuration provider for testing
#[derive(Debug, Default)]
pub struct MemoryConfigProvider {
    connectors: RwLock<Vec<ConnectorConfig>>,
    settings: RwLock<EngineSettings>,
}

impl MemoryConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connectors(connectors: Vec<ConnectorConfig>) -> Self {
        Self {
            connectors: RwLock::new(connectors),
            settings: RwLock::new(EngineSettings::default()),
        }
    }

    pub fn set_settings(&self, settings: EngineSettings) {
        *self.settings.write() = settings;
    }
}

#[async_trait]
impl ConnectorConfigProvider for MemoryConfigProvider {
    async fn get_connectors(&self) -> Vec<ConnectorConfig> {
        self.connectors.read().clone()
    }

    async fn settings(&self) -> EngineSettings {
        self.settings.read().clone()
    }

    async fn update_connector(&self, id: &str, config: ConnectorConfig) -> ConfigResult<()> {
        let mut guard = self.connectors.write();
        match guard.iter_mut().find(|c| c.id == id) {
            Some(slot) => {
                *slot = config;
                Ok(())
            }
            None => Err(ConfigError::ConnectorNotFound(id.to_string())),
        }
    }

    async fn add_connector(&self, config: ConnectorConfig) -> ConfigResult<()> {
        let mut guard = self.connectors.write();
        if guard.iter().any(|c| c.id == config.id) {
            return Err(ConfigError::ConnectorExists(config.id));
        }
        guard.push(config);
        Ok(())
    }

    async fn remove_connector(&self, id: &str) -> ConfigResult<()> {
        let mut guard = self.connectors.write();
        let original_len = guard.len();
        guard.retain(|c| c.id != id);
        if guard.len() == original_len {
            Err(ConfigError::ConnectorNotFound(id.to_string()))
        } else {
            Ok(())
        }
    }
}
