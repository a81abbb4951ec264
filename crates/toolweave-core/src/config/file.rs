//! File-based configuration provider (YAML)
//!
//! Supports user-level (~/.config/toolweave/connectors.yaml) and
//! workspace-level (.config/toolweave/connectors.yaml) files.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::{ConnectorConfig, EngineSettings};
use super::traits::{ConfigError, ConfigResult, ConnectorConfigProvider};

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub connectors: Vec<ConnectorConfig>,

    #[serde(default)]
    pub settings: EngineSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLevel {
    User,
    Workspace,
}

impl ConfigLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigLevel::User => "user",
            ConfigLevel::Workspace => "workspace",
        }
    }
}

/// Reads and writes connector configuration from a YAML file.
///
/// The parsed file is cached; `reload` re-reads it from disk. A missing
/// file reads as an empty configuration.
pub struct FileConfigProvider {
    path: PathBuf,
    level: ConfigLevel,
    cache: RwLock<Option<ConfigFile>>,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>, level: ConfigLevel) -> Self {
        Self {
            path: path.into(),
            level,
            cache: RwLock::new(None),
        }
    }

    /// User-level config provider (~/.config/toolweave/connectors.yaml)
    pub fn user() -> Self {
        let config_dir = dirs::config_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });
        Self::new(
            config_dir.join("toolweave").join("connectors.yaml"),
            ConfigLevel::User,
        )
    }

    /// Workspace-level config provider (.config/toolweave/connectors.yaml)
    pub fn workspace(workspace_root: impl AsRef<Path>) -> Self {
        let path = workspace_root
            .as_ref()
            .join(".config")
            .join("toolweave")
            .join("connectors.yaml");
        Self::new(path, ConfigLevel::Workspace)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn level(&self) -> ConfigLevel {
        self.level
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn load(&self) -> ConfigResult<ConfigFile> {
        if !self.path.exists() {
            return Ok(ConfigFile::default());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(ConfigFile::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    fn save(&self, config: &ConfigFile) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_yaml::to_string(config)?)?;
        *self.cache.write() = Some(config.clone());
        Ok(())
    }

    fn get_config(&self) -> ConfigResult<ConfigFile> {
        if let Some(config) = self.cache.read().as_ref() {
            return Ok(config.clone());
        }
        self.reload()
    }

    /// Re-read the file, replacing the cache
    pub fn reload(&self) -> ConfigResult<ConfigFile> {
        let config = self.load()?;
        *self.cache.write() = Some(config.clone());
        Ok(config)
    }

    pub fn set_settings(&self, settings: EngineSettings) -> ConfigResult<()> {
        let mut config = self.get_config()?;
        config.settings = settings;
        self.save(&config)
    }
}

impl std::fmt::Debug for FileConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConfigProvider")
            .field("path", &self.path)
            .field("level", &self.level)
            .field("exists", &self.exists())
            .finish()
    }
}

#[async_trait]
impl ConnectorConfigProvider for FileConfigProvider {
    async fn get_connectors(&self) -> Vec<ConnectorConfig> {
        self.get_config().map(|c| c.connectors).unwrap_or_default()
    }

    async fn settings(&self) -> EngineSettings {
        self.get_config().map(|c| c.settings).unwrap_or_default()
    }

    async fn update_connector(&self, id: &str, config: ConnectorConfig) -> ConfigResult<()> {
        let mut file_config = self.get_config()?;
        match file_config.connectors.iter_mut().find(|c| c.id == id) {
            Some(slot) => *slot = config,
            None => return Err(ConfigError::ConnectorNotFound(id.to_string())),
        }
        self.save(&file_config)
    }

    async fn add_connector(&self, config: ConnectorConfig) -> ConfigResult<()> {
        let mut file_config = self.get_config()?;
        if file_config.connectors.iter().any(|c| c.id == config.id) {
            return Err(ConfigError::ConnectorExists(config.id));
        }
        file_config.connectors.push(config);
        self.save(&file_config)
    }

    async fn remove_connector(&self, id: &str) -> ConfigResult<()> {
        let mut file_config = self.get_config()?;
        let original_len = file_config.connectors.len();
        file_config.connectors.retain(|c| c.id != id);
        if file_config.connectors.len() == original_len {
            return Err(ConfigError::ConnectorNotFound(id.to_string()));
        }
        self.save(&file_config)
    }
}
