//! Connector configuration and engine settings
//!
//! - `MemoryConfigProvider`: In-memory for testing
//! - `FileConfigProvider`: YAML file-based (user/workspace level)

mod traits;
mod settings;
mod memory;
mod file;

pub use traits::{ConfigError, ConfigResult, ConnectorConfigProvider};
pub use settings::{
    ConnectorConfig, ConnectorTransportConfig, EngineSettings, LocalCommandSettings, RetryPolicy,
};
pub use memory::MemoryConfigProvider;
pub use file::{ConfigFile, ConfigLevel, FileConfigProvider};
