//! Core traits and types for secret storage

use thiserror::Error;

/// Information about a secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretInfo {
    pub available: bool,
    /// Which store provided the secret (useful for chain stores)
    pub source: String,
}

impl SecretInfo {
    pub fn new(available: bool, source: impl Into<String>) -> Self {
        Self {
            available,
            source: source.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(false, "none")
    }
}

#[derive(Error, Debug)]
pub enum SecretStoreError {
    #[error("Store is read-only")]
    ReadOnly,

    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Store not available: {0}")]
    NotAvailable(String),

    #[error("A chain store needs at least one store")]
    EmptyChain,

    #[error("Write store index {index} is out of bounds for {len} stores")]
    WriteIndexOutOfBounds { index: usize, len: usize },

    #[error("Store error: {0}")]
    Other(String),
}

pub type SecretStoreResult<T> = Result<T, SecretStoreError>;

/// Key under which a connector's secret value is stored: `"<connector-id>/<NAME>"`
pub fn connector_secret_key(connector_id: &str, name: &str) -> String {
    format!("{}/{}", connector_id, name)
}

/// Trait for secret storage implementations
///
/// Connector secrets (API tokens passed as env vars or HTTP headers) are
/// looked up with keys built by [`connector_secret_key`].
pub trait SecretStore: Send + Sync {
    /// Human-readable name of this store
    fn name(&self) -> &str;

    /// A keychain store might not be available on a headless server
    fn is_available(&self) -> bool {
        true
    }

    fn get(&self, key: &str) -> Option<String>;

    /// Returns `Err(SecretStoreError::ReadOnly)` if the store doesn't support writing
    fn store(&self, key: &str, value: &str) -> SecretStoreResult<()>;

    fn delete(&self, key: &str) -> SecretStoreResult<()>;

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn get_info(&self, key: &str) -> SecretInfo {
        if self.has(key) {
            SecretInfo::new(true, self.name())
        } else {
            SecretInfo::not_found()
        }
    }
}
