//! System keychain secret store
//!
//! Uses the OS keychain for secret storage:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring, KWallet)

use keyring::Entry;
use std::sync::Arc;

use super::traits::{SecretStore, SecretStoreError, SecretStoreResult};
use crate::logging::{Logger, NoOpLogger};

/// Secret store backed by the system keychain
///
/// Entries are namespaced by service name; connector secrets live under
/// `toolweave` / `<connector-id>/<NAME>` by default.
pub struct KeychainSecretStore {
    service_name: String,
    logger: Arc<dyn Logger>,
}

impl KeychainSecretStore {
    pub fn new() -> Self {
        Self::with_service("toolweave")
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service_name: service.into(),
            logger: Arc::new(NoOpLogger),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    fn entry(&self, key: &str) -> SecretStoreResult<Entry> {
        Entry::new(&self.service_name, key)
            .map_err(|e| SecretStoreError::Other(format!("Failed to create keychain entry: {}", e)))
    }
}

impl Default for KeychainSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeychainSecretStore {
    fn name(&self) -> &str {
        "keychain"
    }

    fn is_available(&self) -> bool {
        match Entry::new(&self.service_name, "__toolweave_availability_check__") {
            Ok(_) => true,
            Err(e) => {
                self.logger.warn(&format!("[KeychainSecretStore] Keychain unavailable: {}", e));
                false
            }
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        let entry = match self.entry(key) {
            Ok(entry) => entry,
            Err(e) => {
                self.logger.error(&format!("[KeychainSecretStore] {}", e));
                return None;
            }
        };
        match entry.get_password() {
            Ok(password) => Some(password),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                self.logger.warn(&format!("[KeychainSecretStore] Failed to read '{}': {}", key, e));
                None
            }
        }
    }

    fn store(&self, key: &str, value: &str) -> SecretStoreResult<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| SecretStoreError::Other(format!("Failed to store in keychain: {}", e)))?;
        self.logger.debug(&format!("[KeychainSecretStore] Stored '{}'", key));
        Ok(())
    }

    fn delete(&self, key: &str) -> SecretStoreResult<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(SecretStoreError::Other(format!(
                "Failed to delete from keychain: {}",
                e
            ))),
        }
    }
}
