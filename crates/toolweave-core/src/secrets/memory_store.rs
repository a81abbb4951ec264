//! In-memory secret store

use parking_lot::RwLock;
use std::collections::HashMap;

use super::traits::{connector_secret_key, SecretStore, SecretStoreResult};

/// Read-write secret store kept in memory; contents are lost on drop
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secrets(initial: HashMap<String, String>) -> Self {
        Self {
            secrets: RwLock::new(initial),
        }
    }

    /// Add a secret under `"<connector-id>/<NAME>"`
    pub fn with_connector_secret(self, connector_id: &str, name: &str, value: impl Into<String>) -> Self {
        self.secrets
            .write()
            .insert(connector_secret_key(connector_id, name), value.into());
        self
    }

    /// Keys stored for one connector, without the connector prefix
    pub fn connector_names(&self, connector_id: &str) -> Vec<String> {
        let prefix = format!("{}/", connector_id);
        let mut names: Vec<String> = self
            .secrets
            .read()
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.secrets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SecretStore for MemorySecretStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: &str) -> Option<String> {
        self.secrets.read().get(key).cloned()
    }

    fn store(&self, key: &str, value: &str) -> SecretStoreResult<()> {
        self.secrets.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> SecretStoreResult<()> {
        self.secrets.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_crud() {
        let store = MemorySecretStore::new();
        assert!(store.is_empty());

        store.store("fs/TOKEN", "value").unwrap();
        assert_eq!(store.get("fs/TOKEN"), Some("value".to_string()));
        assert_eq!(store.get_info("fs/TOKEN").source, "memory");

        store.store("fs/TOKEN", "new_value").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("fs/TOKEN"), Some("new_value".to_string()));

        store.delete("fs/TOKEN").unwrap();
        assert!(!store.has("fs/TOKEN"));
    }

    #[test]
    fn test_memory_store_with_initial() {
        let initial = HashMap::from([("a/X".to_string(), "1".to_string())]);
        let store = MemorySecretStore::with_secrets(initial)
            .with_connector_secret("a", "Y", "2")
            .with_connector_secret("b", "Z", "3");
        assert_eq!(store.get("a/X"), Some("1".to_string()));
        assert_eq!(store.connector_names("a"), vec!["X", "Y"]);
        assert!(store.connector_names("c").is_empty());
    }
}
