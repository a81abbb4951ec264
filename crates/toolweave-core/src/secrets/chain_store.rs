//! Chained secret store with fallback behavior

use std::sync::Arc;

use super::traits::{SecretInfo, SecretStore, SecretStoreError, SecretStoreResult};

/// Tries each store in order on reads; writes go to one designated store
pub struct ChainSecretStore {
    stores: Vec<Arc<dyn SecretStore>>,
    write_store_index: usize,
}

impl ChainSecretStore {
    /// Chain with the first store used for writes
    pub fn new(stores: Vec<Arc<dyn SecretStore>>) -> SecretStoreResult<Self> {
        Self::with_write_store(stores, 0)
    }

    pub fn with_write_store(
        stores: Vec<Arc<dyn SecretStore>>,
        write_store_index: usize,
    ) -> SecretStoreResult<Self> {
        if stores.is_empty() {
            return Err(SecretStoreError::EmptyChain);
        }
        if write_store_index >= stores.len() {
            return Err(SecretStoreError::WriteIndexOutOfBounds {
                index: write_store_index,
                len: stores.len(),
            });
        }
        Ok(Self {
            stores,
            write_store_index,
        })
    }

    fn available(&self) -> impl Iterator<Item = &Arc<dyn SecretStore>> {
        self.stores.iter().filter(|s| s.is_available())
    }
}

impl SecretStore for ChainSecretStore {
    fn name(&self) -> &str {
        "chain"
    }

    fn is_available(&self) -> bool {
        self.stores.iter().any(|s| s.is_available())
    }

    fn get(&self, key: &str) -> Option<String> {
        self.available().find_map(|store| store.get(key))
    }

    fn store(&self, key: &str, value: &str) -> SecretStoreResult<()> {
        self.stores[self.write_store_index].store(key, value)
    }

    /// Removes the key from every store that has it; read-only stores are skipped
    fn delete(&self, key: &str) -> SecretStoreResult<()> {
        for store in self.stores.iter().filter(|s| s.has(key)) {
            match store.delete(key) {
                Ok(()) | Err(SecretStoreError::ReadOnly) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn get_info(&self, key: &str) -> SecretInfo {
        self.available()
            .find(|store| store.has(key))
            .map(|store| SecretInfo::new(true, store.name()))
            .unwrap_or_else(SecretInfo::not_found)
    }
}

impl std::fmt::Debug for ChainSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainSecretStore")
            .field("stores", &self.stores.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("write_store_index", &self.write_store_index)
            .finish()
    }
}
