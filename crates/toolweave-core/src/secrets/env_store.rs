//! Environment variable secret store

use std::env;

use super::traits::{SecretStore, SecretStoreError, SecretStoreResult};

/// Read-only secret store over the process environment
///
/// Lookup order for a key:
/// - the key itself (`GITHUB_TOKEN`)
/// - for connector keys (`github/GITHUB_TOKEN`), the scoped variable
///   `TOOLWEAVE_GITHUB_GITHUB_TOKEN`, then the bare name `GITHUB_TOKEN`
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    pub fn new() -> Self {
        Self
    }

    /// Environment variable names tried for a key, in order
    pub fn candidates(key: &str) -> Vec<String> {
        match key.split_once('/') {
            Some((connector, name)) => vec![
                format!("TOOLWEAVE_{}_{}", env_fragment(connector), name),
                name.to_string(),
            ],
            None => vec![key.to_string()],
        }
    }
}

fn env_fragment(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

impl SecretStore for EnvSecretStore {
    fn name(&self) -> &str {
        "env"
    }

    fn get(&self, key: &str) -> Option<String> {
        Self::candidates(key)
            .into_iter()
            .filter_map(|name| env::var(name).ok())
            .find(|value| !value.is_empty())
    }

    fn store(&self, _key: &str, _value: &str) -> SecretStoreResult<()> {
        Err(SecretStoreError::ReadOnly)
    }

    fn delete(&self, _key: &str) -> SecretStoreResult<()> {
        Err(SecretStoreError::ReadOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_store_read_only() {
        let store = EnvSecretStore::new();
        assert_eq!(store.name(), "env");
        assert!(matches!(store.store("test", "value"), Err(SecretStoreError::ReadOnly)));
        assert!(matches!(store.delete("test"), Err(SecretStoreError::ReadOnly)));
    }

    #[test]
    fn test_candidates_for_connector_key() {
        assert_eq!(
            EnvSecretStore::candidates("my-server/API_TOKEN"),
            vec!["TOOLWEAVE_MY_SERVER_API_TOKEN".to_string(), "API_TOKEN".to_string()]
        );
        assert_eq!(EnvSecretStore::candidates("PLAIN"), vec!["PLAIN".to_string()]);
    }

    #[test]
    fn test_env_store_prefers_scoped_variable() {
        env::set_var("TW_ENV_TEST_TOKEN", "bare");
        env::set_var("TOOLWEAVE_SRV_TW_ENV_TEST_TOKEN", "scoped");

        let store = EnvSecretStore::new();
        assert_eq!(store.get("srv/TW_ENV_TEST_TOKEN"), Some("scoped".to_string()));
        assert_eq!(store.get("other/TW_ENV_TEST_TOKEN"), Some("bare".to_string()));

        env::remove_var("TW_ENV_TEST_TOKEN");
        env::remove_var("TOOLWEAVE_SRV_TW_ENV_TEST_TOKEN");
    }

    #[test]
    fn test_env_store_get_not_found() {
        let store = EnvSecretStore::new();
        assert_eq!(store.get("nonexistent/TW_SECRET_XYZ_123"), None);
        assert!(!store.get_info("TW_SECRET_XYZ_123").available);
    }
}
