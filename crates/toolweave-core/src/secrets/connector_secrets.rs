//! Merging plain and secret-backed connector settings

use std::collections::HashMap;

use super::traits::{connector_secret_key, SecretStore, SecretStoreError, SecretStoreResult};

/// Merge `plain` values with the named secrets of one connector.
///
/// Secret values win over plain values with the same name. A named secret
/// that no store can supply is an error; connecting without it would only
/// fail later inside the server.
pub fn merge_connector_secrets(
    store: &dyn SecretStore,
    connector_id: &str,
    plain: &HashMap<String, String>,
    secret_names: &[String],
) -> SecretStoreResult<HashMap<String, String>> {
    let mut merged = plain.clone();
    for name in secret_names {
        let key = connector_secret_key(connector_id, name);
        let value = store.get(&key).ok_or(SecretStoreError::NotFound(key))?;
        merged.insert(name.clone(), value);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemorySecretStore;

    #[test]
    fn test_secret_overrides_plain_value() {
        let store = MemorySecretStore::new();
        store.store("gh/GITHUB_TOKEN", "ghp_secret").unwrap();

        let plain = HashMap::from([
            ("GITHUB_TOKEN".to_string(), "placeholder".to_string()),
            ("LOG_LEVEL".to_string(), "debug".to_string()),
        ]);
        let merged =
            merge_connector_secrets(&store, "gh", &plain, &["GITHUB_TOKEN".to_string()]).unwrap();

        assert_eq!(merged["GITHUB_TOKEN"], "ghp_secret");
        assert_eq!(merged["LOG_LEVEL"], "debug");
    }

    #[test]
    fn test_missing_secret_is_an_error() {
        let store = MemorySecretStore::new();
        let err = merge_connector_secrets(&store, "gh", &HashMap::new(), &["TOKEN".to_string()])
            .unwrap_err();
        assert!(matches!(err, SecretStoreError::NotFound(key) if key == "gh/TOKEN"));
    }
}
