//! Secret storage for connector credentials
//!
//! - `SecretStore` trait for implementing custom stores
//! - Built-in implementations: `EnvSecretStore`, `MemorySecretStore`, `ChainSecretStore`, `KeychainSecretStore`
//! - `merge_connector_secrets` to fold stored secrets into a connector's env vars or headers

mod traits;
mod env_store;
mod memory_store;
mod chain_store;
mod keychain_store;
mod connector_secrets;

pub use traits::{connector_secret_key, SecretInfo, SecretStore, SecretStoreError, SecretStoreResult};
pub use env_store::EnvSecretStore;
pub use memory_store::MemorySecretStore;
pub use chain_store::ChainSecretStore;
pub use keychain_store::KeychainSecretStore;
pub use connector_secrets::merge_connector_secrets;
