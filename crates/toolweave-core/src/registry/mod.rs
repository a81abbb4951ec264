//! Connector registry, reconnect scheduling and published snapshots

mod connector_registry;
mod retry;
mod snapshot;

pub use connector_registry::ConnectorRegistry;
pub use retry::backoff_delay;
pub use snapshot::{ConnectorSummary, RegistrySnapshot};

use crate::error::ConnectionError;

/// Registry operation errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown connector: {0}")]
    UnknownConnector(String),

    #[error("Connector already registered: {0}")]
    DuplicateId(String),

    #[error("Connector {id} failed to connect: {source}")]
    Connection {
        id: String,
        source: ConnectionError,
    },

    #[error("No connector factory configured")]
    NoFactory,
}

pub type RegistryResult<T> = Result<T, RegistryError>;
