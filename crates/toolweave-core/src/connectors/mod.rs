//! Connectors: addressable providers of tools
//!
//! - `McpConnector`: MCP server over stdio (subprocess) or streamable HTTP
//! - `LocalCommandConnector`: built-in shell command runner with a risk gate
//!
//! Every connector owns a `ConnectorStatus` (state, tools, observers) and
//! follows the same lifecycle: `disconnected -> connecting -> {connected, error}`.

pub mod local_command;
mod mcp;
mod state;
pub mod transport;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConnectorConfig, EngineSettings};
use crate::error::{ConnectionError, ToolError};
use crate::logging::Logger;
use crate::secrets::SecretStore;
use crate::types::{CancellationToken, ConnectorTool, ToolCall, ToolResult};

pub use local_command::{
    LocalCommandConnector, RiskAssessment, RiskClassifier, RiskLevel, LOCAL_COMMAND_ID,
    RUN_COMMAND_TOOL,
};
pub use mcp::McpConnector;
pub use state::{ConnectorKind, ConnectorState, ConnectorStatus, ObserverId, ServerInfo, StateObserver};
pub use transport::{
    OutputPart, RawToolSchema, RmcpTransportFactory, Transport, TransportCallOutput,
    TransportEndpoint, TransportFactory,
};

/// A provider of tools
#[async_trait]
pub trait Connector: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn kind(&self) -> ConnectorKind;

    /// Shared status cell holding state, tools and observers
    fn status(&self) -> &ConnectorStatus;

    fn state(&self) -> ConnectorState {
        self.status().state()
    }

    fn tools(&self) -> Vec<ConnectorTool> {
        self.status().tools()
    }

    fn is_enabled(&self) -> bool {
        self.status().is_enabled()
    }

    fn set_enabled(&self, enabled: bool) {
        self.status().set_enabled(enabled)
    }

    fn observe(&self, observer: StateObserver) -> ObserverId {
        self.status().observe(observer)
    }

    fn remove_observer(&self, id: ObserverId) {
        self.status().remove_observer(id)
    }

    /// Connect and discover tools.
    ///
    /// Connecting while connected returns the cached server info. Connecting
    /// while a connect is in flight fails with `ConnectionError::InProgress`.
    async fn connect(&self) -> Result<ServerInfo, ConnectionError>;

    /// Tear down the connection; in-flight connects are discarded
    async fn disconnect(&self);

    async fn execute_tool(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError>;
}

/// Timeouts applied by connectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorTimeouts {
    pub handshake: Duration,
    pub list_tools: Duration,
    pub tool_call: Duration,
}

impl Default for ConnectorTimeouts {
    fn default() -> Self {
        Self::from(&EngineSettings::default())
    }
}

impl From<&EngineSettings> for ConnectorTimeouts {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            handshake: settings.handshake_timeout(),
            list_tools: settings.list_tools_timeout(),
            tool_call: settings.tool_timeout(),
        }
    }
}

/// Builds connectors from configuration records
pub trait ConnectorFactory: Send + Sync {
    fn create(&self, config: &ConnectorConfig) -> Arc<dyn Connector>;
}

/// Produces a built-in connector; the registry registers it when its id is absent
pub type BuiltinFactory = Arc<dyn Fn() -> Arc<dyn Connector> + Send + Sync>;

/// Factory producing `McpConnector`s over a shared transport factory
pub struct McpConnectorFactory {
    transports: Arc<dyn TransportFactory>,
    secrets: Arc<dyn SecretStore>,
    timeouts: ConnectorTimeouts,
    logger: Arc<dyn Logger>,
}

impl McpConnectorFactory {
    pub fn new(
        transports: Arc<dyn TransportFactory>,
        secrets: Arc<dyn SecretStore>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            transports,
            secrets,
            timeouts: ConnectorTimeouts::default(),
            logger,
        }
    }

    pub fn with_timeouts(mut self, timeouts: ConnectorTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

impl ConnectorFactory for McpConnectorFactory {
    fn create(&self, config: &ConnectorConfig) -> Arc<dyn Connector> {
        Arc::new(
            McpConnector::new(
                config.clone(),
                Arc::clone(&self.transports),
                Arc::clone(&self.secrets),
                Arc::clone(&self.logger),
            )
            .with_timeouts(self.timeouts),
        )
    }
}

/// Lower-cased, `[a-z0-9_]`-only form of a connector name, used to prefix
/// colliding tool names
pub fn sanitize_prefix(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}
