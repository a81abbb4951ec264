//! Toolweave Core
//!
//! Tool-calling orchestration engine. Connectors (MCP servers over stdio or
//! streamable HTTP, plus a built-in local command runner) expose tools; the
//! `ConnectorRegistry` tracks their lifecycle, reconnects with backoff and
//! aggregates their tools under collision-free names; the `ToolExecutor` runs
//! calls with timeouts and cancellation; `ToolEnabledChatService` drives the
//! round-based model/tool loop.
//!
//! ```rust,ignore
//! use toolweave_core::{ConnectorRegistry, ToolExecutor, ToolEnabledChatService};
//!
//! let registry = ConnectorRegistry::new(logger.clone())
//!     .with_config_source(config, Arc::new(factory));
//! registry.connect_all_enabled().await;
//!
//! let executor = Arc::new(ToolExecutor::new(registry, logger.clone()));
//! let chat = ToolEnabledChatService::new(executor, logger);
//! let outcome = chat.generate(provider.as_ref(), &messages, &cancel).await?;
//! ```

pub mod chat;
pub mod config;
pub mod connectors;
pub mod error;
pub mod executor;
pub mod logging;
pub mod providers;
pub mod registry;
pub mod secrets;
pub mod types;

pub use types::{
    CancellationToken, ChatMessage, ConnectorTool, GenerationEvent, MessageRole, ToolCall,
    ToolCallRequest, ToolCallState, ToolDefinition, ToolExecutionRound, ToolResult, TurnChunk,
};

pub use error::{ApprovalError, ConnectionError, ToolError};

pub use logging::{ConsoleLogger, Logger, MemoryLogger, NoOpLogger};

pub use secrets::{
    ChainSecretStore, EnvSecretStore, KeychainSecretStore, MemorySecretStore, SecretStore,
    SecretStoreError,
};

pub use config::{
    ConfigError, ConnectorConfig, ConnectorConfigProvider, EngineSettings, FileConfigProvider,
    MemoryConfigProvider,
};

pub use connectors::{
    Connector, ConnectorFactory, ConnectorKind, ConnectorState, LocalCommandConnector,
    McpConnector, McpConnectorFactory, RmcpTransportFactory,
};

pub use registry::{ConnectorRegistry, RegistryError, RegistrySnapshot};

pub use executor::{BatchResult, ToolExecutor};

pub use providers::{
    create_provider, GenaiProvider, MockProvider, ModelProvider, ModelTurn, ProviderError,
    ProviderModelConfig,
};

pub use chat::{
    ApprovalGate, ApprovalResponse, AutoApprove, ChatError, GenerationOutcome,
    TimedApprovalGate, ToolEnabledChatService,
};
