//! MCP server connector (stdio subprocess or streamable HTTP)

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

use super::state::{ConnectorKind, ConnectorState, ConnectorStatus, ServerInfo};
use super::transport::{Transport, TransportEndpoint, TransportFactory};
use super::{sanitize_prefix, Connector, ConnectorTimeouts};
use crate::config::{ConnectorConfig, ConnectorTransportConfig};
use crate::error::{ConnectionError, ToolError};
use crate::logging::Logger;
use crate::secrets::{merge_connector_secrets, SecretStore};
use crate::types::{CancellationToken, ConnectorTool, ToolCall, ToolInputSchema, ToolResult};

/// Connector backed by an MCP server
pub struct McpConnector {
    config: ConnectorConfig,
    factory: Arc<dyn TransportFactory>,
    secrets: Arc<dyn SecretStore>,
    timeouts: ConnectorTimeouts,
    status: ConnectorStatus,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    logger: Arc<dyn Logger>,
}

impl McpConnector {
    pub fn new(
        config: ConnectorConfig,
        factory: Arc<dyn TransportFactory>,
        secrets: Arc<dyn SecretStore>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let status = ConnectorStatus::new(config.id.clone(), config.enabled);
        Self {
            config,
            factory,
            secrets,
            timeouts: ConnectorTimeouts::default(),
            status,
            transport: Mutex::new(None),
            logger,
        }
    }

    pub fn with_timeouts(mut self, timeouts: ConnectorTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Resolve the configured transport, merging secrets into env or headers
    fn endpoint(&self) -> Result<TransportEndpoint, ConnectionError> {
        let missing = |e: crate::secrets::SecretStoreError| ConnectionError::MissingSecret(e.to_string());
        match &self.config.transport {
            ConnectorTransportConfig::Stdio {
                command,
                args,
                env,
                secret_env,
            } => Ok(TransportEndpoint::Stdio {
                command: command.clone(),
                args: args.clone(),
                env: merge_connector_secrets(self.secrets.as_ref(), &self.config.id, env, secret_env)
                    .map_err(missing)?,
            }),
            ConnectorTransportConfig::Http {
                url,
                headers,
                secret_headers,
            } => Ok(TransportEndpoint::Http {
                url: url.clone(),
                headers: merge_connector_secrets(
                    self.secrets.as_ref(),
                    &self.config.id,
                    headers,
                    secret_headers,
                )
                .map_err(missing)?,
            }),
        }
    }

    /// Open the transport, handshake and discover tools. On failure nothing
    /// stays open.
    async fn establish(
        &self,
    ) -> Result<(Arc<dyn Transport>, ServerInfo, Vec<ConnectorTool>), ConnectionError> {
        let endpoint = self.endpoint()?;
        self.logger.info(&format!(
            "[McpConnector] Connecting {} ({})",
            self.config.id,
            endpoint.describe()
        ));

        let transport = tokio::time::timeout(self.timeouts.handshake, self.factory.open(&endpoint))
            .await
            .map_err(|_| ConnectionError::HandshakeTimeout(self.timeouts.handshake))??;
        let info = transport.server_info();

        let raw = match tokio::time::timeout(self.timeouts.list_tools, transport.list_tools()).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                transport.close().await;
                return Err(e);
            }
            Err(_) => {
                transport.close().await;
                return Err(ConnectionError::ListToolsTimeout(self.timeouts.list_tools));
            }
        };

        let tools = raw
            .into_iter()
            .map(|schema| {
                ConnectorTool::new(
                    self.config.id.clone(),
                    self.config.name.clone(),
                    schema.name,
                    schema.description.unwrap_or_default(),
                    ToolInputSchema::from_value(&schema.input_schema),
                )
            })
            .collect();

        Ok((transport, info, tools))
    }

    /// Map the exposed name of a call back to the provider's tool name
    fn resolve_tool_name(&self, call: &ToolCall) -> Result<String, ToolError> {
        let tools = self.status.tools();
        let by_original = |name: &str| {
            tools
                .iter()
                .find(|t| t.original_name == name)
                .map(|t| t.original_name.clone())
        };

        if let Some(found) = tools.iter().find(|t| t.name == call.tool_name) {
            return Ok(found.original_name.clone());
        }
        if let Some(found) = by_original(&call.original_tool_name) {
            return Ok(found);
        }
        let prefix = format!("{}_", sanitize_prefix(&self.config.name));
        if let Some(found) = call.tool_name.strip_prefix(&prefix).and_then(by_original) {
            return Ok(found);
        }
        Err(ToolError::NotFound(call.tool_name.clone()))
    }
}

#[async_trait]
impl Connector for McpConnector {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ConnectorKind {
        match self.config.transport {
            ConnectorTransportConfig::Stdio { .. } => ConnectorKind::Subprocess,
            ConnectorTransportConfig::Http { .. } => ConnectorKind::Remote,
        }
    }

    fn status(&self) -> &ConnectorStatus {
        &self.status
    }

    async fn connect(&self) -> Result<ServerInfo, ConnectionError> {
        if !self.status.is_enabled() {
            return Err(ConnectionError::Disabled(self.config.id.clone()));
        }

        let generation = match self.status.begin_connect() {
            Ok(generation) => generation,
            Err(ConnectorState::Connected) => {
                if let Some(info) = self.status.server_info() {
                    return Ok(info);
                }
                return Err(ConnectionError::InProgress(self.config.id.clone()));
            }
            Err(_) => return Err(ConnectionError::InProgress(self.config.id.clone())),
        };

        match self.establish().await {
            Ok((transport, info, tools)) => {
                let tool_count = tools.len();

                // Generation check and install happen under the slot lock so a
                // stale attempt can never overwrite a newer transport.
                let installed = {
                    let mut slot = self.transport.lock();
                    let current = self.status.finish_connect(generation, info.clone(), tools);
                    if current {
                        *slot = Some(Arc::clone(&transport));
                    }
                    current
                };

                if !installed {
                    transport.close().await;
                    self.logger.debug(&format!(
                        "[McpConnector] Discarded connect of {} after disconnect",
                        self.config.id
                    ));
                    return Err(ConnectionError::Superseded);
                }

                self.logger.info(&format!(
                    "[McpConnector] Connected {} to {} {} ({} tools)",
                    self.config.id, info.name, info.version, tool_count
                ));
                Ok(info)
            }
            Err(e) => {
                self.logger
                    .warn(&format!("[McpConnector] Connect of {} failed: {}", self.config.id, e));
                self.status.fail_connect(generation, e.to_string());
                Err(e)
            }
        }
    }

    async fn disconnect(&self) {
        self.status.mark_disconnected();
        let transport = self.transport.lock().take();
        if let Some(transport) = transport {
            transport.close().await;
            self.logger
                .info(&format!("[McpConnector] Disconnected {}", self.config.id));
        }
    }

    async fn execute_tool(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        if !self.status.state().is_connected() {
            return Err(ToolError::NotConnected(self.config.id.clone()));
        }
        if cancel.is_cancelled() {
            return Ok(ToolResult::cancelled(&call.id, &call.tool_name));
        }

        let transport = self
            .transport
            .lock()
            .clone()
            .ok_or_else(|| ToolError::NotConnected(self.config.id.clone()))?;
        let original_name = self.resolve_tool_name(call)?;

        let started = Instant::now();
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(ToolResult::cancelled(&call.id, &call.tool_name));
            }
            _ = tokio::time::sleep(self.timeouts.tool_call) => {
                return Err(ToolError::Timeout(self.timeouts.tool_call));
            }
            output = transport.call_tool(&original_name, call.arguments.clone()) => output?,
        };

        if cancel.is_cancelled() {
            return Ok(ToolResult::cancelled(&call.id, &call.tool_name));
        }

        let content = output.flatten();
        let duration = started.elapsed();
        if output.is_error {
            Ok(ToolResult::failure(&call.id, &call.tool_name, content, false, duration))
        } else {
            Ok(ToolResult::success(&call.id, &call.tool_name, content, duration))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::transport::fake::{FakeFactory, FakeServer, FakeTool};
    use crate::connectors::transport::{OutputPart, TransportCallOutput};
    use crate::logging::NoOpLogger;
    use crate::secrets::MemorySecretStore;
    use crate::types::ToolCallRequest;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn connector_with(server: Arc<FakeServer>, config: ConnectorConfig) -> McpConnector {
        McpConnector::new(
            config,
            Arc::new(FakeFactory(server)),
            Arc::new(MemorySecretStore::new()),
            Arc::new(NoOpLogger),
        )
        .with_timeouts(ConnectorTimeouts {
            handshake: Duration::from_millis(200),
            list_tools: Duration::from_millis(100),
            tool_call: Duration::from_millis(100),
        })
    }

    fn connector(server: FakeServer) -> McpConnector {
        connector_with(
            Arc::new(server),
            ConnectorConfig::stdio("echo-srv", "Echo Server", "echo-mcp", vec![]),
        )
    }

    fn call_for(connector: &McpConnector, name: &str, args: serde_json::Value) -> ToolCall {
        let tool = connector
            .tools()
            .into_iter()
            .find(|t| t.name == name)
            .unwrap();
        ToolCall::resolve(&ToolCallRequest::new(name, args), &tool)
    }

    #[tokio::test]
    async fn test_connect_discovers_tools_with_defaults() {
        let mut server = FakeServer::with_tools(vec![("echo", FakeTool::Echo)]);
        server.tools[0].0.input_schema = json!({});
        let connector = connector(server);

        let info = connector.connect().await.unwrap();
        assert_eq!(info.name, "fake-server");
        assert_eq!(connector.state(), ConnectorState::Connected);

        let tools = connector.tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].connector_id, "echo-srv");
        assert_eq!(tools[0].input_schema, ToolInputSchema::object());
        assert_eq!(connector.kind(), ConnectorKind::Subprocess);
    }

    #[tokio::test]
    async fn test_connect_when_connected_returns_cached_info() {
        let server = Arc::new(FakeServer::with_tools(vec![("echo", FakeTool::Echo)]));
        let connector = connector_with(
            Arc::clone(&server),
            ConnectorConfig::http("remote", "Remote", "http://localhost/mcp"),
        );
        connector.connect().await.unwrap();
        connector.connect().await.unwrap();

        assert_eq!(server.open_count(), 1);
        assert_eq!(connector.kind(), ConnectorKind::Remote);
    }

    #[tokio::test]
    async fn test_disabled_connector_does_not_change_state() {
        let server = Arc::new(FakeServer::default());
        let connector = connector_with(
            Arc::clone(&server),
            ConnectorConfig::stdio("off", "Off", "x", vec![]).disabled(),
        );

        let err = connector.connect().await.unwrap_err();
        assert_eq!(err, ConnectionError::Disabled("off".into()));
        assert_eq!(connector.state(), ConnectorState::Disconnected);
        assert_eq!(server.open_count(), 0);
    }

    #[tokio::test]
    async fn test_handshake_failure_sets_error_state() {
        let server = FakeServer::default()
            .fail_next_opens(vec![ConnectionError::Transport("spawn failed".into())]);
        let connector = connector(server);

        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Transport(_)));
        assert!(connector.state().is_error());
        assert!(connector.tools().is_empty());

        // error -> connecting -> connected on the next attempt
        connector.connect().await.unwrap();
        assert!(connector.state().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let mut server = FakeServer::default();
        server.handshake_delay = Some(Duration::from_secs(5));
        let connector = connector(server);

        let err = connector.connect().await.unwrap_err();
        assert_eq!(err, ConnectionError::HandshakeTimeout(Duration::from_millis(200)));
        assert!(connector.state().is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_tools_timeout_closes_transport() {
        let mut server = FakeServer::with_tools(vec![("echo", FakeTool::Echo)]);
        server.list_delay = Some(Duration::from_secs(5));
        let server = Arc::new(server);
        let connector = connector_with(
            Arc::clone(&server),
            ConnectorConfig::stdio("slow", "Slow", "x", vec![]),
        );

        let err = connector.connect().await.unwrap_err();
        assert_eq!(err, ConnectionError::ListToolsTimeout(Duration::from_millis(100)));
        assert_eq!(server.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_secret_fails_before_opening() {
        let server = Arc::new(FakeServer::default());
        let mut config = ConnectorConfig::stdio("gh", "GitHub", "gh-mcp", vec![]);
        if let ConnectorTransportConfig::Stdio { secret_env, .. } = &mut config.transport {
            secret_env.push("GITHUB_TOKEN".into());
        }
        let connector = connector_with(Arc::clone(&server), config);

        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, ConnectionError::MissingSecret(_)));
        assert_eq!(server.open_count(), 0);
    }

    #[tokio::test]
    async fn test_secrets_are_merged_into_endpoint() {
        let secrets = MemorySecretStore::new();
        secrets.store("docs/Authorization", "Bearer t0k").unwrap();
        let mut config = ConnectorConfig::http("docs", "Docs", "https://docs/mcp");
        if let ConnectorTransportConfig::Http { secret_headers, .. } = &mut config.transport {
            secret_headers.push("Authorization".into());
        }
        let connector = McpConnector::new(
            config,
            Arc::new(FakeFactory(Arc::new(FakeServer::default()))),
            Arc::new(secrets),
            Arc::new(NoOpLogger),
        );

        let endpoint = connector.endpoint().unwrap();
        assert_eq!(
            endpoint,
            TransportEndpoint::Http {
                url: "https://docs/mcp".into(),
                headers: HashMap::from([("Authorization".into(), "Bearer t0k".into())]),
            }
        );
    }

    #[tokio::test]
    async fn test_execute_echo() {
        let connector = connector(FakeServer::with_tools(vec![("echo", FakeTool::Echo)]));
        connector.connect().await.unwrap();

        let call = call_for(&connector, "echo", json!({"x": "hi"}));
        let result = connector
            .execute_tool(&call, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.text(), "hi");
        assert_eq!(result.call_id, call.id);
    }

    #[tokio::test]
    async fn test_execute_resolves_prefixed_display_name() {
        let connector = connector(FakeServer::with_tools(vec![("search", FakeTool::Echo)]));
        connector.connect().await.unwrap();

        let mut call = call_for(&connector, "search", json!({"x": "q"}));
        call.tool_name = "echo_server_search".into();
        call.original_tool_name = String::new();

        let result = connector
            .execute_tool(&call, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.text(), "q");
    }

    #[tokio::test]
    async fn test_error_flag_becomes_failure() {
        let output = TransportCallOutput {
            parts: vec![OutputPart::Text("bad input".into())],
            is_error: true,
        };
        let connector = connector(FakeServer::with_tools(vec![("fail", FakeTool::Fixed(output))]));
        connector.connect().await.unwrap();

        let call = call_for(&connector, "fail", json!({}));
        let result = connector
            .execute_tool(&call, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.is_success());
        assert!(!result.is_retryable());
        assert_eq!(result.text(), "bad input");
    }

    #[tokio::test]
    async fn test_execute_rejects_when_not_connected() {
        let connector = connector(FakeServer::with_tools(vec![("echo", FakeTool::Echo)]));
        let call = ToolCall {
            id: "c1".into(),
            connector_id: "echo-srv".into(),
            tool_name: "echo".into(),
            original_tool_name: "echo".into(),
            arguments: Default::default(),
        };
        let err = connector
            .execute_tool(&call, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::NotConnected("echo-srv".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_times_out() {
        let connector = connector(FakeServer::with_tools(vec![(
            "slow",
            FakeTool::Slow(Duration::from_secs(10), "late".into()),
        )]));
        connector.connect().await.unwrap();

        let call = call_for(&connector, "slow", json!({}));
        let err = connector
            .execute_tool(&call, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Timeout(Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_call() {
        let connector = Arc::new(connector(FakeServer::with_tools(vec![(
            "slow",
            FakeTool::Slow(Duration::from_millis(50), "late".into()),
        )])));
        connector.connect().await.unwrap();
        let call = call_for(&connector, "slow", json!({}));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = connector.execute_tool(&call, &cancel).await.unwrap();
        assert!(result.is_cancelled());
    }

    #[tokio::test]
    async fn test_disconnect_clears_tools_and_closes() {
        let server = Arc::new(FakeServer::with_tools(vec![("echo", FakeTool::Echo)]));
        let connector = connector_with(
            Arc::clone(&server),
            ConnectorConfig::stdio("e", "E", "x", vec![]),
        );
        connector.connect().await.unwrap();
        connector.disconnect().await;

        assert_eq!(connector.state(), ConnectorState::Disconnected);
        assert!(connector.tools().is_empty());
        assert_eq!(server.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_connect_discards_result() {
        let mut server = FakeServer::with_tools(vec![("echo", FakeTool::Echo)]);
        server.handshake_delay = Some(Duration::from_millis(50));
        let server = Arc::new(server);
        let connector = Arc::new(connector_with(
            Arc::clone(&server),
            ConnectorConfig::stdio("e", "E", "x", vec![]),
        ));

        let pending = {
            let connector = Arc::clone(&connector);
            tokio::spawn(async move { connector.connect().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connector.state(), ConnectorState::Connecting);
        assert_eq!(
            connector.connect().await.unwrap_err(),
            ConnectionError::InProgress("e".into())
        );

        connector.disconnect().await;
        let outcome = pending.await.unwrap();

        assert_eq!(outcome.unwrap_err(), ConnectionError::Superseded);
        assert_eq!(connector.state(), ConnectorState::Disconnected);
        assert_eq!(server.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_stale_connect_keeps_newer_transport() {
        let server = Arc::new(
            FakeServer::with_tools(vec![("echo", FakeTool::Echo)]).delay_next_opens(vec![
                Duration::from_millis(100),
                Duration::from_millis(10),
            ]),
        );
        let connector = Arc::new(connector_with(
            Arc::clone(&server),
            ConnectorConfig::stdio("e", "E", "x", vec![]),
        ));

        let stale = {
            let connector = Arc::clone(&connector);
            tokio::spawn(async move { connector.connect().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        connector.disconnect().await;
        connector.connect().await.unwrap();
        assert!(connector.state().is_connected());

        assert_eq!(stale.await.unwrap().unwrap_err(), ConnectionError::Superseded);
        assert_eq!(server.open_count(), 2);
        // only the stale transport is closed
        assert_eq!(server.closes.load(Ordering::SeqCst), 1);
        assert!(connector.state().is_connected());

        let call = call_for(&connector, "echo", json!({"x": "still here"}));
        let result = connector
            .execute_tool(&call, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.text(), "still here");
    }
}
