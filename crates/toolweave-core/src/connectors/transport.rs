//! Transport seam between MCP connectors and the wire
//!
//! `TransportFactory::open` performs the handshake and yields a live
//! `Transport`. The production factory speaks MCP through `rmcp`; tests
//! substitute scripted transports.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::{
    model::{
        CallToolRequestParams, ClientCapabilities, ClientInfo, Implementation, RawContent,
        ResourceContents,
    },
    service::RunningService,
    transport::{
        streamable_http_client::StreamableHttpClientTransportConfig, ConfigureCommandExt,
        StreamableHttpClientTransport, TokioChildProcess,
    },
    RoleClient, ServiceExt,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::state::ServerInfo;
use crate::error::{ConnectionError, ToolError};
use crate::logging::Logger;

/// Fully resolved endpoint, secrets already merged in
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEndpoint {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Http {
        url: String,
        headers: HashMap<String, String>,
    },
}

impl TransportEndpoint {
    /// Short description for logs; never includes env or header values
    pub fn describe(&self) -> String {
        match self {
            TransportEndpoint::Stdio { command, args, .. } => {
                format!("stdio: {} {}", command, args.join(" "))
            }
            TransportEndpoint::Http { url, .. } => format!("http: {}", url),
        }
    }
}

/// Tool schema as reported by a server, before defaulting
#[derive(Debug, Clone, PartialEq)]
pub struct RawToolSchema {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// One part of a tool call's output
#[derive(Debug, Clone, PartialEq)]
pub enum OutputPart {
    Text(String),
    Image { mime_type: String },
    Audio { mime_type: String },
    Resource { uri: String },
    Unsupported,
}

impl OutputPart {
    fn render(&self) -> String {
        match self {
            OutputPart::Text(text) => text.clone(),
            OutputPart::Image { mime_type } => format!("[Image: {}]", mime_type),
            OutputPart::Audio { mime_type } => format!("[Audio: {}]", mime_type),
            OutputPart::Resource { uri } => format!("[Resource: {}]", uri),
            OutputPart::Unsupported => "[Unsupported content]".to_string(),
        }
    }
}

/// Raw output of a tool call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransportCallOutput {
    pub parts: Vec<OutputPart>,
    pub is_error: bool,
}

impl TransportCallOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![OutputPart::Text(text.into())],
            is_error: false,
        }
    }

    /// All parts joined by newlines, non-text parts as placeholders
    pub fn flatten(&self) -> String {
        self.parts
            .iter()
            .map(OutputPart::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A live, handshaken session with one server
#[async_trait]
pub trait Transport: Send + Sync {
    fn server_info(&self) -> ServerInfo;

    async fn list_tools(&self) -> Result<Vec<RawToolSchema>, ConnectionError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<TransportCallOutput, ToolError>;

    async fn close(&self);
}

/// Opens transports; the handshake happens inside `open`
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn open(&self, endpoint: &TransportEndpoint)
        -> Result<Arc<dyn Transport>, ConnectionError>;
}

type McpService = RunningService<RoleClient, ClientInfo>;

/// MCP transport over the official `rmcp` SDK
pub struct RmcpTransport {
    service: tokio::sync::Mutex<Option<McpService>>,
    info: ServerInfo,
    peer: rmcp::service::Peer<RoleClient>,
    logger: Arc<dyn Logger>,
}

/// Factory for [`RmcpTransport`]
pub struct RmcpTransportFactory {
    logger: Arc<dyn Logger>,
}

impl RmcpTransportFactory {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }

    fn client_info() -> ClientInfo {
        ClientInfo {
            meta: None,
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "toolweave-core".to_string(),
                title: Some("Toolweave".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                website_url: None,
                icons: None,
            },
        }
    }

    fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, ConnectionError> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ConnectionError::Transport(format!("header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ConnectionError::Transport(format!("header value for {}: {}", name, e)))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

#[async_trait]
impl TransportFactory for RmcpTransportFactory {
    async fn open(
        &self,
        endpoint: &TransportEndpoint,
    ) -> Result<Arc<dyn Transport>, ConnectionError> {
        self.logger
            .debug(&format!("[RmcpTransport] Opening {}", endpoint.describe()));

        let service = match endpoint {
            TransportEndpoint::Stdio { command, args, env } => {
                let transport = TokioChildProcess::new(
                    tokio::process::Command::new(command).configure(|cmd| {
                        cmd.args(args).envs(env.iter()).kill_on_drop(true);
                    }),
                )
                .map_err(|e| ConnectionError::Transport(format!("spawn {}: {}", command, e)))?;

                Self::client_info()
                    .serve(transport)
                    .await
                    .map_err(|e| ConnectionError::Handshake(e.to_string()))?
            }
            TransportEndpoint::Http { url, headers } => {
                let client = reqwest::Client::builder()
                    .default_headers(Self::header_map(headers)?)
                    .build()
                    .map_err(|e| ConnectionError::Transport(format!("build HTTP client: {}", e)))?;
                let transport = StreamableHttpClientTransport::with_client(
                    client,
                    StreamableHttpClientTransportConfig::with_uri(url.as_str()),
                );

                Self::client_info()
                    .serve(transport)
                    .await
                    .map_err(|e| ConnectionError::Handshake(e.to_string()))?
            }
        };

        let info = service
            .peer_info()
            .map(|info| {
                ServerInfo::new(
                    info.server_info.name.clone(),
                    info.server_info.version.clone(),
                )
            })
            .unwrap_or_else(|| ServerInfo::new("unknown", "unknown"));
        let peer = service.peer().clone();

        self.logger.info(&format!(
            "[RmcpTransport] Connected to {} {}",
            info.name, info.version
        ));

        Ok(Arc::new(RmcpTransport {
            service: tokio::sync::Mutex::new(Some(service)),
            info,
            peer,
            logger: Arc::clone(&self.logger),
        }))
    }
}

fn output_part(content: &RawContent) -> OutputPart {
    match content {
        RawContent::Text(t) => OutputPart::Text(t.text.clone()),
        RawContent::Image(image) => OutputPart::Image {
            mime_type: image.mime_type.clone(),
        },
        RawContent::Audio(audio) => OutputPart::Audio {
            mime_type: audio.mime_type.clone(),
        },
        RawContent::Resource(embedded) => {
            let uri = match &embedded.resource {
                ResourceContents::TextResourceContents { uri, .. }
                | ResourceContents::BlobResourceContents { uri, .. } => uri.clone(),
            };
            OutputPart::Resource { uri }
        }
        _ => OutputPart::Unsupported,
    }
}

#[async_trait]
impl Transport for RmcpTransport {
    fn server_info(&self) -> ServerInfo {
        self.info.clone()
    }

    async fn list_tools(&self) -> Result<Vec<RawToolSchema>, ConnectionError> {
        let result = self
            .peer
            .list_tools(Default::default())
            .await
            .map_err(|e| ConnectionError::ListTools(e.to_string()))?;

        Ok(result
            .tools
            .into_iter()
            .map(|tool| RawToolSchema {
                name: tool.name.to_string(),
                description: tool.description.map(|d| d.to_string()),
                input_schema: Value::Object(tool.input_schema.as_ref().clone()),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<TransportCallOutput, ToolError> {
        self.logger.debug(&format!("[RmcpTransport] Calling tool: {}", name));

        let params = CallToolRequestParams {
            meta: None,
            name: name.to_owned().into(),
            arguments: Some(arguments),
            task: None,
        };
        let result = self
            .peer
            .call_tool(params)
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        Ok(TransportCallOutput {
            parts: result.content.iter().map(|c| output_part(&c.raw)).collect(),
            is_error: result.is_error.unwrap_or(false),
        })
    }

    async fn close(&self) {
        if let Some(service) = self.service.lock().await.take() {
            if let Err(e) = service.cancel().await {
                self.logger
                    .warn(&format!("[RmcpTransport] Error while closing {}: {}", self.info.name, e));
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted transport for connector and registry tests

    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Behavior of one scripted tool
    #[derive(Clone)]
    pub enum FakeTool {
        /// Return the value of the `x` argument as text
        Echo,
        /// Return fixed output
        Fixed(TransportCallOutput),
        /// Sleep, then return text
        Slow(Duration, String),
        /// Fail at the transport level
        Broken(String),
    }

    #[derive(Default)]
    pub struct FakeServer {
        pub tools: Vec<(RawToolSchema, FakeTool)>,
        /// Failures returned by successive `open` calls before succeeding
        pub open_failures: Mutex<VecDeque<ConnectionError>>,
        pub handshake_delay: Option<Duration>,
        /// Per-open delays consumed in order, ahead of `handshake_delay`
        pub open_delays: Mutex<VecDeque<Duration>>,
        pub list_delay: Option<Duration>,
        pub opens: AtomicUsize,
        pub closes: Arc<AtomicUsize>,
    }

    impl FakeServer {
        pub fn with_tools(tools: Vec<(&str, FakeTool)>) -> Self {
            Self {
                tools: tools
                    .into_iter()
                    .map(|(name, behavior)| {
                        (
                            RawToolSchema {
                                name: name.to_string(),
                                description: Some(format!("{} tool", name)),
                                input_schema: serde_json::json!({
                                    "type": "object",
                                    "properties": {"x": {"type": "string"}}
                                }),
                            },
                            behavior,
                        )
                    })
                    .collect(),
                ..Default::default()
            }
        }

        pub fn fail_next_opens(self, errors: Vec<ConnectionError>) -> Self {
            *self.open_failures.lock() = errors.into();
            self
        }

        pub fn delay_next_opens(self, delays: Vec<Duration>) -> Self {
            *self.open_delays.lock() = delays.into();
            self
        }

        pub fn open_count(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    pub struct FakeFactory(pub Arc<FakeServer>);

    #[async_trait]
    impl TransportFactory for FakeFactory {
        async fn open(
            &self,
            _endpoint: &TransportEndpoint,
        ) -> Result<Arc<dyn Transport>, ConnectionError> {
            self.0.opens.fetch_add(1, Ordering::SeqCst);
            let delay = self.0.open_delays.lock().pop_front().or(self.0.handshake_delay);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(err) = self.0.open_failures.lock().pop_front() {
                return Err(err);
            }
            Ok(Arc::new(FakeTransport {
                server: Arc::clone(&self.0),
            }))
        }
    }

    pub struct FakeTransport {
        server: Arc<FakeServer>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn server_info(&self) -> ServerInfo {
            ServerInfo::new("fake-server", "0.1.0")
        }

        async fn list_tools(&self) -> Result<Vec<RawToolSchema>, ConnectionError> {
            if let Some(delay) = self.server.list_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.server.tools.iter().map(|(schema, _)| schema.clone()).collect())
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: Map<String, Value>,
        ) -> Result<TransportCallOutput, ToolError> {
            let behavior = self
                .server
                .tools
                .iter()
                .find(|(schema, _)| schema.name == name)
                .map(|(_, behavior)| behavior.clone())
                .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

            match behavior {
                FakeTool::Echo => Ok(TransportCallOutput::text(
                    arguments.get("x").and_then(Value::as_str).unwrap_or_default(),
                )),
                FakeTool::Fixed(output) => Ok(output),
                FakeTool::Slow(delay, text) => {
                    tokio::time::sleep(delay).await;
                    Ok(TransportCallOutput::text(text))
                }
                FakeTool::Broken(message) => Err(ToolError::Transport(message)),
            }
        }

        async fn close(&self) {
            self.server.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
