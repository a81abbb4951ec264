//! Engine settings and connector configuration records

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::connectors::local_command::RiskLevel;

/// How a configured connector is reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ConnectorTransportConfig {
    /// MCP server spawned as a subprocess, spoken to over stdio
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        /// Env var names whose values come from the secret store
        #[serde(default)]
        secret_env: Vec<String>,
    },
    /// MCP server reached over streamable HTTP
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        /// Header names whose values come from the secret store
        #[serde(default)]
        secret_headers: Vec<String>,
    },
}

/// A configured connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub transport: ConnectorTransportConfig,
}

fn default_true() -> bool {
    true
}

impl ConnectorConfig {
    pub fn stdio(
        id: impl Into<String>,
        name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            transport: ConnectorTransportConfig::Stdio {
                command: command.into(),
                args,
                env: HashMap::new(),
                secret_env: Vec::new(),
            },
        }
    }

    pub fn http(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            transport: ConnectorTransportConfig::Http {
                url: url.into(),
                headers: HashMap::new(),
                secret_headers: Vec::new(),
            },
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Retry policy for failed connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Settings for the built-in local command connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalCommandSettings {
    pub enabled: bool,
    pub allowed_risks: Vec<RiskLevel>,
    /// Bytes of stdout/stderr kept per stream
    pub output_limit: usize,
    pub default_timeout_secs: u64,
}

impl Default for LocalCommandSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_risks: vec![RiskLevel::Safe, RiskLevel::Moderate],
            output_limit: 30_000,
            default_timeout_secs: 120,
        }
    }
}

/// Engine-wide timeouts and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub handshake_timeout_ms: u64,
    pub list_tools_timeout_ms: u64,
    pub tool_timeout_ms: u64,
    pub approval_timeout_ms: u64,
    pub max_tool_rounds: usize,
    pub retry: RetryPolicy,
    pub local_command: LocalCommandSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 30_000,
            list_tools_timeout_ms: 10_000,
            tool_timeout_ms: 60_000,
            approval_timeout_ms: 120_000,
            max_tool_rounds: 5,
            retry: RetryPolicy::default(),
            local_command: LocalCommandSettings::default(),
        }
    }
}

impl EngineSettings {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn list_tools_timeout(&self) -> Duration {
        Duration::from_millis(self.list_tools_timeout_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_millis(self.approval_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.handshake_timeout(), Duration::from_secs(30));
        assert!(settings.list_tools_timeout() < settings.handshake_timeout());
        assert_eq!(settings.max_tool_rounds, 5);
        assert_eq!(settings.retry.max_attempts, 5);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let settings: EngineSettings =
            serde_yaml::from_str("max_tool_rounds: 3\nretry:\n  max_attempts: 2\n").unwrap();
        assert_eq!(settings.max_tool_rounds, 3);
        assert_eq!(settings.retry.max_attempts, 2);
        assert_eq!(settings.retry.base_delay_ms, 1_000);
        assert_eq!(settings.tool_timeout_ms, 60_000);
    }

    #[test]
    fn test_connector_config_yaml_shape() {
        let yaml = r#"
id: github
name: GitHub
transport: stdio
command: npx
args: ["-y", "@modelcontextprotocol/server-github"]
secret_env: [GITHUB_TOKEN]
"#;
        let config: ConnectorConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.enabled);
        match config.transport {
            ConnectorTransportConfig::Stdio { command, args, secret_env, .. } => {
                assert_eq!(command, "npx");
                assert_eq!(args.len(), 2);
                assert_eq!(secret_env, vec!["GITHUB_TOKEN".to_string()]);
            }
            other => panic!("unexpected transport: {:?}", other),
        }
    }
}
