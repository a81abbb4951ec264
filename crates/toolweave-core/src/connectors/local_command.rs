//! Built-in connector that runs shell commands on the local machine
//!
//! Exposes a single `run_command` tool. Every command is classified by a
//! static, regex driven risk classifier before anything is spawned; classes
//! outside the allowed set are rejected.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::state::{ConnectorKind, ConnectorState, ConnectorStatus, ServerInfo};
use super::{BuiltinFactory, Connector};
use crate::config::LocalCommandSettings;
use crate::error::{ConnectionError, ToolError};
use crate::logging::Logger;
use crate::types::{CancellationToken, ConnectorTool, ToolCall, ToolInputSchema, ToolResult};

pub const LOCAL_COMMAND_ID: &str = "local-command";
pub const RUN_COMMAND_TOOL: &str = "run_command";

/// Risk class of a shell command, least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Moderate,
    Dangerous,
    Blocked,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Moderate => "moderate",
            RiskLevel::Dangerous => "dangerous",
            RiskLevel::Blocked => "blocked",
        };
        f.write_str(label)
    }
}

/// Classification of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub reason: String,
}

const RISK_RULES: &[(RiskLevel, &str, &str)] = &[
    (RiskLevel::Blocked, r"\brm\s+(-[a-zA-Z]*[rR][a-zA-Z]*\s+)+(/|~|\*|/\*)(\s|$)", "recursive delete of a root, home or wildcard path"),
    (RiskLevel::Blocked, r"\bmkfs(\.\w+)?\b", "filesystem creation"),
    (RiskLevel::Blocked, r"\bdd\b.*\bof=/dev/", "raw write to a device"),
    (RiskLevel::Blocked, r">\s*/dev/(sd|nvme|hd|disk)", "redirect onto a block device"),
    (RiskLevel::Blocked, r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", "fork bomb"),
    (RiskLevel::Blocked, r"\b(shutdown|reboot|halt|poweroff)\b", "host power control"),
    (RiskLevel::Dangerous, r"\bsudo\b|\bsu\s", "privilege escalation"),
    (RiskLevel::Dangerous, r"\brm\b", "file deletion"),
    (RiskLevel::Dangerous, r"\b(curl|wget)\b[^|]*\|\s*(ba|z)?sh\b", "piping a download into a shell"),
    (RiskLevel::Dangerous, r"\bchmod\s+(-R|777)|\bchown\b", "permission change"),
    (RiskLevel::Dangerous, r"\bgit\s+(push\s+.*(--force|-f)\b|reset\s+--hard|clean\s+-[a-zA-Z]*f)", "destructive git operation"),
    (RiskLevel::Dangerous, r"\bkill(all)?\s+-9\b|\bpkill\b", "process termination"),
    (RiskLevel::Moderate, r"\bgit\s+(commit|push|checkout|merge|rebase|stash)\b", "repository change"),
    (RiskLevel::Moderate, r"\b(npm|pnpm|yarn|pip|pip3|cargo|gem|brew|apt|apt-get)\s+(install|add|remove|uninstall)\b", "package change"),
    (RiskLevel::Moderate, r"\b(mv|cp|mkdir|touch|ln)\b", "file system change"),
    (RiskLevel::Moderate, r"[^2&]>{1,2}\s*[^&\s]", "output redirection to a file"),
];

static COMPILED_RULES: Lazy<Vec<(RiskLevel, Regex, &'static str)>> = Lazy::new(|| {
    RISK_RULES
        .iter()
        .filter_map(|(level, pattern, reason)| {
            Regex::new(pattern).ok().map(|re| (*level, re, *reason))
        })
        .collect()
});

/// Static command classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskClassifier;

impl RiskClassifier {
    /// The most severe matching rule wins; no match is `Safe`
    pub fn classify(command: &str) -> RiskAssessment {
        COMPILED_RULES
            .iter()
            .filter(|(_, re, _)| re.is_match(command))
            .max_by_key(|(level, _, _)| *level)
            .map(|(level, _, reason)| RiskAssessment {
                level: *level,
                reason: reason.to_string(),
            })
            .unwrap_or_else(|| RiskAssessment {
                level: RiskLevel::Safe,
                reason: "no risky pattern".to_string(),
            })
    }
}

/// Runs shell commands through `/bin/sh -c`
pub struct LocalCommandConnector {
    settings: LocalCommandSettings,
    status: ConnectorStatus,
    logger: Arc<dyn Logger>,
}

impl LocalCommandConnector {
    pub fn new(settings: LocalCommandSettings, logger: Arc<dyn Logger>) -> Self {
        let status = ConnectorStatus::new(LOCAL_COMMAND_ID, settings.enabled);
        Self {
            settings,
            status,
            logger,
        }
    }

    /// Built-in factory for the registry
    pub fn factory(settings: LocalCommandSettings, logger: Arc<dyn Logger>) -> BuiltinFactory {
        Arc::new(move || {
            Arc::new(LocalCommandConnector::new(settings.clone(), Arc::clone(&logger)))
                as Arc<dyn Connector>
        })
    }

    fn tool() -> ConnectorTool {
        ConnectorTool::new(
            LOCAL_COMMAND_ID,
            "Local Command",
            RUN_COMMAND_TOOL,
            "Run a shell command on the local machine and return its exit code, stdout and stderr.",
            ToolInputSchema::object()
                .with_property(
                    "command",
                    json!({"type": "string", "description": "Shell command to run"}),
                )
                .with_property(
                    "working_directory",
                    json!({"type": "string", "description": "Directory to run in"}),
                )
                .with_property(
                    "timeout_seconds",
                    json!({"type": "integer", "description": "Kill the command after this many seconds"}),
                )
                .with_required("command"),
        )
    }

    fn truncate(&self, text: &str) -> String {
        let limit = self.settings.output_limit;
        if text.len() <= limit {
            return text.to_string();
        }
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}\n... [truncated {} bytes]", &text[..cut], text.len() - cut)
    }

    fn render(&self, exit_code: Option<i32>, duration: Duration, stdout: &[u8], stderr: &[u8]) -> String {
        let code = exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "terminated by signal".to_string());
        format!(
            "Exit code: {}\nDuration: {}ms\n\nSTDOUT:\n{}\n\nSTDERR:\n{}",
            code,
            duration.as_millis(),
            self.truncate(&String::from_utf8_lossy(stdout)),
            self.truncate(&String::from_utf8_lossy(stderr)),
        )
    }
}

#[async_trait]
impl Connector for LocalCommandConnector {
    fn id(&self) -> &str {
        LOCAL_COMMAND_ID
    }

    fn name(&self) -> &str {
        "Local Command"
    }

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Builtin
    }

    fn status(&self) -> &ConnectorStatus {
        &self.status
    }

    async fn connect(&self) -> Result<ServerInfo, ConnectionError> {
        if !self.status.is_enabled() {
            return Err(ConnectionError::Disabled(LOCAL_COMMAND_ID.to_string()));
        }
        let generation = match self.status.begin_connect() {
            Ok(generation) => generation,
            Err(ConnectorState::Connected) => {
                return self
                    .status
                    .server_info()
                    .ok_or_else(|| ConnectionError::InProgress(LOCAL_COMMAND_ID.to_string()));
            }
            Err(_) => return Err(ConnectionError::InProgress(LOCAL_COMMAND_ID.to_string())),
        };

        let info = ServerInfo::new("toolweave-local-command", env!("CARGO_PKG_VERSION"));
        if !self.status.finish_connect(generation, info.clone(), vec![Self::tool()]) {
            return Err(ConnectionError::Superseded);
        }
        Ok(info)
    }

    async fn disconnect(&self) {
        self.status.mark_disconnected();
    }

    async fn execute_tool(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        if !self.status.state().is_connected() {
            return Err(ToolError::NotConnected(LOCAL_COMMAND_ID.to_string()));
        }
        if call.original_tool_name != RUN_COMMAND_TOOL && call.tool_name != RUN_COMMAND_TOOL {
            return Err(ToolError::NotFound(call.tool_name.clone()));
        }
        if cancel.is_cancelled() {
            return Ok(ToolResult::cancelled(&call.id, &call.tool_name));
        }

        let command = call
            .get_arg_str("command")
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("'command' is required".to_string()))?;

        let assessment = RiskClassifier::classify(command);
        if !self.settings.allowed_risks.contains(&assessment.level) {
            self.logger.warn(&format!(
                "[LocalCommand] Rejected {} command ({}): {}",
                assessment.level, assessment.reason, command
            ));
            return Err(ToolError::Rejected(format!(
                "{} command not allowed: {}",
                assessment.level, assessment.reason
            )));
        }

        let timeout = Duration::from_secs(
            call.get_arg_u64("timeout_seconds")
                .unwrap_or(self.settings.default_timeout_secs),
        );

        let mut cmd = tokio::process::Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = call.get_arg_str("working_directory") {
            cmd.current_dir(dir);
        }

        self.logger
            .debug(&format!("[LocalCommand] Running ({}): {}", assessment.level, command));
        let started = Instant::now();
        let child = cmd
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to spawn: {}", e)))?;

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(ToolResult::cancelled(&call.id, &call.tool_name));
            }
            _ = tokio::time::sleep(timeout) => {
                return Err(ToolError::Timeout(timeout));
            }
            output = child.wait_with_output() => output
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?,
        };

        let duration = started.elapsed();
        let content = self.render(output.status.code(), duration, &output.stdout, &output.stderr);
        Ok(ToolResult::success(&call.id, &call.tool_name, content, duration))
    }
}
