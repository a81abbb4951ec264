//! Tool executor
//!
//! Runs tool calls against the registry with a bounded timeout and
//! cancellation. Every call produces exactly one `ToolResult`; routing and
//! execution errors become failure results.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::EngineSettings;
use crate::error::ToolError;
use crate::logging::Logger;
use crate::registry::ConnectorRegistry;
use crate::types::{CancellationToken, ToolCall, ToolResult};

/// Results of a batch, in call order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub results: Vec<ToolResult>,
    /// Longest individual duration
    pub duration: Duration,
}

impl BatchResult {
    fn from_results(results: Vec<ToolResult>) -> Self {
        let duration = results
            .iter()
            .map(|r| r.duration)
            .max()
            .unwrap_or_default();
        Self { results, duration }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ToolResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ToolResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(ToolResult::is_success)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Executes tool calls routed through a `ConnectorRegistry`
pub struct ToolExecutor {
    registry: ConnectorRegistry,
    timeout: Duration,
    logger: Arc<dyn Logger>,
}

impl ToolExecutor {
    pub fn new(registry: ConnectorRegistry, logger: Arc<dyn Logger>) -> Self {
        Self {
            registry,
            timeout: EngineSettings::default().tool_timeout(),
            logger,
        }
    }

    /// Take the per-call timeout from `tool_timeout_ms`
    pub fn with_settings(self, settings: &EngineSettings) -> Self {
        self.with_timeout(settings.tool_timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute one call. Never fails: errors become failure results.
    pub async fn execute(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolResult {
        if cancel.is_cancelled() {
            return ToolResult::cancelled(&call.id, &call.tool_name);
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return ToolResult::cancelled(&call.id, &call.tool_name);
            }
            _ = tokio::time::sleep(self.timeout) => Err(ToolError::Timeout(self.timeout)),
            outcome = self.registry.execute_tool(call, cancel) => outcome,
        };

        match outcome {
            Ok(result) => {
                self.logger.debug(&format!(
                    "[ToolExecutor] {} finished in {:?} (success: {})",
                    call.tool_name,
                    result.duration,
                    result.is_success()
                ));
                result
            }
            Err(e) => {
                self.logger
                    .warn(&format!("[ToolExecutor] {} failed: {}", call.tool_name, e));
                ToolResult::failure(
                    &call.id,
                    &call.tool_name,
                    e.to_string(),
                    e.is_retryable(),
                    started.elapsed(),
                )
            }
        }
    }

    /// Execute calls sequentially, preserving order
    pub async fn execute_batch(&self, calls: &[ToolCall], cancel: &CancellationToken) -> BatchResult {
        self.execute_batch_with(calls, cancel, |_, _| {}).await
    }

    /// Like `execute_batch`, reporting each result as soon as it exists.
    ///
    /// Once cancellation is observed every remaining call becomes a cancelled
    /// result without being dispatched.
    pub async fn execute_batch_with<F>(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
        mut on_result: F,
    ) -> BatchResult
    where
        F: FnMut(usize, &ToolResult) + Send,
    {
        let mut results = Vec::with_capacity(calls.len());
        for (index, call) in calls.iter().enumerate() {
            let result = if cancel.is_cancelled() {
                ToolResult::cancelled(&call.id, &call.tool_name)
            } else {
                self.execute(call, cancel).await
            };
            on_result(index, &result);
            results.push(result);
        }
        BatchResult::from_results(results)
    }
}
