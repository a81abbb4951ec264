//! Approval gate between tool-call resolution and execution

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::config::EngineSettings;
use crate::error::ApprovalError;
use crate::logging::Logger;
use crate::types::{CancellationToken, ToolCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Denied,
}

/// Decision per call id. Calls without an approval are denied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub approved_ids: HashSet<String>,
    pub decisions: HashMap<String, ApprovalDecision>,
}

impl ApprovalResponse {
    pub fn from_decisions(decisions: impl IntoIterator<Item = (String, ApprovalDecision)>) -> Self {
        let decisions: HashMap<_, _> = decisions.into_iter().collect();
        let approved_ids = decisions
            .iter()
            .filter(|(_, d)| **d == ApprovalDecision::Approved)
            .map(|(id, _)| id.clone())
            .collect();
        Self {
            approved_ids,
            decisions,
        }
    }

    pub fn approve_all(calls: &[ToolCall]) -> Self {
        Self::from_decisions(calls.iter().map(|c| (c.id.clone(), ApprovalDecision::Approved)))
    }

    pub fn deny_all(calls: &[ToolCall]) -> Self {
        Self::from_decisions(calls.iter().map(|c| (c.id.clone(), ApprovalDecision::Denied)))
    }

    pub fn is_approved(&self, call_id: &str) -> bool {
        self.approved_ids.contains(call_id)
    }
}

/// Human-in-the-loop filter over resolved tool calls
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn request_approval(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Result<ApprovalResponse, ApprovalError>;
}

/// Approves everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn request_approval(
        &self,
        calls: &[ToolCall],
        _cancel: &CancellationToken,
    ) -> Result<ApprovalResponse, ApprovalError> {
        Ok(ApprovalResponse::approve_all(calls))
    }
}

/// Denies everything
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

#[async_trait]
impl ApprovalGate for DenyAll {
    async fn request_approval(
        &self,
        calls: &[ToolCall],
        _cancel: &CancellationToken,
    ) -> Result<ApprovalResponse, ApprovalError> {
        Ok(ApprovalResponse::deny_all(calls))
    }
}

/// A pending approval, handed to whoever shows it to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub request_id: String,
    pub calls: Vec<ToolCall>,
}

pub type ApprovalHandler = Arc<dyn Fn(ApprovalRequest) + Send + Sync>;

/// Forwards requests to a handler and waits for `respond`.
///
/// A request left unanswered past the timeout fails with
/// `ApprovalError::TimedOut`, which callers treat as denial of every call.
pub struct TimedApprovalGate {
    timeout: Duration,
    handler: ApprovalHandler,
    pending: Mutex<HashMap<String, oneshot::Sender<ApprovalResponse>>>,
    logger: Arc<dyn Logger>,
}

impl TimedApprovalGate {
    pub fn new(timeout: Duration, handler: ApprovalHandler, logger: Arc<dyn Logger>) -> Self {
        Self {
            timeout,
            handler,
            pending: Mutex::new(HashMap::new()),
            logger,
        }
    }

    /// Gate that waits up to `approval_timeout_ms`
    pub fn from_settings(
        settings: &EngineSettings,
        handler: ApprovalHandler,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self::new(settings.approval_timeout(), handler, logger)
    }

    /// Answer a pending request. Returns false if it already resolved.
    pub fn respond(&self, request_id: &str, response: ApprovalResponse) -> bool {
        let sender = self.pending.lock().remove(request_id);
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => {
                self.logger.debug(&format!(
                    "[ApprovalGate] Response for unknown request {}",
                    request_id
                ));
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl ApprovalGate for TimedApprovalGate {
    async fn request_approval(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Result<ApprovalResponse, ApprovalError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        (self.handler)(ApprovalRequest {
            request_id: request_id.clone(),
            calls: calls.to_vec(),
        });

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ApprovalError::Cancelled),
            _ = tokio::time::sleep(self.timeout) => Err(ApprovalError::TimedOut),
            response = rx => response.map_err(|_| ApprovalError::Cancelled),
        };

        self.pending.lock().remove(&request_id);
        if let Err(e) = &outcome {
            self.logger.warn(&format!(
                "[ApprovalGate] Request {} for {} calls: {}",
                request_id,
                calls.len(),
                e
            ));
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NoOpLogger;
    use serde_json::Map;
    use tokio::sync::mpsc;

    fn calls(ids: &[&str]) -> Vec<ToolCall> {
        ids.iter()
            .map(|id| ToolCall {
                id: id.to_string(),
                connector_id: "fs".into(),
                tool_name: "read".into(),
                original_tool_name: "read".into(),
                arguments: Map::new(),
            })
            .collect()
    }

    #[test]
    fn test_response_helpers() {
        let calls = calls(&["a", "b"]);
        let all = ApprovalResponse::approve_all(&calls);
        assert!(all.is_approved("a") && all.is_approved("b"));

        let none = ApprovalResponse::deny_all(&calls);
        assert!(none.approved_ids.is_empty());
        assert_eq!(none.decisions.get("a"), Some(&ApprovalDecision::Denied));

        let mixed = ApprovalResponse::from_decisions(vec![
            ("a".to_string(), ApprovalDecision::Approved),
            ("b".to_string(), ApprovalDecision::Denied),
        ]);
        assert!(mixed.is_approved("a"));
        assert!(!mixed.is_approved("b"));
        assert!(!mixed.is_approved("unknown"));
    }

    #[tokio::test]
    async fn test_timed_gate_forwards_response() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gate = Arc::new(TimedApprovalGate::new(
            Duration::from_secs(30),
            Arc::new(move |request: ApprovalRequest| {
                let _ = tx.send(request);
            }),
            Arc::new(NoOpLogger),
        ));

        let responder = Arc::clone(&gate);
        tokio::spawn(async move {
            let request = rx.recv().await.unwrap();
            let response = ApprovalResponse::from_decisions(vec![
                (request.calls[0].id.clone(), ApprovalDecision::Approved),
                (request.calls[1].id.clone(), ApprovalDecision::Denied),
            ]);
            assert!(responder.respond(&request.request_id, response));
        });

        let response = gate
            .request_approval(&calls(&["a", "b"]), &CancellationToken::new())
            .await
            .unwrap();
        assert!(response.is_approved("a"));
        assert!(!response.is_approved("b"));
        assert_eq!(gate.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_gate_times_out() {
        let gate = TimedApprovalGate::new(Duration::from_secs(5), Arc::new(|_: ApprovalRequest| {}), Arc::new(NoOpLogger));
        let result = gate.request_approval(&calls(&["a"]), &CancellationToken::new()).await;
        assert_eq!(result, Err(ApprovalError::TimedOut));
        assert_eq!(gate.pending_count(), 0);
        assert!(!gate.respond("late", ApprovalResponse::default()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_timeout_from_settings() {
        let settings = EngineSettings {
            approval_timeout_ms: 2_000,
            ..Default::default()
        };
        let gate = TimedApprovalGate::from_settings(
            &settings,
            Arc::new(|_: ApprovalRequest| {}),
            Arc::new(NoOpLogger),
        );

        let started = tokio::time::Instant::now();
        let result = gate.request_approval(&calls(&["a"]), &CancellationToken::new()).await;
        assert_eq!(result, Err(ApprovalError::TimedOut));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_timed_gate_cancelled() {
        let gate = TimedApprovalGate::new(Duration::from_secs(60), Arc::new(|_: ApprovalRequest| {}), Arc::new(NoOpLogger));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = gate.request_approval(&calls(&["a"]), &cancel).await;
        assert_eq!(result, Err(ApprovalError::Cancelled));
    }
}
