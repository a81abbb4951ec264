//! Tool-enabled chat service
//!
//! Drives the model/tool loop: ask the model, resolve the tools it requests,
//! pass them through the approval gate, execute what was approved and feed the
//! results back, until the model answers or the round cap is hit.

use futures::channel::mpsc;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use super::approval::{ApprovalGate, ApprovalResponse, AutoApprove};
use super::{ChatError, ChatResult};
use crate::config::EngineSettings;
use crate::error::ApprovalError;
use crate::executor::ToolExecutor;
use crate::logging::Logger;
use crate::providers::{collect_turn, ModelProvider, ModelTurn, ProviderError, ProviderResult};
use crate::registry::ConnectorRegistry;
use crate::types::{
    CancellationToken, ChatMessage, ConnectorTool, GenerationEvent, ToolCall, ToolCallState,
    ToolDefinition, ToolExecutionRound, ToolResult,
};
use crate::{log_info, log_warn};

const DENIED_MESSAGE: &str = "Tool call denied";

/// Final answer of a generation request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOutcome {
    /// Assistant text of every turn, joined by blank lines
    pub text: String,
    pub rounds: Vec<ToolExecutionRound>,
    /// The round cap ended the loop
    pub forced_completion: bool,
    /// Tool names the model asked for that no connector exposes
    pub not_found: Vec<String>,
}

pub type GenerationStream = Pin<Box<dyn Stream<Item = GenerationEvent> + Send>>;

type Emit<'a> = &'a mut (dyn FnMut(GenerationEvent) + Send);

#[derive(Clone)]
pub struct ToolEnabledChatService {
    registry: ConnectorRegistry,
    executor: Arc<ToolExecutor>,
    gate: Arc<dyn ApprovalGate>,
    max_rounds: usize,
    logger: Arc<dyn Logger>,
}

impl ToolEnabledChatService {
    pub fn new(executor: Arc<ToolExecutor>, logger: Arc<dyn Logger>) -> Self {
        Self {
            registry: executor.registry().clone(),
            executor,
            gate: Arc::new(AutoApprove),
            max_rounds: EngineSettings::default().max_tool_rounds,
            logger,
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.gate = gate;
        self
    }

    /// At least one round always runs
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_settings(self, settings: &EngineSettings) -> Self {
        self.with_max_rounds(settings.max_tool_rounds)
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Run a request to completion
    pub async fn generate(
        &self,
        provider: &dyn ModelProvider,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> ChatResult<GenerationOutcome> {
        self.run(provider, messages, cancel, &mut |_: GenerationEvent| {}).await
    }

    /// Run a request in the background, streaming its events.
    ///
    /// The stream always ends with `GenerationComplete` or
    /// `GenerationInterrupted`. Dropping the stream cancels the request.
    pub fn generate_stream(
        &self,
        provider: Arc<dyn ModelProvider>,
        messages: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> GenerationStream {
        let (tx, rx) = mpsc::unbounded();
        let service = self.clone();

        tokio::spawn(async move {
            let request = cancel.child_token();
            let receiver_gone = request.clone();
            let mut emit = move |event: GenerationEvent| {
                if tx.unbounded_send(event).is_err() && !receiver_gone.is_cancelled() {
                    receiver_gone.cancel();
                }
            };
            if let Err(e) = service.run(&*provider, &messages, &request, &mut emit).await {
                service
                    .logger
                    .debug(&format!("[ChatService] Stream ended early: {}", e));
            }
        });

        Box::pin(rx)
    }

    async fn run(
        &self,
        provider: &dyn ModelProvider,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
        emit: Emit<'_>,
    ) -> ChatResult<GenerationOutcome> {
        let tools = self.registry.available_tools();
        if tools.is_empty() {
            return self.run_without_tools(provider, messages, cancel, emit).await;
        }

        let definitions: Vec<ToolDefinition> = tools.iter().map(ConnectorTool::definition).collect();
        log_info!(
            self.logger,
            "[ChatService] Generating with {} tools via {}",
            definitions.len(),
            provider.name()
        );

        let mut rounds: Vec<ToolExecutionRound> = Vec::new();
        let mut texts: Vec<String> = Vec::new();
        let mut not_found: Vec<String> = Vec::new();
        let mut forced_completion = true;

        for _ in 0..self.max_rounds {
            let turn = match self
                .model_turn(provider, messages, &definitions, &rounds, cancel, emit)
                .await
            {
                Ok(turn) => turn,
                Err(e) => return Err(self.interrupt(rounds, e, cancel, emit)),
            };

            if !turn.text.is_empty() {
                texts.push(turn.text.clone());
            }
            if turn.is_complete {
                forced_completion = false;
                break;
            }

            let calls = self.resolve_calls(&turn, &mut not_found);
            if calls.is_empty() {
                forced_completion = false;
                break;
            }

            let round = self.run_round(calls, turn.text, cancel, emit).await;
            emit(GenerationEvent::ToolRoundCompleted {
                round: round.clone(),
            });
            rounds.push(round);

            if cancel.is_cancelled() {
                return Err(self.interrupt(rounds, ProviderError::Cancelled, cancel, emit));
            }
        }

        if forced_completion {
            log_warn!(
                self.logger,
                "[ChatService] Stopped after {} tool rounds",
                self.max_rounds
            );
        }

        let text = texts.join("\n\n");
        emit(GenerationEvent::GenerationComplete {
            text: text.clone(),
            history: rounds.clone(),
            forced: forced_completion,
        });
        Ok(GenerationOutcome {
            text,
            rounds,
            forced_completion,
            not_found,
        })
    }

    async fn run_without_tools(
        &self,
        provider: &dyn ModelProvider,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
        emit: Emit<'_>,
    ) -> ChatResult<GenerationOutcome> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            result = provider.generate(messages, cancel) => result,
        };
        let text = match result {
            Ok(text) => text,
            Err(e) => return Err(self.interrupt(Vec::new(), e, cancel, emit)),
        };

        if !text.is_empty() {
            emit(GenerationEvent::ContentChunk { text: text.clone() });
        }
        emit(GenerationEvent::GenerationComplete {
            text: text.clone(),
            history: Vec::new(),
            forced: false,
        });
        Ok(GenerationOutcome {
            text,
            ..Default::default()
        })
    }

    async fn model_turn(
        &self,
        provider: &dyn ModelProvider,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        history: &[ToolExecutionRound],
        cancel: &CancellationToken,
        emit: Emit<'_>,
    ) -> ProviderResult<ModelTurn> {
        let turn = async {
            let stream = provider.stream_with_tools(messages, tools, history, cancel).await?;
            collect_turn(stream, |text| {
                emit(GenerationEvent::ContentChunk {
                    text: text.to_string(),
                })
            })
            .await
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            turn = turn => turn,
        }
    }

    /// Bind requests to tools by exposed name, then original name
    fn resolve_calls(&self, turn: &ModelTurn, not_found: &mut Vec<String>) -> Vec<ToolCall> {
        let mut calls = Vec::with_capacity(turn.tool_calls.len());
        for request in &turn.tool_calls {
            match self.registry.tool(&request.name) {
                Some(tool) => calls.push(ToolCall::resolve(request, &tool)),
                None => {
                    log_warn!(
                        self.logger,
                        "[ChatService] Model requested unknown tool: {}",
                        request.name
                    );
                    not_found.push(request.name.clone());
                }
            }
        }
        calls
    }

    async fn run_round(
        &self,
        calls: Vec<ToolCall>,
        assistant_text: String,
        cancel: &CancellationToken,
        emit: Emit<'_>,
    ) -> ToolExecutionRound {
        emit(GenerationEvent::ToolCallsStarted {
            calls: calls.clone(),
        });

        // None: the request was cancelled while waiting for a decision
        let approval = match self.gate.request_approval(&calls, cancel).await {
            Ok(response) => Some(response),
            Err(ApprovalError::Cancelled) => None,
            Err(e) => {
                log_warn!(self.logger, "[ChatService] Approval failed, denying all: {}", e);
                Some(ApprovalResponse::deny_all(&calls))
            }
        };

        // Results are produced and reported in the order the model asked for them
        let child = cancel.child_token();
        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            let (result, state) = match &approval {
                None => (
                    ToolResult::cancelled(&call.id, &call.tool_name),
                    ToolCallState::Cancelled,
                ),
                Some(approval) if !approval.is_approved(&call.id) => (
                    ToolResult::failure(&call.id, &call.tool_name, DENIED_MESSAGE, false, Duration::ZERO),
                    ToolCallState::Denied,
                ),
                Some(_) => {
                    let result = self.executor.execute(call, &child).await;
                    let state = settled_state(&result);
                    (result, state)
                }
            };
            emit(GenerationEvent::updated_from(&result, state));
            emit(GenerationEvent::ToolResultReady {
                result: result.clone(),
            });
            results.push(result);
        }

        ToolExecutionRound {
            tool_calls: calls,
            results,
            assistant_text,
        }
    }

    fn interrupt(
        &self,
        rounds: Vec<ToolExecutionRound>,
        error: ProviderError,
        cancel: &CancellationToken,
        emit: Emit<'_>,
    ) -> ChatError {
        let cancelled = error.is_cancelled() || cancel.is_cancelled();
        log_warn!(
            self.logger,
            "[ChatService] Generation interrupted after {} rounds: {}",
            rounds.len(),
            error
        );
        emit(GenerationEvent::GenerationInterrupted {
            history: rounds.clone(),
            error: error.to_string(),
        });
        if cancelled {
            ChatError::Cancelled { rounds }
        } else {
            ChatError::Interrupted {
                rounds,
                source: error,
            }
        }
    }
}

fn settled_state(result: &ToolResult) -> ToolCallState {
    if result.is_cancelled() {
        ToolCallState::Cancelled
    } else if result.is_success() {
        ToolCallState::Completed
    } else {
        ToolCallState::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ApprovalDecision, ApprovalRequest, DenyAll, TimedApprovalGate};
    use crate::config::ConnectorConfig;
    use crate::connectors::transport::fake::{FakeFactory, FakeServer, FakeTool};
    use crate::connectors::{Connector, McpConnector};
    use crate::logging::{LogLevel, MemoryLogger, NoOpLogger};
    use crate::providers::{MockProvider, MockStep};
    use crate::secrets::MemorySecretStore;
    use crate::types::ToolCallRequest;
    use futures::StreamExt;
    use serde_json::json;

    async fn service_with(tools: Vec<(&str, FakeTool)>, logger: Arc<dyn Logger>) -> ToolEnabledChatService {
        let registry = ConnectorRegistry::new(Arc::new(NoOpLogger));
        if !tools.is_empty() {
            let connector = McpConnector::new(
                ConnectorConfig::stdio("fake", "Fake", "fake-server", vec![]),
                Arc::new(FakeFactory(Arc::new(FakeServer::with_tools(tools)))),
                Arc::new(MemorySecretStore::new()),
                Arc::new(NoOpLogger),
            );
            registry
                .register(Arc::new(connector) as Arc<dyn Connector>)
                .unwrap();
            registry.connect("fake").await.unwrap();
        }
        let executor = Arc::new(ToolExecutor::new(registry, Arc::new(NoOpLogger)));
        ToolEnabledChatService::new(executor, logger)
    }

    fn echo_call(x: &str) -> MockStep {
        MockStep::call("echo", json!({ "x": x }))
    }

    /// Approves the first call of each request and denies the rest
    struct ApproveFirst;

    #[async_trait::async_trait]
    impl ApprovalGate for ApproveFirst {
        async fn request_approval(
            &self,
            calls: &[ToolCall],
            _cancel: &CancellationToken,
        ) -> Result<ApprovalResponse, ApprovalError> {
            Ok(ApprovalResponse::from_decisions(calls.iter().enumerate().map(
                |(index, call)| {
                    let decision = if index == 0 {
                        ApprovalDecision::Approved
                    } else {
                        ApprovalDecision::Denied
                    };
                    (call.id.clone(), decision)
                },
            )))
        }
    }

    #[tokio::test]
    async fn test_end_to_end_echo() {
        let service = service_with(vec![("echo", FakeTool::Echo)], Arc::new(NoOpLogger)).await;
        let provider = MockProvider::scripted(
            vec![echo_call("hi"), MockStep::text("The tool said hi")],
            Arc::new(NoOpLogger),
        );

        let outcome = service
            .generate(&provider, &[ChatMessage::user("say hi")], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.text, "The tool said hi");
        assert!(!outcome.forced_completion);
        assert_eq!(outcome.rounds.len(), 1);
        assert_eq!(outcome.rounds[0].results[0].text(), "hi");
        assert_eq!(
            outcome.rounds[0].tool_calls[0].id,
            outcome.rounds[0].results[0].call_id
        );

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tool_names, vec!["echo"]);
        assert_eq!(requests[1].history.len(), 1);
    }

    #[tokio::test]
    async fn test_round_cap_forces_completion() {
        let service = service_with(vec![("echo", FakeTool::Echo)], Arc::new(NoOpLogger))
            .await
            .with_max_rounds(3);
        let provider = MockProvider::always_call("echo", json!({"x": "again"}), Arc::new(NoOpLogger));

        let outcome = service
            .generate(&provider, &[ChatMessage::user("loop")], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 3);
        assert!(outcome.forced_completion);
        assert_eq!(outcome.rounds.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_dropped_and_logged() {
        let logger = Arc::new(MemoryLogger::new());
        let service = service_with(vec![("echo", FakeTool::Echo)], logger.clone()).await;
        let provider = MockProvider::scripted(
            vec![MockStep::ToolCalls {
                text: "Trying".into(),
                calls: vec![ToolCallRequest::new("nope", json!({}))],
            }],
            Arc::new(NoOpLogger),
        );

        let outcome = service
            .generate(&provider, &[ChatMessage::user("go")], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.not_found, vec!["nope"]);
        assert!(outcome.rounds.is_empty());
        assert_eq!(outcome.text, "Trying");
        assert_eq!(provider.call_count(), 1);
        assert!(logger.contains(LogLevel::Warn, "nope"));
    }

    #[tokio::test]
    async fn test_denied_calls_get_results() {
        let service = service_with(vec![("echo", FakeTool::Echo)], Arc::new(NoOpLogger))
            .await
            .with_gate(Arc::new(DenyAll));
        let provider = MockProvider::scripted(
            vec![echo_call("hi"), MockStep::text("ok")],
            Arc::new(NoOpLogger),
        );

        let outcome = service
            .generate(&provider, &[ChatMessage::user("go")], &CancellationToken::new())
            .await
            .unwrap();

        let result = &outcome.rounds[0].results[0];
        assert!(!result.is_success());
        assert!(!result.is_retryable());
        assert_eq!(result.text(), DENIED_MESSAGE);
        assert_eq!(outcome.text, "ok");
    }

    #[tokio::test]
    async fn test_model_failure_interrupts() {
        let service = service_with(vec![("echo", FakeTool::Echo)], Arc::new(NoOpLogger)).await;
        let provider = MockProvider::scripted(
            vec![echo_call("hi"), MockStep::Error("boom".into())],
            Arc::new(NoOpLogger),
        );

        let err = service
            .generate(&provider, &[ChatMessage::user("go")], &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ChatError::Interrupted { rounds, source } => {
                assert_eq!(rounds.len(), 1);
                assert!(source.to_string().contains("boom"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let service = service_with(vec![("echo", FakeTool::Echo)], Arc::new(NoOpLogger)).await;
        let provider = MockProvider::always_call("echo", json!({"x": "hi"}), Arc::new(NoOpLogger));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = service
            .generate(&provider, &[ChatMessage::user("go")], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Cancelled { .. }));
        assert!(err.rounds().is_empty());
    }

    #[tokio::test]
    async fn test_without_tools_generates_directly() {
        let service = service_with(vec![], Arc::new(NoOpLogger)).await;
        let provider = MockProvider::echo(Arc::new(NoOpLogger));

        let outcome = service
            .generate(&provider, &[ChatMessage::user("plain")], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.text, "Echo: plain");
        assert!(outcome.rounds.is_empty());
        assert!(provider.requests()[0].tool_names.is_empty());
    }

    #[tokio::test]
    async fn test_stream_events() {
        let service = service_with(vec![("echo", FakeTool::Echo)], Arc::new(NoOpLogger)).await;
        let provider: Arc<dyn ModelProvider> = Arc::new(MockProvider::scripted(
            vec![echo_call("hi"), MockStep::text("done")],
            Arc::new(NoOpLogger),
        ));

        let events: Vec<GenerationEvent> = service
            .generate_stream(provider, vec![ChatMessage::user("go")], CancellationToken::new())
            .collect()
            .await;

        assert!(matches!(events.first(), Some(GenerationEvent::ToolCallsStarted { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            GenerationEvent::ToolCallUpdated { state: ToolCallState::Completed, .. }
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, GenerationEvent::ToolResultReady { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, GenerationEvent::ToolRoundCompleted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, GenerationEvent::ContentChunk { text } if text == "done")));
        match events.last() {
            Some(GenerationEvent::GenerationComplete { text, history, forced }) => {
                assert_eq!(text, "done");
                assert_eq!(history.len(), 1);
                assert!(!forced);
            }
            other => panic!("unexpected last event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_ends_with_interruption() {
        let service = service_with(vec![("echo", FakeTool::Echo)], Arc::new(NoOpLogger)).await;
        let provider: Arc<dyn ModelProvider> = Arc::new(MockProvider::scripted(
            vec![MockStep::Error("down".into())],
            Arc::new(NoOpLogger),
        ));

        let events: Vec<GenerationEvent> = service
            .generate_stream(provider, vec![ChatMessage::user("go")], CancellationToken::new())
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert!(events[0].is_terminal());
        assert!(matches!(
            &events[0],
            GenerationEvent::GenerationInterrupted { error, .. } if error.contains("down")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_tool_round() {
        let service = service_with(
            vec![("slow", FakeTool::Slow(Duration::from_secs(30), "late".into()))],
            Arc::new(NoOpLogger),
        )
        .await;
        let provider = MockProvider::always_call("slow", json!({}), Arc::new(NoOpLogger));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let mut events = Vec::new();
        let err = service
            .run(
                &provider,
                &[ChatMessage::user("go")],
                &cancel,
                &mut |event: GenerationEvent| events.push(event),
            )
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(30));

        match err {
            ChatError::Cancelled { rounds } => {
                assert_eq!(rounds.len(), 1);
                assert!(rounds[0].results[0].is_cancelled());
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(provider.call_count(), 1);
        assert!(events.iter().any(|e| matches!(
            e,
            GenerationEvent::ToolCallUpdated { state: ToolCallState::Cancelled, .. }
        )));
        assert!(matches!(
            events.last(),
            Some(GenerationEvent::GenerationInterrupted { .. })
        ));
    }

    #[tokio::test]
    async fn test_round_events_follow_call_order() {
        let service = service_with(vec![("echo", FakeTool::Echo)], Arc::new(NoOpLogger))
            .await
            .with_gate(Arc::new(ApproveFirst));
        let provider = MockProvider::scripted(
            vec![
                MockStep::ToolCalls {
                    text: String::new(),
                    calls: vec![
                        ToolCallRequest::new("echo", json!({"x": "first"})),
                        ToolCallRequest::new("echo", json!({"x": "second"})),
                    ],
                },
                MockStep::text("ok"),
            ],
            Arc::new(NoOpLogger),
        );

        let mut events = Vec::new();
        let outcome = service
            .run(
                &provider,
                &[ChatMessage::user("go")],
                &CancellationToken::new(),
                &mut |event: GenerationEvent| events.push(event),
            )
            .await
            .unwrap();

        let round = &outcome.rounds[0];
        let expected: Vec<String> = round.tool_calls.iter().map(|c| c.id.clone()).collect();
        let updates: Vec<(String, ToolCallState)> = events
            .iter()
            .filter_map(|e| match e {
                GenerationEvent::ToolCallUpdated { id, state, .. } => Some((id.clone(), *state)),
                _ => None,
            })
            .collect();
        assert_eq!(
            updates,
            vec![
                (expected[0].clone(), ToolCallState::Completed),
                (expected[1].clone(), ToolCallState::Denied),
            ]
        );
        let ready: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                GenerationEvent::ToolResultReady { result } => Some(result.call_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ready, expected);
        assert_eq!(round.results[0].text(), "first");
        assert_eq!(round.results[1].text(), DENIED_MESSAGE);
    }

    #[tokio::test]
    async fn test_cancel_while_awaiting_approval() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let gate = TimedApprovalGate::new(
            Duration::from_secs(60),
            Arc::new(move |_: ApprovalRequest| trigger.cancel()),
            Arc::new(NoOpLogger),
        );
        let service = service_with(vec![("echo", FakeTool::Echo)], Arc::new(NoOpLogger))
            .await
            .with_gate(Arc::new(gate));
        let provider = MockProvider::always_call("echo", json!({"x": "hi"}), Arc::new(NoOpLogger));

        let err = service
            .generate(&provider, &[ChatMessage::user("go")], &cancel)
            .await
            .unwrap_err();

        match err {
            ChatError::Cancelled { rounds } => {
                let result = &rounds[0].results[0];
                assert!(result.is_cancelled());
                assert_ne!(result.text(), DENIED_MESSAGE);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_stream_stops_the_loop() {
        let service = service_with(
            vec![("slow", FakeTool::Slow(Duration::from_secs(1), "tick".into()))],
            Arc::new(NoOpLogger),
        )
        .await
        .with_max_rounds(50);
        let provider = Arc::new(MockProvider::always_call("slow", json!({}), Arc::new(NoOpLogger)));

        let mut stream = service.generate_stream(
            Arc::clone(&provider) as Arc<dyn ModelProvider>,
            vec![ChatMessage::user("go")],
            CancellationToken::new(),
        );
        assert!(matches!(
            stream.next().await,
            Some(GenerationEvent::ToolCallsStarted { .. })
        ));
        drop(stream);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(provider.call_count(), 1);
    }
}
