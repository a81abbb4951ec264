//! Connector registry
//!
//! Owns the registered connectors and serializes their lifecycle:
//! registration, connect/disconnect, enable/disable, reconfiguration and
//! backoff retries. Maintains the aggregated tool list and publishes a
//! `RegistrySnapshot` on every change.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;

use super::retry::{backoff_delay, RetryTable};
use super::snapshot::{disambiguate, ConnectorSummary, RegistrySnapshot};
use super::{RegistryError, RegistryResult};
use crate::config::{ConnectorConfig, ConnectorConfigProvider, RetryPolicy};
use crate::connectors::{
    BuiltinFactory, Connector, ConnectorFactory, ConnectorState, ObserverId, ServerInfo,
};
use crate::error::ToolError;
use crate::logging::Logger;
use crate::types::{CancellationToken, ConnectorTool, ToolCall, ToolResult};

struct Entry {
    connector: Arc<dyn Connector>,
    observer: ObserverId,
}

#[derive(Default)]
struct RegistryState {
    /// Registration order
    entries: Vec<Entry>,
    /// Registry view of each connector's state
    states: HashMap<String, ConnectorState>,
    /// Ids disconnected on request; late errors from them are ignored
    intentional: HashSet<String>,
    tools: Vec<ConnectorTool>,
    revision: u64,
}

impl RegistryState {
    fn find(&self, id: &str) -> Option<Arc<dyn Connector>> {
        self.entries
            .iter()
            .find(|e| e.connector.id() == id)
            .map(|e| Arc::clone(&e.connector))
    }

    fn is_connected(&self, id: &str) -> bool {
        self.states.get(id).is_some_and(ConnectorState::is_connected)
    }
}

#[derive(Clone)]
struct ConfigSource {
    provider: Arc<dyn ConnectorConfigProvider>,
    factory: Arc<dyn ConnectorFactory>,
}

struct RegistryInner {
    state: Mutex<RegistryState>,
    retries: RetryTable,
    policy: RwLock<RetryPolicy>,
    builtins: RwLock<Vec<BuiltinFactory>>,
    source: RwLock<Option<ConfigSource>>,
    snapshot: watch::Sender<RegistrySnapshot>,
    logger: Arc<dyn Logger>,
}

impl RegistryInner {
    /// Recompute the aggregate from the latest states and publish a snapshot
    fn refresh(&self, state: &mut RegistryState) {
        let raw: Vec<ConnectorTool> = state
            .entries
            .iter()
            .filter(|e| state.is_connected(e.connector.id()))
            .flat_map(|e| e.connector.tools())
            .collect();
        state.tools = disambiguate(raw);
        state.revision += 1;

        let connectors = state
            .entries
            .iter()
            .map(|e| {
                let id = e.connector.id();
                ConnectorSummary {
                    id: id.to_string(),
                    name: e.connector.name().to_string(),
                    kind: e.connector.kind(),
                    enabled: e.connector.is_enabled(),
                    state: state
                        .states
                        .get(id)
                        .cloned()
                        .unwrap_or(ConnectorState::Disconnected),
                    tool_count: state.tools.iter().filter(|t| t.connector_id == id).count(),
                }
            })
            .collect();

        self.snapshot.send_replace(RegistrySnapshot {
            revision: state.revision,
            connectors,
            tools: state.tools.clone(),
        });
    }

    fn publish(&self) {
        let mut state = self.state.lock();
        self.refresh(&mut state);
    }

    /// Observer entry point: re-read the connector's latest state
    fn on_state_change(&self, id: &str) {
        let mut state = self.state.lock();
        let Some(connector) = state.find(id) else {
            return;
        };
        let latest = connector.state();
        if latest.is_error() && state.intentional.contains(id) {
            self.logger.debug(&format!(
                "[ConnectorRegistry] Ignoring error from {} after disconnect",
                id
            ));
            return;
        }
        state.states.insert(id.to_string(), latest);
        self.refresh(&mut state);
    }
}

/// Registry of connectors. Cloning is cheap and shares the registry.
#[derive(Clone)]
pub struct ConnectorRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectorRegistry {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        let (snapshot, _) = watch::channel(RegistrySnapshot::default());
        Self {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(RegistryState::default()),
                retries: RetryTable::default(),
                policy: RwLock::new(RetryPolicy::default()),
                builtins: RwLock::new(Vec::new()),
                source: RwLock::new(None),
                snapshot,
                logger,
            }),
        }
    }

    pub fn with_retry_policy(self, policy: RetryPolicy) -> Self {
        self.set_retry_policy(policy);
        self
    }

    /// Add a built-in connector factory used by `connect_all_enabled`
    pub fn with_builtin(self, factory: BuiltinFactory) -> Self {
        self.inner.builtins.write().push(factory);
        self
    }

    /// Source of configured connectors used by `connect_all_enabled` and `reconfigure`
    pub fn with_config_source(
        self,
        provider: Arc<dyn ConnectorConfigProvider>,
        factory: Arc<dyn ConnectorFactory>,
    ) -> Self {
        *self.inner.source.write() = Some(ConfigSource { provider, factory });
        self
    }

    pub fn set_retry_policy(&self, policy: RetryPolicy) {
        *self.inner.policy.write() = policy;
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.policy.read().clone()
    }

    // ========== Registration ==========

    /// Add a connector and start following its state
    pub fn register(&self, connector: Arc<dyn Connector>) -> RegistryResult<()> {
        let id = connector.id().to_string();
        if self.inner.state.lock().find(&id).is_some() {
            return Err(RegistryError::DuplicateId(id));
        }

        let weak = Arc::downgrade(&self.inner);
        let observer = connector.observe(Arc::new(move |id: &str, _: &ConnectorState| {
            if let Some(inner) = weak.upgrade() {
                inner.on_state_change(id);
            }
        }));

        let mut state = self.inner.state.lock();
        if state.find(&id).is_some() {
            drop(state);
            connector.remove_observer(observer);
            return Err(RegistryError::DuplicateId(id));
        }
        state.states.insert(id.clone(), connector.state());
        state.entries.push(Entry {
            connector,
            observer,
        });
        self.inner.refresh(&mut state);
        drop(state);

        self.inner
            .logger
            .info(&format!("[ConnectorRegistry] Registered {}", id));
        Ok(())
    }

    /// Remove a connector, cancelling its retry and tearing it down
    pub async fn unregister(&self, id: &str) -> RegistryResult<()> {
        self.inner.retries.remove(id);
        let entry = {
            let mut state = self.inner.state.lock();
            let index = state
                .entries
                .iter()
                .position(|e| e.connector.id() == id)
                .ok_or_else(|| RegistryError::UnknownConnector(id.to_string()))?;
            let entry = state.entries.remove(index);
            state.states.remove(id);
            state.intentional.remove(id);
            self.inner.refresh(&mut state);
            entry
        };

        entry.connector.remove_observer(entry.observer);
        entry.connector.disconnect().await;
        self.inner
            .logger
            .info(&format!("[ConnectorRegistry] Unregistered {}", id));
        Ok(())
    }

    // ========== Lifecycle ==========

    /// Connect on request. Starts a new retry streak and clears any
    /// intentional-disconnect mark.
    pub async fn connect(&self, id: &str) -> RegistryResult<ServerInfo> {
        let connector = self.require(id)?;
        self.inner.retries.reset(id);
        self.inner.state.lock().intentional.remove(id);
        self.attempt(connector).await
    }

    /// Disconnect on request. The registry records `disconnected` before the
    /// teardown is awaited.
    pub async fn disconnect(&self, id: &str) -> RegistryResult<()> {
        let connector = self.require(id)?;
        self.inner.retries.reset(id);
        {
            let mut state = self.inner.state.lock();
            state.intentional.insert(id.to_string());
            state
                .states
                .insert(id.to_string(), ConnectorState::Disconnected);
            self.inner.refresh(&mut state);
        }
        connector.disconnect().await;
        Ok(())
    }

    /// Enable or disable a connector. Disabling disconnects it and cancels
    /// its pending retry.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> RegistryResult<()> {
        let connector = self.require(id)?;
        connector.set_enabled(enabled);
        if enabled {
            self.inner.publish();
            Ok(())
        } else {
            self.disconnect(id).await
        }
    }

    /// Replace a connector wholesale with one built from `config`, then
    /// connect it if enabled
    pub async fn reconfigure(&self, config: ConnectorConfig) -> RegistryResult<()> {
        let source = self.config_source().ok_or(RegistryError::NoFactory)?;
        if self.connector(&config.id).is_some() {
            self.unregister(&config.id).await?;
        }

        let connector = source.factory.create(&config);
        let enabled = connector.is_enabled();
        self.register(connector)?;
        if enabled {
            self.connect(&config.id).await?;
        }
        Ok(())
    }

    /// Register built-ins and configured connectors that are missing, then
    /// connect every enabled connector in order.
    ///
    /// A failure schedules that connector's retry and does not stop the rest.
    pub async fn connect_all_enabled(&self) -> Vec<(String, RegistryResult<ServerInfo>)> {
        self.ensure_builtins();
        self.load_configured().await;

        let mut outcomes = Vec::new();
        for connector in self.connectors() {
            let id = connector.id().to_string();
            if !self.can_connect(&id) {
                continue;
            }
            let outcome = self.connect(&id).await;
            if let Err(e) = &outcome {
                self.inner
                    .logger
                    .warn(&format!("[ConnectorRegistry] {}", e));
            }
            outcomes.push((id, outcome));
        }
        outcomes
    }

    /// Disconnect every connector and cancel all pending retries
    pub async fn disconnect_all(&self) {
        self.inner.retries.cancel_all();
        for connector in self.connectors() {
            if connector.state() != ConnectorState::Disconnected {
                // Registered ids cannot be unknown here
                let _ = self.disconnect(connector.id()).await;
            }
        }
    }

    // ========== Lookups ==========

    pub fn connector(&self, id: &str) -> Option<Arc<dyn Connector>> {
        self.inner.state.lock().find(id)
    }

    pub fn connectors(&self) -> Vec<Arc<dyn Connector>> {
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .map(|e| Arc::clone(&e.connector))
            .collect()
    }

    /// Resolve a tool by exposed name, then by original name
    pub fn tool(&self, name: &str) -> Option<ConnectorTool> {
        let state = self.inner.state.lock();
        state
            .tools
            .iter()
            .find(|t| t.name == name)
            .or_else(|| state.tools.iter().find(|t| t.original_name == name))
            .cloned()
    }

    /// Aggregated tools of one connector
    pub fn tools_for(&self, id: &str) -> Vec<ConnectorTool> {
        self.inner
            .state
            .lock()
            .tools
            .iter()
            .filter(|t| t.connector_id == id)
            .cloned()
            .collect()
    }

    /// Tools of every connected connector, with unique exposed names
    pub fn available_tools(&self) -> Vec<ConnectorTool> {
        self.inner.state.lock().tools.clone()
    }

    pub fn state(&self, id: &str) -> Option<ConnectorState> {
        self.inner.state.lock().states.get(id).cloned()
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.inner.state.lock().is_connected(id)
    }

    /// Registered, enabled and neither connecting nor connected
    pub fn can_connect(&self, id: &str) -> bool {
        let state = self.inner.state.lock();
        let Some(connector) = state.find(id) else {
            return false;
        };
        connector.is_enabled()
            && matches!(
                state.states.get(id),
                Some(ConnectorState::Disconnected) | Some(ConnectorState::Error(_))
            )
    }

    pub fn has_connected_connectors(&self) -> bool {
        self.inner
            .state
            .lock()
            .states
            .values()
            .any(ConnectorState::is_connected)
    }

    pub fn subscribe(&self) -> watch::Receiver<RegistrySnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Retries issued in the connector's current failure streak
    pub fn retry_attempts(&self, id: &str) -> u32 {
        self.inner.retries.attempts(id)
    }

    pub fn has_pending_retry(&self, id: &str) -> bool {
        self.inner.retries.is_pending(id)
    }

    // ========== Execution ==========

    /// Route a call to its connector. No retries.
    pub async fn execute_tool(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let connector = self
            .connector(&call.connector_id)
            .ok_or_else(|| ToolError::ConnectorNotFound(call.connector_id.clone()))?;
        if !self.is_connected(&call.connector_id) {
            return Err(ToolError::NotConnected(call.connector_id.clone()));
        }
        connector.execute_tool(call, cancel).await
    }

    // ========== Internals ==========

    fn require(&self, id: &str) -> RegistryResult<Arc<dyn Connector>> {
        self.connector(id)
            .ok_or_else(|| RegistryError::UnknownConnector(id.to_string()))
    }

    fn config_source(&self) -> Option<ConfigSource> {
        self.inner.source.read().clone()
    }

    fn ensure_builtins(&self) {
        let factories = self.inner.builtins.read().clone();
        for factory in factories {
            let connector = factory();
            if self.connector(connector.id()).is_some() {
                continue;
            }
            if let Err(e) = self.register(connector) {
                self.inner
                    .logger
                    .warn(&format!("[ConnectorRegistry] Built-in skipped: {}", e));
            }
        }
    }

    async fn load_configured(&self) {
        let Some(source) = self.config_source() else {
            return;
        };
        for config in source.provider.get_connectors().await {
            if self.connector(&config.id).is_some() {
                continue;
            }
            if let Err(e) = self.register(source.factory.create(&config)) {
                self.inner
                    .logger
                    .warn(&format!("[ConnectorRegistry] Configured connector skipped: {}", e));
            }
        }
    }

    async fn attempt(&self, connector: Arc<dyn Connector>) -> RegistryResult<ServerInfo> {
        let id = connector.id().to_string();
        match connector.connect().await {
            Ok(info) => {
                self.inner.retries.reset(&id);
                Ok(info)
            }
            Err(source) => {
                if source.should_retry() && connector.is_enabled() {
                    self.schedule_retry(&id);
                }
                Err(RegistryError::Connection { id, source })
            }
        }
    }

    fn schedule_retry(&self, id: &str) {
        {
            // Unregistered while the failed attempt was in flight
            let state = self.inner.state.lock();
            if state.intentional.contains(id) || state.find(id).is_none() {
                return;
            }
        }
        let policy = self.retry_policy();
        let Some(attempt) = self.inner.retries.next_attempt(id, policy.max_attempts) else {
            self.inner.logger.warn(&format!(
                "[ConnectorRegistry] Giving up on {} after {} retries",
                id, policy.max_attempts
            ));
            return;
        };
        let delay = backoff_delay(&policy, attempt);
        self.inner.logger.debug(&format!(
            "[ConnectorRegistry] Retry {} for {} in {:?}",
            attempt, id, delay
        ));

        let cancel = CancellationToken::new();
        self.inner.retries.install(id, cancel.clone());

        let weak = Arc::downgrade(&self.inner);
        let token = cancel.clone();
        let task_id = id.to_string();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if let Some(inner) = weak.upgrade() {
                ConnectorRegistry { inner }
                    .run_retry(&task_id, &token, attempt)
                    .await;
            }
        });
        self.inner.retries.attach(id, &cancel, handle);
    }

    async fn run_retry(&self, id: &str, token: &CancellationToken, attempt: u32) {
        if !self.inner.retries.take_if_current(id, token) {
            return;
        }
        let Some(connector) = self.connector(id) else {
            return;
        };
        let intentional = self.inner.state.lock().intentional.contains(id);
        if intentional || !connector.is_enabled() {
            return;
        }

        self.inner.logger.info(&format!(
            "[ConnectorRegistry] Retrying {} (attempt {})",
            id, attempt
        ));
        if let Err(e) = self.attempt(connector).await {
            self.inner
                .logger
                .debug(&format!("[ConnectorRegistry] Retry failed: {}", e));
        }
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectorRegistry")
            .field("connectors", &state.entries.len())
            .field("tools", &state.tools.len())
            .field("revision", &state.revision)
            .finish()
    }
}
