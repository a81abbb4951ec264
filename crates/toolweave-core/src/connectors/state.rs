//! Connector lifecycle state and the shared status cell

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::ConnectorTool;

/// Lifecycle state of a connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum ConnectorState {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

impl ConnectorState {
    /// Allowed lifecycle edges.
    ///
    /// `Connecting -> Disconnected` and `Error -> Disconnected` are only taken
    /// by an explicit disconnect (`ConnectorStatus::mark_disconnected`); a
    /// connect attempt never produces them.
    pub fn can_transition_to(&self, next: &ConnectorState) -> bool {
        use ConnectorState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error(_))
                | (Error(_), Connecting)
                | (Connected, Disconnected)
                | (Connecting, Disconnected)
                | (Error(_), Disconnected)
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectorState::Connected)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ConnectorState::Error(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectorState::Disconnected => "disconnected",
            ConnectorState::Connecting => "connecting",
            ConnectorState::Connected => "connected",
            ConnectorState::Error(_) => "error",
        }
    }
}

impl std::fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectorState::Error(message) => write!(f, "error: {}", message),
            other => f.write_str(other.label()),
        }
    }
}

/// Connector variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    Subprocess,
    Remote,
    Builtin,
}

/// Identity reported by a server during the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl ServerInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Callback invoked with `(connector_id, new_state)` after every transition
pub type StateObserver = Arc<dyn Fn(&str, &ConnectorState) + Send + Sync>;

/// Handle returned by `observe`, used to unsubscribe
pub type ObserverId = u64;

#[derive(Debug)]
struct StatusInner {
    state: ConnectorState,
    tools: Vec<ConnectorTool>,
    server_info: Option<ServerInfo>,
    enabled: bool,
    /// Bumped by every disconnect; a connect finishing under an older
    /// generation discards its result
    generation: u64,
}

/// State, tools and observers of one connector.
///
/// All mutation goes through short critical sections. Observers are called
/// after the lock is released, so they may read the status back.
pub struct ConnectorStatus {
    id: String,
    inner: Mutex<StatusInner>,
    observers: Mutex<Vec<(ObserverId, StateObserver)>>,
    next_observer: AtomicU64,
}

impl ConnectorStatus {
    pub fn new(id: impl Into<String>, enabled: bool) -> Self {
        Self {
            id: id.into(),
            inner: Mutex::new(StatusInner {
                state: ConnectorState::Disconnected,
                tools: Vec::new(),
                server_info: None,
                enabled,
                generation: 0,
            }),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(1),
        }
    }

    pub fn state(&self) -> ConnectorState {
        self.inner.lock().state.clone()
    }

    pub fn tools(&self) -> Vec<ConnectorTool> {
        self.inner.lock().tools.clone()
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        self.inner.lock().server_info.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.lock().enabled = enabled;
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Move to `Connecting`, returning the generation the attempt runs under.
    ///
    /// `Err` carries the current state when the move is not allowed.
    pub fn begin_connect(&self) -> Result<u64, ConnectorState> {
        let generation = {
            let mut inner = self.inner.lock();
            if !inner.state.can_transition_to(&ConnectorState::Connecting) {
                return Err(inner.state.clone());
            }
            inner.state = ConnectorState::Connecting;
            inner.generation
        };
        self.notify(&ConnectorState::Connecting);
        Ok(generation)
    }

    /// Publish a successful connect if `generation` is still current
    pub fn finish_connect(
        &self,
        generation: u64,
        info: ServerInfo,
        tools: Vec<ConnectorTool>,
    ) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state != ConnectorState::Connecting {
                return false;
            }
            inner.state = ConnectorState::Connected;
            inner.server_info = Some(info);
            inner.tools = tools;
        }
        self.notify(&ConnectorState::Connected);
        true
    }

    /// Record a failed connect if `generation` is still current
    pub fn fail_connect(&self, generation: u64, message: impl Into<String>) -> bool {
        let next = ConnectorState::Error(message.into());
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state != ConnectorState::Connecting {
                return false;
            }
            inner.state = next.clone();
            inner.tools.clear();
            inner.server_info = None;
        }
        self.notify(&next);
        true
    }

    /// Drop to `Disconnected`, invalidating any in-flight connect.
    ///
    /// Returns false when already disconnected.
    pub fn mark_disconnected(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            if !inner.state.can_transition_to(&ConnectorState::Disconnected) {
                return false;
            }
            inner.state = ConnectorState::Disconnected;
            inner.tools.clear();
            inner.server_info = None;
        }
        self.notify(&ConnectorState::Disconnected);
        true
    }

    pub fn observe(&self, observer: StateObserver) -> ObserverId {
        let id = self.next_observer.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((id, observer));
        id
    }

    pub fn remove_observer(&self, id: ObserverId) {
        self.observers.lock().retain(|(existing, _)| *existing != id);
    }

    fn notify(&self, state: &ConnectorState) {
        let observers: Vec<StateObserver> =
            self.observers.lock().iter().map(|(_, o)| Arc::clone(o)).collect();
        for observer in observers {
            observer(&self.id, state);
        }
    }
}

impl std::fmt::Debug for ConnectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorStatus")
            .field("id", &self.id)
            .field("inner", &*self.inner.lock())
            .field("observers", &self.observers.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectorState::*;

    fn err() -> ConnectorState {
        Error("boom".to_string())
    }

    #[test]
    fn test_transition_matrix() {
        let states = [Disconnected, Connecting, Connected, err()];
        let allowed = [
            (Disconnected, Connecting),
            (Connecting, Connected),
            (Connecting, err()),
            (err(), Connecting),
            (Connected, Disconnected),
            (Connecting, Disconnected),
            (err(), Disconnected),
        ];

        for from in &states {
            for to in &states {
                let expected = allowed.iter().any(|(a, b)| a == from && b == to);
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_connected_cannot_fail_or_reconnect_directly() {
        assert!(!Connected.can_transition_to(&err()));
        assert!(!Connected.can_transition_to(&Connecting));
        assert!(!Disconnected.can_transition_to(&Connected));
    }

    #[test]
    fn test_stale_generation_is_discarded() {
        let status = ConnectorStatus::new("fs", true);
        let generation = status.begin_connect().unwrap();
        assert!(status.mark_disconnected());

        assert!(!status.finish_connect(generation, ServerInfo::new("fs", "1"), Vec::new()));
        assert_eq!(status.state(), Disconnected);
        assert!(status.server_info().is_none());
    }

    #[test]
    fn test_begin_connect_rejected_while_connecting() {
        let status = ConnectorStatus::new("fs", true);
        status.begin_connect().unwrap();
        assert_eq!(status.begin_connect(), Err(Connecting));
    }

    #[test]
    fn test_observers_see_each_transition() {
        let status = ConnectorStatus::new("fs", true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = status.observe(Arc::new(move |cid: &str, state: &ConnectorState| {
            sink.lock().push(format!("{}:{}", cid, state.label()));
        }));

        let generation = status.begin_connect().unwrap();
        status.fail_connect(generation, "refused");
        status.remove_observer(id);
        status.begin_connect().unwrap();

        assert_eq!(*seen.lock(), vec!["fs:connecting", "fs:error"]);
    }
}
