//! Reconnect backoff and the per-connector retry table

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::RetryPolicy;
use crate::types::CancellationToken;

/// Delay before retry number `attempt` (1-based): `min(base * 2^(attempt-1), max)`
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let max = policy.max_delay();
    let exponent = attempt.saturating_sub(1);
    2u32.checked_pow(exponent)
        .and_then(|factor| policy.base_delay().checked_mul(factor))
        .map(|delay| delay.min(max))
        .unwrap_or(max)
}

struct PendingRetry {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct RetryEntry {
    /// Retries issued in the current failure streak
    attempts: u32,
    pending: Option<PendingRetry>,
}

/// Attempt counters and outstanding retry tasks, keyed by connector id.
///
/// At most one pending retry exists per connector; installing a new one
/// cancels the previous.
#[derive(Default)]
pub(crate) struct RetryTable {
    entries: Mutex<HashMap<String, RetryEntry>>,
}

impl RetryTable {
    /// Claim the next attempt number, or `None` once the streak hit `max_attempts`
    pub fn next_attempt(&self, id: &str, max_attempts: u32) -> Option<u32> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(id.to_string()).or_default();
        if entry.attempts >= max_attempts {
            return None;
        }
        entry.attempts += 1;
        Some(entry.attempts)
    }

    /// Register `cancel` as the pending retry, before its task is spawned
    pub fn install(&self, id: &str, cancel: CancellationToken) {
        let previous = self
            .entries
            .lock()
            .entry(id.to_string())
            .or_default()
            .pending
            .replace(PendingRetry {
                cancel,
                handle: None,
            });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
    }

    /// Attach the spawned task to the pending retry owned by `cancel`
    pub fn attach(&self, id: &str, cancel: &CancellationToken, handle: JoinHandle<()>) {
        if let Some(pending) = self
            .entries
            .lock()
            .get_mut(id)
            .and_then(|entry| entry.pending.as_mut())
            .filter(|pending| pending.cancel.ptr_eq(cancel))
        {
            pending.handle = Some(handle);
        }
    }

    /// Forget the pending retry owned by `cancel` without cancelling it.
    ///
    /// Returns false when the retry was cancelled or replaced meanwhile.
    pub fn take_if_current(&self, id: &str, cancel: &CancellationToken) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(id) else {
            return false;
        };
        match &entry.pending {
            Some(pending) if pending.cancel.ptr_eq(cancel) && !cancel.is_cancelled() => {
                entry.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Cancel the pending retry, keeping the streak
    pub fn cancel(&self, id: &str) {
        let pending = self
            .entries
            .lock()
            .get_mut(id)
            .and_then(|entry| entry.pending.take());
        if let Some(pending) = pending {
            pending.cancel.cancel();
        }
    }

    /// Cancel the pending retry and start a new streak
    pub fn reset(&self, id: &str) {
        self.cancel(id);
        if let Some(entry) = self.entries.lock().get_mut(id) {
            entry.attempts = 0;
        }
    }

    pub fn remove(&self, id: &str) {
        let entry = self.entries.lock().remove(id);
        if let Some(PendingRetry { cancel, .. }) = entry.and_then(|e| e.pending) {
            cancel.cancel();
        }
    }

    pub fn cancel_all(&self) {
        let pending: Vec<PendingRetry> = self
            .entries
            .lock()
            .values_mut()
            .filter_map(|entry| entry.pending.take())
            .collect();
        for retry in pending {
            retry.cancel.cancel();
        }
    }

    pub fn attempts(&self, id: &str) -> u32 {
        self.entries.lock().get(id).map(|e| e.attempts).unwrap_or(0)
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.entries
            .lock()
            .get(id)
            .and_then(|e| e.pending.as_ref())
            .is_some_and(|p| p.handle.as_ref().map_or(true, |h| !h.is_finished()))
    }
}
