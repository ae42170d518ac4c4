use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::models::ActionType;
use crate::security_log::{EventSink, Payload, SecurityEvent, fingerprint};
use crate::window::{SlidingWindow, StoreError, TimestampStore, prune};

// In-process window store, keyed by "action:client"
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Prune every entry, dropping keys left with nothing live.
    // Returns the number of keys removed.
    pub fn sweep(&self, now: u64, window_for: impl Fn(&str) -> Option<u64>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, timestamps| match window_for(key) {
            Some(window_ms) => {
                *timestamps = prune(timestamps, now, window_ms);
                !timestamps.is_empty()
            }
            None => false,
        });
        before.saturating_sub(self.entries.len())
    }
}

impl TimestampStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Vec<u64>, StoreError> {
        Ok(self
            .entries
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    fn save(&self, key: &str, timestamps: &[u64]) -> Result<(), StoreError> {
        // an entry only exists while it holds at least one action
        if timestamps.is_empty() {
            self.entries.remove(key);
        } else {
            self.entries.insert(key.to_string(), timestamps.to_vec());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied { reset_in_ms: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

pub fn bucket_key(action: ActionType, client: &str) -> String {
    format!("{}:{}", action.as_str(), client)
}

fn action_of(key: &str) -> Option<ActionType> {
    key.split_once(':').and_then(|(action, _)| action.parse().ok())
}

/// Authoritative per-process limiter behind the HTTP endpoint.
pub struct ServerLimiter<S = MemoryStore> {
    window: SlidingWindow<S>,
    sink: Arc<dyn EventSink>,
}

impl ServerLimiter<MemoryStore> {
    pub fn new(clock: Arc<dyn Clock>, sink: Arc<dyn EventSink>) -> Self {
        Self::with_store(MemoryStore::new(), clock, sink)
    }

    pub fn sweep(&self) -> usize {
        let now = self.window.now_ms();
        let removed = self
            .window
            .store()
            .sweep(now, |key| action_of(key).map(|a| a.limit().window_ms()));
        debug!(removed, remaining = self.active_records(), "rate limit sweep");
        removed
    }

    pub fn active_records(&self) -> usize {
        self.window.store().len()
    }
}

impl<S: TimestampStore> ServerLimiter<S> {
    pub fn with_store(store: S, clock: Arc<dyn Clock>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            window: SlidingWindow::new(store, clock),
            sink,
        }
    }

    // Check-then-record. Concurrent callers on one key may interleave between
    // the two steps and slip a few extra actions through.
    pub fn check(&self, action: ActionType, client: &str) -> Decision {
        match self.try_check(action, client) {
            Ok(decision) => decision,
            Err(e) => {
                let mut payload = Payload::new();
                payload.insert("action".into(), Value::from(action.as_str()));
                payload.insert("client".into(), Value::from(fingerprint(client)));
                payload.insert("error".into(), Value::from(e.to_string()));
                self.sink.log_event(SecurityEvent::RateLimitError, payload);
                Decision::Allowed
            }
        }
    }

    fn try_check(&self, action: ActionType, client: &str) -> Result<Decision, StoreError> {
        let limit = action.limit();
        let key = bucket_key(action, client);

        if self.window.try_is_limited(&key, &limit)? {
            let reset_in_ms = self.window.try_time_until_reset(&key, limit.window_ms())?;
            return Ok(Decision::Denied { reset_in_ms });
        }

        self.window.try_record(&key, limit.window_ms())?;
        Ok(Decision::Allowed)
    }
}
