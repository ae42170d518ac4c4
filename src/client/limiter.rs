use std::sync::Arc;

use crate::clock::Clock;
use crate::models::{ActionType, RateLimit, ceil_secs};
use crate::window::SlidingWindow;

use super::storage::{KeyValueStorage, PersistedStore};

// Storage key used by the contact form
pub const CONTACT_FORM_KEY: &str = "contact_form_submissions";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientLimitConfig {
    pub limit: RateLimit,
    pub key: String,
}

impl ClientLimitConfig {
    pub fn new(limit: RateLimit, key: impl Into<String>) -> Self {
        Self {
            limit,
            key: key.into(),
        }
    }

    // 3 submissions per 5 minutes, independent of the server's contact bucket
    pub fn contact_form() -> Self {
        Self::new(ActionType::Contact.limit(), CONTACT_FORM_KEY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LimitStatus {
    pub limited: bool,
    pub reset_in_ms: u64,
}

impl LimitStatus {
    pub fn seconds_remaining(&self) -> u64 {
        ceil_secs(self.reset_in_ms)
    }

    pub fn label(&self, idle: &str) -> String {
        if self.limited {
            format!("Available in {}s", self.seconds_remaining())
        } else {
            idle.to_string()
        }
    }
}

// Pre-flight limiter for UI actions, persisted per device profile. Fails open.
pub struct ClientLimiter<K> {
    window: SlidingWindow<PersistedStore<K>>,
    config: ClientLimitConfig,
}

impl<K: KeyValueStorage> ClientLimiter<K> {
    pub fn new(storage: K, config: ClientLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            window: SlidingWindow::new(PersistedStore::new(storage), clock),
            config,
        }
    }

    pub fn config(&self) -> &ClientLimitConfig {
        &self.config
    }

    pub fn is_limited(&self) -> bool {
        self.window.is_limited(&self.config.key, &self.config.limit)
    }

    pub fn time_until_reset(&self) -> u64 {
        self.window
            .time_until_reset(&self.config.key, self.config.limit.window_ms())
    }

    pub fn status(&self) -> LimitStatus {
        if self.is_limited() {
            LimitStatus {
                limited: true,
                reset_in_ms: self.time_until_reset(),
            }
        } else {
            LimitStatus::default()
        }
    }

    // re-checks storage, never trusts an earlier status
    pub fn record_action(&self) -> bool {
        if self.is_limited() {
            return false;
        }
        self.window
            .record(&self.config.key, self.config.limit.window_ms())
    }
}
