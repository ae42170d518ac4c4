use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Limit misconfiguration - the integrating developer passed a zero
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_actions must be at least 1")]
    ZeroMaxActions,
    #[error("window_ms must be at least 1")]
    ZeroWindow,
    #[error("unknown action type: {0}")]
    UnknownAction(String),
}

/// At most `max_actions` per trailing `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    max_actions: u32,
    window_ms: u64,
}

impl RateLimit {
    pub const fn new(max_actions: u32, window_ms: u64) -> Result<Self, ConfigError> {
        if max_actions == 0 {
            return Err(ConfigError::ZeroMaxActions);
        }
        if window_ms == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(Self {
            max_actions,
            window_ms,
        })
    }

    pub fn max_actions(&self) -> u32 {
        self.max_actions
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }
}

// Rate-limited operations known to the server. Each has its own bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Whatsapp,
    Contact,
}

const WHATSAPP_LIMIT: RateLimit = RateLimit {
    max_actions: 5,
    window_ms: 60_000,
};

const CONTACT_LIMIT: RateLimit = RateLimit {
    max_actions: 3,
    window_ms: 300_000,
};

impl ActionType {
    pub const ALL: [ActionType; 2] = [ActionType::Whatsapp, ActionType::Contact];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Whatsapp => "whatsapp",
            ActionType::Contact => "contact",
        }
    }

    pub fn limit(&self) -> RateLimit {
        match self {
            ActionType::Whatsapp => WHATSAPP_LIMIT,
            ActionType::Contact => CONTACT_LIMIT,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownAction(s.to_string()))
    }
}

// POST /api/rate-limit success body
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct AllowedResponse {
    pub allowed: bool,
}

// POST /api/rate-limit 429 body
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeniedResponse {
    pub allowed: bool,
    pub reset_in: u64,
    pub message: String,
}

// GET /api/rate-limit body
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub active_records: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}

/// Milliseconds rounded up to whole seconds, as shown to users.
pub fn ceil_secs(ms: u64) -> u64 {
    ms.div_ceil(1000)
}

pub fn retry_message(reset_in_ms: u64) -> String {
    format!(
        "Too many requests. Please try again in {} seconds.",
        ceil_secs(reset_in_ms)
    )
}
