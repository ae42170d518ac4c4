use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{info, warn};

pub type Payload = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityEvent {
    RateLimitCheck,
    RateLimitExceeded,
    RateLimitError,
    BotDetected,
    ValidationFailed,
    SuspiciousActivity,
    XssAttempt,
}

impl SecurityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEvent::RateLimitCheck => "rate_limit_check",
            SecurityEvent::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEvent::RateLimitError => "rate_limit_error",
            SecurityEvent::BotDetected => "bot_detected",
            SecurityEvent::ValidationFailed => "validation_failed",
            SecurityEvent::SuspiciousActivity => "suspicious_activity",
            SecurityEvent::XssAttempt => "xss_attempt",
        }
    }

    // Routine checks are informational, everything else wants attention
    pub fn is_routine(&self) -> bool {
        matches!(self, SecurityEvent::RateLimitCheck)
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Fire and forget: implementations must not panic or block
pub trait EventSink: Send + Sync {
    fn log_event(&self, event: SecurityEvent, payload: Payload);
}

// Emits events as structured tracing records on the `security` target
pub struct TracingSink {
    environment: String,
}

impl TracingSink {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }

    pub fn envelope(&self, event: SecurityEvent, payload: Payload) -> Payload {
        let mut record = payload;
        record.insert("event".into(), Value::from(event.as_str()));
        record.insert(
            "timestamp".into(),
            Value::from(chrono::Utc::now().to_rfc3339()),
        );
        record.insert("environment".into(), Value::from(self.environment.as_str()));
        record
    }
}

impl EventSink for TracingSink {
    fn log_event(&self, event: SecurityEvent, payload: Payload) {
        let record = Value::Object(self.envelope(event, payload));
        if event.is_routine() {
            info!(target: "security", event = event.as_str(), %record);
        } else {
            warn!(target: "security", event = event.as_str(), %record);
        }
    }
}

// logs never carry raw IPs
pub fn fingerprint(client: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}
