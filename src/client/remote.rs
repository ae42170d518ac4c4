use reqwest::StatusCode;
use std::time::Duration;
use tracing::warn;

use crate::models::{ActionType, DeniedResponse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteDecision {
    Allowed,
    Denied { reset_in_ms: u64, message: String },
}

impl RemoteDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RemoteDecision::Allowed)
    }
}

// Asks the server endpoint; the server's answer is authoritative
pub struct RemoteLimiter {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl RemoteLimiter {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let base = if base.starts_with("http") {
            base.to_string()
        } else {
            format!("http://{}", base)
        };
        Self {
            client,
            endpoint: format!("{}/api/rate-limit", base),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    // unreachable or misbehaving server allows the action
    pub async fn check(&self, action: ActionType) -> RemoteDecision {
        match self.try_check(action).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "rate limit server unreachable, allowing");
                RemoteDecision::Allowed
            }
        }
    }

    async fn try_check(&self, action: ActionType) -> Result<RemoteDecision, reqwest::Error> {
        let res = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "action": action }))
            .send()
            .await?;

        match res.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                let body = res.json::<DeniedResponse>().await?;
                Ok(RemoteDecision::Denied {
                    reset_in_ms: body.reset_in,
                    message: body.message,
                })
            }
            status if status.is_success() => Ok(RemoteDecision::Allowed),
            status => {
                warn!(endpoint = %self.endpoint, %status, "unexpected rate limit response, allowing");
                Ok(RemoteDecision::Allowed)
            }
        }
    }
}
