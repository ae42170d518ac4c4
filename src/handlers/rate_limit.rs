use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use std::sync::Arc;

use crate::client_ip::client_identifier;
use crate::metrics::{CHECKS_TOTAL, DENIED_TOTAL, ERRORS_TOTAL, TRACKED_KEYS};
use crate::models::{
    ActionType, AllowedResponse, DeniedResponse, ErrorResponse, StatusResponse, ceil_secs,
    retry_message,
};
use crate::rate_limit::Decision;
use crate::security_log::{Payload, SecurityEvent, fingerprint};
use crate::state::AppState;

const INVALID_ACTION: &str = "Invalid action. Expected one of: whatsapp, contact";

fn allowed() -> Response {
    (StatusCode::OK, Json(AllowedResponse { allowed: true })).into_response()
}

fn denied(reset_in_ms: u64) -> Response {
    let body = DeniedResponse {
        allowed: false,
        reset_in: reset_in_ms,
        message: retry_message(reset_in_ms),
    };
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    if let Ok(val) = HeaderValue::from_str(&ceil_secs(reset_in_ms).to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, val);
    }
    response
}

fn invalid_action() -> Response {
    let body = ErrorResponse {
        error: INVALID_ACTION.to_string(),
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

// POST /api/rate-limit  {"action": "whatsapp" | "contact"}
pub async fn check_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let client = client_identifier(&headers);

    // unreadable body is a fault, not abuse: let it through
    let parsed: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            ERRORS_TOTAL.with_label_values(&["parse"]).inc();
            let mut payload = Payload::new();
            payload.insert("client".into(), Value::from(fingerprint(&client)));
            payload.insert("error".into(), Value::from(e.to_string()));
            state.sink.log_event(SecurityEvent::RateLimitError, payload);
            return allowed();
        }
    };

    let action = match parsed
        .get("action")
        .and_then(Value::as_str)
        .map(str::parse::<ActionType>)
    {
        Some(Ok(action)) => action,
        other => {
            let mut payload = Payload::new();
            payload.insert("client".into(), Value::from(fingerprint(&client)));
            payload.insert("field".into(), Value::from("action"));
            if let Some(Err(e)) = other {
                payload.insert("error".into(), Value::from(e.to_string()));
            }
            state.sink.log_event(SecurityEvent::ValidationFailed, payload);
            return invalid_action();
        }
    };

    CHECKS_TOTAL.with_label_values(&[action.as_str()]).inc();
    let mut payload = Payload::new();
    payload.insert("action".into(), Value::from(action.as_str()));
    payload.insert("client".into(), Value::from(fingerprint(&client)));
    state
        .sink
        .log_event(SecurityEvent::RateLimitCheck, payload.clone());

    let decision = state.limiter.check(action, &client);
    TRACKED_KEYS.set(state.limiter.active_records() as f64);

    match decision {
        Decision::Allowed => allowed(),
        Decision::Denied { reset_in_ms } => {
            DENIED_TOTAL.with_label_values(&[action.as_str()]).inc();
            payload.insert("resetIn".into(), Value::from(reset_in_ms));
            state.sink.log_event(SecurityEvent::RateLimitExceeded, payload);
            denied(reset_in_ms)
        }
    }
}

// GET /api/rate-limit
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        active_records: state.limiter.active_records(),
    })
}
