use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::metrics;

pub async fn metrics_handler() -> Response {
    match metrics::render() {
        Ok(text) => text.into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
