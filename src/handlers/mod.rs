mod health;
mod metrics;
mod rate_limit;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::state::AppState;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use rate_limit::{check_handler, status_handler};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/rate-limit", get(status_handler).post(check_handler))
        .with_state(state)
}
