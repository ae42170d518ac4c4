use std::sync::Arc;
use crate::rate_limit::ServerLimiter;
use crate::security_log::EventSink;

// app's shared state
pub struct AppState {
    pub limiter: Arc<ServerLimiter>, // per-process action buckets
    pub sink: Arc<dyn EventSink>,    // security event log
}

impl AppState {
    pub fn new(limiter: Arc<ServerLimiter>, sink: Arc<dyn EventSink>) -> Self {
        Self { limiter, sink }
    }
}
