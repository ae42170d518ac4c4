//! Sliding-window rate limiting for the catalog site's contact form and
//! WhatsApp links: an authoritative in-memory server limiter behind an HTTP
//! endpoint, and a persisted per-device client limiter that works offline.

pub mod client;
pub mod client_ip;
pub mod clock;
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod security_log;
pub mod state;
pub mod sweeper;
pub mod window;
