use lazy_static::lazy_static;
use prometheus::{Encoder, Gauge, IntCounterVec, TextEncoder, register_gauge, register_int_counter_vec};

lazy_static! {
    pub static ref CHECKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "catalog_gate_checks_total",
        "Rate limit checks by action",
        &["action"]
    )
    .expect("metric can be registered");
    pub static ref DENIED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "catalog_gate_denied_total",
        "Rate limit denials by action",
        &["action"]
    )
    .expect("metric can be registered");
    pub static ref ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "catalog_gate_errors_total",
        "Requests that failed open, by cause",
        &["cause"]
    )
    .expect("metric can be registered");
    pub static ref TRACKED_KEYS: Gauge = register_gauge!(
        "catalog_gate_tracked_keys",
        "Keys currently held by the server limiter"
    )
    .expect("metric can be registered");
}

// Text exposition of the default registry
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
