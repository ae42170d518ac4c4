use axum::http::HeaderMap;

// Shared bucket for requests that carry no usable client address
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Client identifier for rate limiting, from proxy headers.
///
/// First entry of `X-Forwarded-For`, then `X-Real-IP`, then [`UNKNOWN_CLIENT`].
/// Values are taken as sent; they are bucket keys, not verified addresses.
pub fn client_identifier(headers: &HeaderMap) -> String {
    from_forwarded_for(headers)
        .or_else(|| from_real_ip(headers))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn from_forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        // "client, proxy1, proxy2"
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

fn from_real_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}
