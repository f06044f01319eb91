//! Header policy at the gateway/backend boundary.
//!
//! Only named headers cross the boundary in either direction. Anything not
//! listed here is dropped on purpose.

use std::net::IpAddr;

use axum::http::header::{
    ACCEPT_LANGUAGE, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS,
    ACCESS_CONTROL_REQUEST_METHOD, AUTHORIZATION, CONTENT_TYPE, ORIGIN, REFERER, RETRY_AFTER,
    USER_AGENT, VARY,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
pub const CF_CONNECTING_IP: HeaderName = HeaderName::from_static("cf-connecting-ip");
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_CT_CAPTCHA_CHALLENGE: HeaderName = HeaderName::from_static("x-ct-captcha-challenge");

pub const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

const CLOUDFLARE_PREFIX: &str = "cf-";
const CLOUDFLARE_ORIGINAL_PREFIX: &str = "cf-original-";

/// Client headers forwarded to the backend.
pub const REQUEST_ALLOW_LIST: [HeaderName; 7] = [
    ACCEPT_LANGUAGE,
    ACCESS_CONTROL_REQUEST_HEADERS,
    ACCESS_CONTROL_REQUEST_METHOD,
    CONTENT_TYPE,
    USER_AGENT,
    REFERER,
    ORIGIN,
];

/// Backend headers forwarded to the client.
pub const RESPONSE_ALLOW_LIST: [HeaderName; 9] = [
    ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_MAX_AGE,
    CONTENT_TYPE,
    RETRY_AFTER,
    VARY,
    X_RATELIMIT_LIMIT,
    X_RATELIMIT_REMAINING,
];

/// Headers that are overwritten rather than merged.
const SINGLE_INSTANCE: [HeaderName; 9] = [
    AUTHORIZATION,
    CONTENT_TYPE,
    ORIGIN,
    REFERER,
    RETRY_AFTER,
    USER_AGENT,
    X_CT_CAPTCHA_CHALLENGE,
    X_RATELIMIT_LIMIT,
    X_RATELIMIT_REMAINING,
];

const IP_HEADERS: [HeaderName; 3] = [CF_CONNECTING_IP, X_REAL_IP, X_FORWARDED_FOR];

/// Copy the listed headers from `src` into `dest`.
///
/// Repeated values are joined with `", "`. For multi-instance headers the
/// values already present in `dest` are kept in front.
pub fn copy_headers(src: &HeaderMap, dest: &mut HeaderMap, names: &[HeaderName]) {
    for name in names {
        let incoming: Vec<&HeaderValue> = src.get_all(name).iter().collect();
        if incoming.is_empty() {
            continue;
        }

        let mut values: Vec<&[u8]> = Vec::new();
        let existing: Vec<HeaderValue> = if SINGLE_INSTANCE.contains(name) {
            Vec::new()
        } else {
            dest.get_all(name).iter().cloned().collect()
        };
        values.extend(existing.iter().map(HeaderValue::as_bytes));
        values.extend(incoming.iter().map(|v| v.as_bytes()));

        if let Ok(joined) = HeaderValue::from_bytes(&values.join(&b", "[..])) {
            dest.insert(name.clone(), joined);
        }
    }
}

/// Copy every `Cf-*` header as `Cf-Original-*`.
pub fn copy_cloudflare_headers(src: &HeaderMap, dest: &mut HeaderMap) {
    for (name, value) in src.iter() {
        let Some(rest) = name.as_str().strip_prefix(CLOUDFLARE_PREFIX) else {
            continue;
        };
        if let Ok(renamed) = HeaderName::from_bytes(format!("{}{}", CLOUDFLARE_ORIGINAL_PREFIX, rest).as_bytes()) {
            dest.insert(renamed, value.clone());
        }
    }
}

/// Set `Authorization: Bearer <token>`, replacing any previous value.
pub fn write_bearer(dest: &mut HeaderMap, token: &str) {
    match HeaderValue::from_str(&format!("Bearer {}", token)) {
        Ok(value) => {
            dest.insert(AUTHORIZATION, value);
        }
        Err(_) => {
            dest.remove(AUTHORIZATION);
            tracing::warn!("Token is not a valid header value, Authorization dropped");
        }
    }
}

/// First non-empty of `Cf-Connecting-IP`, `X-Real-IP`, `X-Forwarded-For`,
/// then the socket peer.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    IP_HEADERS
        .iter()
        .flat_map(|name| headers.get_all(name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| match peer {
            Some(ip) => ip.to_string(),
            None => "0.0.0.0".to_string(),
        })
}
