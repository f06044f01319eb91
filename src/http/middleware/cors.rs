//! CORS defaults for configured origins.
//!
//! Runs after the handler. Backend-provided CORS headers win; probes are
//! never decorated.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN,
        },
        HeaderValue, Method, Request, StatusCode,
    },
    middleware::Next,
    response::Response,
};

const ALLOWED_METHODS: &str = "GET,POST,PUT,PATCH,DELETE,OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type,X-Ct-Captcha-Challenge,*";
const PROBE_PATHS: [&str; 2] = ["/live", "/ready"];

/// Origins allowed to call the gateway with credentials.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    allowed_origins: HashSet<String>,
}

impl CorsPolicy {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_origins: origins
                .into_iter()
                .map(|o| o.as_ref().trim().to_lowercase())
                .filter(|o| !o.is_empty())
                .collect(),
        }
    }

    /// Lowercased origin when it is allowed.
    pub fn allowed(&self, origin: &str) -> Option<String> {
        let origin = origin.to_lowercase();
        self.allowed_origins.contains(&origin).then_some(origin)
    }
}

pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let is_probe = PROBE_PATHS.contains(&request.uri().path());
    let is_preflight = request.method() == Method::OPTIONS;
    let origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = next.run(request).await;

    if is_probe || response.headers().contains_key(ACCESS_CONTROL_ALLOW_ORIGIN) {
        return response;
    }

    let Some(origin) = origin.and_then(|o| policy.allowed(&o)) else {
        return response;
    };
    let Ok(origin) = HeaderValue::from_str(&origin) else {
        return response;
    };

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS));
    headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));

    if is_preflight {
        *response.status_mut() = StatusCode::OK;
    }
    response
}
