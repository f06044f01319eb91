//! Outbound HTTP transport to the backend.
//!
//! # Responsibilities
//! - Execute one outbound request and buffer the response
//! - Bound every call with connect and total timeouts
//! - Retry once on a transient connection failure (peer closed a pooled
//!   connection between requests)
//!
//! # Design Decisions
//! - Requests are plain cloneable values so the forwarder can re-send the
//!   exact same request with only the Authorization header swapped
//! - Status codes are never retried here; 401 handling belongs to the forwarder

use std::error::Error as _;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use thiserror::Error;
use url::Url;

/// A request ready to be sent to the backend.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, Bytes::len)
    }
}

/// A fully buffered backend response.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BackendResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Errors raised while talking to the backend.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Build(String),

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("reading response from {url} failed: {reason}")]
    Body { url: String, reason: String },
}

/// Backend transport capability.
#[async_trait]
pub trait BackendTransport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<BackendResponse, TransportError>;
}

/// Transport timeouts and retry budget.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub idle_timeout: Duration,
    /// Total attempts for transient connection failures (1 = no retry).
    pub attempts: u32,
    /// Dump outbound requests and responses at info level.
    pub debug_http: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(90),
            attempts: 2,
            debug_http: false,
        }
    }
}

/// `reqwest`-backed transport with a shared connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    attempts: u32,
    debug_http: bool,
}

impl ReqwestTransport {
    pub fn new(settings: &TransportSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .pool_idle_timeout(settings.idle_timeout)
            .no_proxy()
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;

        Ok(Self {
            client,
            attempts: settings.attempts.max(1),
            debug_http: settings.debug_http,
        })
    }

    async fn send_once(&self, request: &OutboundRequest) -> Result<BackendResponse, reqwest::Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(BackendResponse { status, headers, body })
    }
}

#[async_trait]
impl BackendTransport for ReqwestTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<BackendResponse, TransportError> {
        if self.debug_http {
            tracing::info!(
                method = %request.method,
                url = %request.url,
                headers = ?request.headers,
                body_bytes = request.body_len(),
                "DEBUG REQ"
            );
        } else {
            tracing::debug!(method = %request.method, url = %request.url, "Sending backend request");
        }

        let mut attempt = 1;
        loop {
            match self.send_once(request).await {
                Ok(response) => {
                    if self.debug_http {
                        tracing::info!(
                            status = response.status.as_u16(),
                            headers = ?response.headers,
                            body = %String::from_utf8_lossy(&response.body),
                            "DEBUG RESP"
                        );
                    } else {
                        tracing::debug!(
                            url = %request.url,
                            status = response.status.as_u16(),
                            "Backend responded"
                        );
                    }
                    return Ok(response);
                }
                Err(err) if attempt < self.attempts && is_transient(&err) => {
                    tracing::warn!(
                        url = %request.url,
                        attempt,
                        error = %err,
                        "Retrying backend request after transient connection error"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(classify(request, err)),
            }
        }
    }
}

fn classify(request: &OutboundRequest, err: reqwest::Error) -> TransportError {
    let url = request.url.to_string();
    if err.is_timeout() {
        TransportError::Timeout { url }
    } else if err.is_body() || err.is_decode() {
        TransportError::Body {
            url,
            reason: err.to_string(),
        }
    } else {
        TransportError::Request {
            url,
            reason: error_chain(&err),
        }
    }
}

/// A broken pipe means the pooled connection died before the request was
/// written, so re-sending cannot duplicate a write.
fn is_transient(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(cause) = current {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return io_err.kind() == io::ErrorKind::BrokenPipe;
        }
        current = cause.source();
    }
    false
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
