//! Backend forwarding with transparent token refresh.
//!
//! # Data Flow
//! ```text
//! Initial ──send──▶ BackendCalled ──not 401 / not refreshable──▶ Done
//!                         │ 401 + refreshable
//!                         ▼
//!                   NeedsRefresh ──new tokens──▶ RefreshedRetry ──send──▶ Done
//!                         │ error / relogin
//!                         ▼
//!                   RefreshFailedLogout ──▶ Done (deletion cookies, held 401)
//! ```
//!
//! # Design Decisions
//! - At most one refresh and one re-send per inbound request
//! - The retry re-sends the identical outbound request with only the
//!   Authorization header replaced
//! - Cookies are only written when a refresh was attempted

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::http::header::{ACCEPT, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use thiserror::Error;

use crate::auth::cookie::CookieCodec;
use crate::auth::tokens::Auth;
use crate::http::request::InboundRequest;
use crate::http::response::GatewayResponse;
use crate::observability::metrics;
use crate::upstream::endpoint::BackendUrl;
use crate::upstream::headers::{
    copy_cloudflare_headers, copy_headers, write_bearer, APPLICATION_JSON, REQUEST_ALLOW_LIST,
    RESPONSE_ALLOW_LIST, X_FORWARDED_FOR,
};
use crate::upstream::health::{healthcheck, HealthcheckError};
use crate::upstream::refresh::RefreshClient;
use crate::upstream::transport::{BackendResponse, BackendTransport, OutboundRequest, TransportError};

const BODY_METHODS: [Method; 3] = [Method::POST, Method::PUT, Method::PATCH];

/// Backend call failures surfaced to handlers (all map to 502).
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("API request error: {0}")]
    Request(TransportError),

    #[error("API request with fresh token error: {0}")]
    Retry(TransportError),
}

/// How a forwarded exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Backend response forwarded without touching credentials.
    Passthrough,
    /// Tokens refreshed and the request re-sent.
    Refreshed,
    /// Refresh failed; deletion cookies written.
    LoggedOut,
}

enum ForwardState {
    Initial,
    BackendCalled(BackendResponse),
    NeedsRefresh(BackendResponse),
    RefreshedRetry(Auth),
    RefreshFailedLogout(BackendResponse),
    Done {
        response: BackendResponse,
        cookies: Option<Auth>,
        outcome: ForwardOutcome,
    },
}

/// Sends inbound requests to the backend and writes the answer back.
#[derive(Clone)]
pub struct Forwarder {
    transport: Arc<dyn BackendTransport>,
    backend: BackendUrl,
    refresh: RefreshClient,
    codec: CookieCodec,
}

impl Forwarder {
    pub fn new(transport: Arc<dyn BackendTransport>, backend: BackendUrl, codec: CookieCodec) -> Self {
        let refresh = RefreshClient::new(transport.clone(), backend.clone());
        Self {
            transport,
            backend,
            refresh,
            codec,
        }
    }

    pub fn codec(&self) -> &CookieCodec {
        &self.codec
    }

    pub fn backend(&self) -> &BackendUrl {
        &self.backend
    }

    /// Forward `inbound` (optionally with a replacement body) and write the
    /// backend's answer into `out`.
    pub async fn forward(
        &self,
        inbound: &InboundRequest,
        body_override: Option<Bytes>,
        out: &mut GatewayResponse,
    ) -> Result<ForwardOutcome, ForwardError> {
        let started = Instant::now();
        let auth = self.codec.read_auth(&inbound.headers);
        let mut outbound = self.build_request(inbound, &auth, body_override);

        let mut state = ForwardState::Initial;
        loop {
            state = match state {
                ForwardState::Initial => {
                    let response = self.transport.send(&outbound).await.map_err(|e| {
                        metrics::record_upstream_error();
                        ForwardError::Request(e)
                    })?;
                    ForwardState::BackendCalled(response)
                }
                ForwardState::BackendCalled(response) => {
                    if response.status == StatusCode::UNAUTHORIZED && auth.is_logged() && auth.can_refresh() {
                        ForwardState::NeedsRefresh(response)
                    } else {
                        ForwardState::Done {
                            response,
                            cookies: None,
                            outcome: ForwardOutcome::Passthrough,
                        }
                    }
                }
                ForwardState::NeedsRefresh(response) => match self.refresh.refresh(&auth).await {
                    Ok(fresh) if fresh.is_logged() => {
                        metrics::record_token_refresh("success");
                        ForwardState::RefreshedRetry(fresh)
                    }
                    Ok(_) => {
                        metrics::record_token_refresh("relogin");
                        tracing::warn!(client_ip = %inbound.client_ip, "Refresh token rejected, logging out");
                        ForwardState::RefreshFailedLogout(response)
                    }
                    Err(err) => {
                        metrics::record_token_refresh("error");
                        tracing::warn!(client_ip = %inbound.client_ip, error = %err, "Token refresh failed");
                        ForwardState::RefreshFailedLogout(response)
                    }
                },
                ForwardState::RefreshedRetry(fresh) => {
                    write_bearer(&mut outbound.headers, &fresh.access_token);
                    let response = self.transport.send(&outbound).await.map_err(|e| {
                        metrics::record_upstream_error();
                        ForwardError::Retry(e)
                    })?;
                    ForwardState::Done {
                        response,
                        cookies: Some(fresh),
                        outcome: ForwardOutcome::Refreshed,
                    }
                }
                ForwardState::RefreshFailedLogout(response) => ForwardState::Done {
                    response,
                    cookies: Some(Auth::default()),
                    outcome: ForwardOutcome::LoggedOut,
                },
                ForwardState::Done {
                    response,
                    cookies,
                    outcome,
                } => {
                    if let Some(auth) = cookies {
                        self.codec.write_auth(&auth, &mut out.headers);
                    }
                    tracing::info!(
                        client_ip = %inbound.client_ip,
                        method = %outbound.method,
                        path = %outbound.url.path(),
                        query = outbound.url.query().unwrap_or(""),
                        body_bytes = outbound.body_len(),
                        status = response.status.as_u16(),
                        response_bytes = response.body.len(),
                        outcome = ?outcome,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        service = "API",
                        "Forwarded request"
                    );
                    forward_response(response, out);
                    return Ok(outcome);
                }
            };
        }
    }

    /// Backend readiness.
    pub async fn healthcheck(&self) -> Result<(), HealthcheckError> {
        healthcheck(self.transport.as_ref(), &self.backend).await
    }

    fn build_request(&self, inbound: &InboundRequest, auth: &Auth, body_override: Option<Bytes>) -> OutboundRequest {
        let url = self.backend.rewrite(inbound.path(), inbound.query());
        let mut request = OutboundRequest::new(inbound.method.clone(), url);

        request.headers.insert(CONTENT_TYPE, APPLICATION_JSON);
        request.headers.insert(ACCEPT, APPLICATION_JSON);
        copy_headers(&inbound.headers, &mut request.headers, &REQUEST_ALLOW_LIST);
        copy_cloudflare_headers(&inbound.headers, &mut request.headers);

        if let Ok(ip) = HeaderValue::from_str(&inbound.client_ip) {
            request.headers.insert(X_FORWARDED_FOR, ip);
        }
        if auth.is_logged() {
            write_bearer(&mut request.headers, &auth.access_token);
        }
        if BODY_METHODS.contains(&inbound.method) {
            request.body = Some(body_override.unwrap_or_else(|| inbound.body.clone()));
        }
        request
    }
}

/// Copy status, body and allow-listed headers of a backend response.
fn forward_response(response: BackendResponse, out: &mut GatewayResponse) {
    out.status = response.status;
    out.body = response.body;
    copy_headers(&response.headers, &mut out.headers, &RESPONSE_ALLOW_LIST);
    if out.headers.contains_key(ACCESS_CONTROL_ALLOW_ORIGIN) {
        out.headers
            .insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::cookie::{CookieConfig, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
    use crate::upstream::testing::MockTransport;
    use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE, USER_AGENT};
    use axum::http::Uri;

    fn forwarder(transport: Arc<MockTransport>) -> Forwarder {
        Forwarder::new(
            transport,
            BackendUrl::parse("http://api.local:8080").unwrap(),
            CookieCodec::new(CookieConfig::default()),
        )
    }

    fn inbound(method: Method, uri: &'static str, cookies: Option<&'static str>) -> InboundRequest {
        let mut request = InboundRequest::new(method, Uri::from_static(uri));
        request.client_ip = "1.2.3.4".into();
        if let Some(cookies) = cookies {
            request.headers.insert(COOKIE, HeaderValue::from_static(cookies));
        }
        request
    }

    fn set_cookies(out: &GatewayResponse) -> Vec<String> {
        out.headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_forward_rewrites_request() {
        let transport = Arc::new(MockTransport::new().respond(StatusCode::CREATED, "{}"));
        let mut request = inbound(Method::POST, "/api/users/create%20one?one=two%203", Some("cshtrka=t1"));
        request.body = Bytes::from_static(b"{\"name\":\"x\"}");
        request.headers.insert(USER_AGENT, HeaderValue::from_static("tests"));
        request.headers.insert("cf-ipcountry", HeaderValue::from_static("NL"));
        request.headers.insert("x-custom", HeaderValue::from_static("dropped"));

        let mut out = GatewayResponse::new();
        let outcome = forwarder(transport.clone()).forward(&request, None, &mut out).await.unwrap();
        assert_eq!(outcome, ForwardOutcome::Passthrough);
        assert_eq!(out.status, StatusCode::CREATED);

        let sent = &transport.requests()[0];
        assert_eq!(sent.url.as_str(), "http://api.local:8080/users/create%20one?one=two%203");
        assert_eq!(sent.headers.get(AUTHORIZATION).unwrap(), "Bearer t1");
        assert_eq!(sent.headers.get(X_FORWARDED_FOR).unwrap(), "1.2.3.4");
        assert_eq!(sent.headers.get(USER_AGENT).unwrap(), "tests");
        assert_eq!(sent.headers.get("cf-original-ipcountry").unwrap(), "NL");
        assert_eq!(sent.headers.get(ACCEPT).unwrap(), "application/json");
        assert!(sent.headers.get("x-custom").is_none());
        assert_eq!(sent.body.as_deref(), Some(&b"{\"name\":\"x\"}"[..]));
    }

    #[tokio::test]
    async fn test_get_sends_no_body_and_no_bearer_for_guest() {
        let transport = Arc::new(MockTransport::new().respond(StatusCode::OK, "[]"));
        let mut request = inbound(Method::GET, "/api/items", None);
        request.body = Bytes::from_static(b"ignored");

        let mut out = GatewayResponse::new();
        forwarder(transport.clone()).forward(&request, None, &mut out).await.unwrap();

        let sent = &transport.requests()[0];
        assert!(sent.body.is_none());
        assert!(sent.headers.get(AUTHORIZATION).is_none());
        assert_eq!(out.body, Bytes::from_static(b"[]"));
    }

    #[tokio::test]
    async fn test_body_override_replaces_inbound_body() {
        let transport = Arc::new(MockTransport::new().respond(StatusCode::OK, "{}"));
        let mut request = inbound(Method::POST, "/auth/logout", None);
        request.body = Bytes::from_static(b"client");

        let mut out = GatewayResponse::new();
        forwarder(transport.clone())
            .forward(&request, Some(Bytes::from_static(b"override")), &mut out)
            .await
            .unwrap();
        assert_eq!(transport.requests()[0].body.as_deref(), Some(&b"override"[..]));
    }

    #[tokio::test]
    async fn test_response_allow_list_and_credentials() {
        let mut backend = BackendResponse::new(StatusCode::OK, "{}");
        backend.headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("http://app.local"));
        backend.headers.insert("x-ratelimit-remaining", HeaderValue::from_static("9"));
        backend.headers.insert("x-internal", HeaderValue::from_static("secret"));
        let transport = Arc::new(MockTransport::new().respond_with(backend));

        let mut out = GatewayResponse::new();
        forwarder(transport)
            .forward(&inbound(Method::GET, "/api/x", None), None, &mut out)
            .await
            .unwrap();

        assert_eq!(out.headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "http://app.local");
        assert_eq!(out.headers.get(ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(), "true");
        assert_eq!(out.headers.get("x-ratelimit-remaining").unwrap(), "9");
        assert!(out.headers.get("x-internal").is_none());
    }

    #[tokio::test]
    async fn test_refresh_and_retry() {
        let transport = Arc::new(
            MockTransport::new()
                .respond(StatusCode::UNAUTHORIZED, "{}")
                .respond(StatusCode::OK, r#"{"accessToken":"t2","refreshToken":"r2"}"#)
                .respond(StatusCode::OK, r#"{"id":1}"#),
        );
        let request = inbound(Method::GET, "/api/me", Some("cshtrka=t1; cshtrkr=r1"));

        let mut out = GatewayResponse::new();
        let outcome = forwarder(transport.clone()).forward(&request, None, &mut out).await.unwrap();
        assert_eq!(outcome, ForwardOutcome::Refreshed);
        assert_eq!(out.status, StatusCode::OK);
        assert_eq!(out.body, Bytes::from_static(br#"{"id":1}"#));

        let sent = transport.requests();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].headers.get(AUTHORIZATION).unwrap(), "Bearer t1");
        assert_eq!(sent[1].url.path(), "/auth/refresh");
        assert_eq!(sent[2].headers.get(AUTHORIZATION).unwrap(), "Bearer t2");
        assert_eq!(sent[2].url, sent[0].url);

        let cookies = set_cookies(&out);
        assert!(cookies.iter().any(|c| c.starts_with(&format!("{}=t2;", ACCESS_TOKEN_COOKIE))));
        assert!(cookies.iter().any(|c| c.starts_with(&format!("{}=r2;", REFRESH_TOKEN_COOKIE))));
    }

    #[tokio::test]
    async fn test_refresh_rejected_logs_out() {
        let transport = Arc::new(
            MockTransport::new()
                .respond(StatusCode::UNAUTHORIZED, r#"{"message":"expired"}"#)
                .respond(StatusCode::UNAUTHORIZED, "{}"),
        );
        let request = inbound(Method::GET, "/api/me", Some("cshtrka=t1; cshtrkr=r1"));

        let mut out = GatewayResponse::new();
        let outcome = forwarder(transport.clone()).forward(&request, None, &mut out).await.unwrap();
        assert_eq!(outcome, ForwardOutcome::LoggedOut);
        assert_eq!(out.status, StatusCode::UNAUTHORIZED);
        assert_eq!(out.body, Bytes::from_static(br#"{"message":"expired"}"#));
        assert_eq!(transport.requests().len(), 2);

        let cookies = set_cookies(&out);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    }

    #[tokio::test]
    async fn test_refresh_error_logs_out() {
        let transport = Arc::new(
            MockTransport::new()
                .respond(StatusCode::UNAUTHORIZED, "{}")
                .respond(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
        );
        let request = inbound(Method::GET, "/api/me", Some("cshtrka=t1; cshtrkr=r1"));

        let mut out = GatewayResponse::new();
        let outcome = forwarder(transport).forward(&request, None, &mut out).await.unwrap();
        assert_eq!(outcome, ForwardOutcome::LoggedOut);
        assert_eq!(out.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_transport_failure_logs_out() {
        let transport = Arc::new(
            MockTransport::new()
                .respond(StatusCode::UNAUTHORIZED, r#"{"message":"expired"}"#)
                .fail(),
        );
        let request = inbound(Method::GET, "/api/me", Some("cshtrka=t1; cshtrkr=r1"));

        let mut out = GatewayResponse::new();
        let outcome = forwarder(transport.clone()).forward(&request, None, &mut out).await;
        assert_eq!(outcome.unwrap(), ForwardOutcome::LoggedOut);
        assert_eq!(out.status, StatusCode::UNAUTHORIZED);
        assert_eq!(out.body, Bytes::from_static(br#"{"message":"expired"}"#));
        assert_eq!(transport.requests().len(), 2);

        let cookies = set_cookies(&out);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    }

    #[tokio::test]
    async fn test_unauthorized_without_refresh_token_passes_through() {
        let transport = Arc::new(MockTransport::new().respond(StatusCode::UNAUTHORIZED, "{}"));
        let request = inbound(Method::GET, "/api/me", Some("cshtrka=t1"));

        let mut out = GatewayResponse::new();
        let outcome = forwarder(transport.clone()).forward(&request, None, &mut out).await.unwrap();
        assert_eq!(outcome, ForwardOutcome::Passthrough);
        assert_eq!(out.status, StatusCode::UNAUTHORIZED);
        assert_eq!(transport.requests().len(), 1);
        assert!(set_cookies(&out).is_empty());
    }

    #[tokio::test]
    async fn test_first_call_failure() {
        let transport = Arc::new(MockTransport::new().fail());
        let mut out = GatewayResponse::new();
        let err = forwarder(transport)
            .forward(&inbound(Method::GET, "/api/me", None), None, &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Request(_)));
        assert!(err.to_string().starts_with("API request error: "));
    }

    #[tokio::test]
    async fn test_retry_failure() {
        let transport = Arc::new(
            MockTransport::new()
                .respond(StatusCode::UNAUTHORIZED, "{}")
                .respond(StatusCode::OK, r#"{"accessToken":"t2","refreshToken":"r2"}"#)
                .fail(),
        );
        let request = inbound(Method::GET, "/api/me", Some("cshtrka=t1; cshtrkr=r1"));

        let mut out = GatewayResponse::new();
        let err = forwarder(transport).forward(&request, None, &mut out).await.unwrap_err();
        assert!(matches!(err, ForwardError::Retry(_)));
        assert!(err.to_string().starts_with("API request with fresh token error: "));
    }

    #[tokio::test]
    async fn test_healthcheck_delegates() {
        let transport = Arc::new(MockTransport::new().respond(StatusCode::OK, "ok"));
        forwarder(transport.clone()).healthcheck().await.unwrap();
        assert_eq!(transport.requests()[0].url.as_str(), "http://api.local:8080/healthcheck");
    }
}
