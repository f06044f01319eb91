//! CSRF guard: pre-check, post-handler rotation, explicit rotation.
//!
//! # Data Flow
//! ```text
//! request ──▶ OPTIONS? ──yes──▶ handler ──▶ response (untouched)
//!               │no
//!               ▼
//!          classify ──Skip──────────────┐
//!               │RequireCheck           │
//!               ▼                       ▼
//!          store.get(key) ──▶ Pass ──▶ handler ──▶ logged in? ──▶ rotate
//!               │
//!               └──▶ Reject ──▶ 417 (handler never runs)
//! ```
//!
//! # Design Decisions
//! - Only mutating methods from logged-in sessions are checked
//! - Every non-OPTIONS response for a logged-in session rotates the token
//! - A failed store write during rotation turns the response into a 500 and
//!   keeps the old cookie, so the next mutating call fails closed
//! - A session without a derivable identity is not rotated; the handler's
//!   status stands and mutating calls are still rejected by the pre-check

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::claims::{extract_session_identity, ClaimsError};
use crate::auth::cookie::{CookieCodec, CsrfCookie};
use crate::csrf::store::{StoreError, TokenStore};
use crate::http::response::ErrorResponse;
use crate::observability::metrics;

/// Namespace of CSRF keys in the token store.
pub const CSRF_KEY_PREFIX: &str = "CT:csrf";

const MUTATING_METHODS: [Method; 4] = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

/// Why a CSRF check or rotation failed.
#[derive(Debug, Error)]
pub enum CsrfError {
    #[error("unable to verify with invalid user context: {0}")]
    InvalidContext(#[from] ClaimsError),

    #[error("error on reading token: {0}")]
    StoreRead(StoreError),

    #[error("error on reading token: no token stored for session")]
    TokenNotFound,

    #[error("invalid CSRF token")]
    Mismatch,

    #[error("error on writing new token: {0}")]
    StoreWrite(StoreError),
}

/// Pre-check state of a single request.
#[derive(Debug)]
pub enum CsrfCheck {
    Skip,
    RequireCheck,
    Pass,
    Reject(CsrfError),
}

impl CsrfCheck {
    fn label(&self) -> &'static str {
        match self {
            CsrfCheck::Skip => "skip",
            CsrfCheck::RequireCheck => "require_check",
            CsrfCheck::Pass => "pass",
            CsrfCheck::Reject(_) => "reject",
        }
    }
}

/// CSRF cookie plus the session identity derived from its access token.
#[derive(Debug, Clone)]
pub struct CsrfContext {
    pub cookie: CsrfCookie,
    identity: Result<String, ClaimsError>,
}

impl CsrfContext {
    pub fn new(cookie: CsrfCookie) -> Self {
        let identity = extract_session_identity(&cookie.auth.access_token);
        Self { cookie, identity }
    }

    pub fn is_valid(&self) -> bool {
        self.identity.is_ok()
    }

    pub fn identity(&self) -> Result<&str, &ClaimsError> {
        self.identity.as_deref()
    }

    pub fn is_logged(&self) -> bool {
        self.cookie.auth.is_logged()
    }
}

/// Validates and rotates CSRF tokens against a `TokenStore`.
pub struct CsrfGuard {
    store: Arc<dyn TokenStore>,
    codec: CookieCodec,
    key_prefix: String,
    ttl: Duration,
}

impl CsrfGuard {
    pub fn new(store: Arc<dyn TokenStore>, codec: CookieCodec) -> Self {
        let ttl = codec.config().csrf_ttl;
        Self {
            store,
            codec,
            key_prefix: CSRF_KEY_PREFIX.to_string(),
            ttl,
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn context(&self, headers: &HeaderMap) -> CsrfContext {
        CsrfContext::new(self.codec.read_csrf(headers))
    }

    /// Store key for a session identity.
    pub fn key(&self, identity: &str) -> String {
        format!("{}:{}", self.key_prefix, identity)
    }

    /// First transition: does this request need a token match at all?
    pub fn classify(&self, method: &Method, ctx: &CsrfContext) -> CsrfCheck {
        if MUTATING_METHODS.contains(method) && ctx.is_logged() {
            CsrfCheck::RequireCheck
        } else {
            CsrfCheck::Skip
        }
    }

    /// Run the pre-check to a terminal state: `Skip`, `Pass` or `Reject`.
    pub async fn check(&self, method: &Method, ctx: &CsrfContext) -> CsrfCheck {
        match self.classify(method, ctx) {
            CsrfCheck::RequireCheck => match self.verify(ctx).await {
                Ok(()) => CsrfCheck::Pass,
                Err(err) => CsrfCheck::Reject(err),
            },
            other => other,
        }
    }

    async fn verify(&self, ctx: &CsrfContext) -> Result<(), CsrfError> {
        let identity = ctx.identity().map_err(|e| CsrfError::InvalidContext(e.clone()))?;
        let key = self.key(identity);

        let stored = self
            .store
            .get(&key)
            .await
            .map_err(CsrfError::StoreRead)?
            .ok_or(CsrfError::TokenNotFound)?;

        if stored != ctx.cookie.token {
            tracing::warn!(key = %key, "CSRF token does not match stored token");
            return Err(CsrfError::Mismatch);
        }
        Ok(())
    }

    /// Issue a new token, persist it and write the CSRF cookie.
    ///
    /// Nothing is written to `headers` when persisting fails.
    pub async fn rotate(&self, ctx: &CsrfContext, headers: &mut HeaderMap) -> Result<String, CsrfError> {
        let identity = ctx.identity().map_err(|e| CsrfError::InvalidContext(e.clone()))?;
        let token = Uuid::now_v7().to_string();

        self.store
            .set_ex(&self.key(identity), &token, self.ttl)
            .await
            .map_err(CsrfError::StoreWrite)?;

        let cookie = CsrfCookie {
            token: token.clone(),
            auth: ctx.cookie.auth.clone(),
        };
        self.codec.write_csrf(&cookie, headers);
        Ok(token)
    }

    /// `GET /csrf`: rotate for a logged-in session, clear for a guest.
    pub async fn rotation_response(&self, headers: &HeaderMap) -> Response {
        let ctx = self.context(headers);
        let mut response = StatusCode::OK.into_response();

        if !ctx.is_logged() {
            self.codec.write_csrf(&ctx.cookie, response.headers_mut());
            *response.status_mut() = StatusCode::UNAUTHORIZED;
            return response;
        }

        if let Err(err) = self.rotate(&ctx, response.headers_mut()).await {
            tracing::error!(error = %err, "Error on rotating CSRF token");
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        }
        response
    }
}

/// Axum middleware enforcing the CSRF check and rotating after the handler.
pub async fn csrf_middleware(
    State(guard): State<Arc<CsrfGuard>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let ctx = guard.context(request.headers());
    let check = guard.check(request.method(), &ctx).await;
    metrics::record_csrf_check(check.label());

    if let CsrfCheck::Reject(err) = check {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            error = %err,
            "Error on validating CSRF token"
        );
        return ErrorResponse::from_error(StatusCode::EXPECTATION_FAILED, &err).into_response();
    }

    let mut response = next.run(request).await;

    if ctx.is_logged() {
        match guard.rotate(&ctx, response.headers_mut()).await {
            Ok(_) => {}
            // Mutating requests from this session still fail the pre-check.
            Err(CsrfError::InvalidContext(err)) => {
                tracing::warn!(error = %err, "Skipping CSRF rotation, no session identity");
            }
            Err(err) => {
                tracing::error!(error = %err, "Error on rotating CSRF token");
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            }
        }
    }
    response
}
