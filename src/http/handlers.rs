//! Route handlers.
//!
//! # Responsibilities
//! - Login-class routes: CAPTCHA gate, forward, turn the token payload into
//!   cookies and answer with a web app redirect
//! - Logout: forward the refresh token, clear cookies, redirect to the website
//! - Generic forwarding for everything under `/api`
//! - CSRF rotation endpoint and liveness/readiness probes

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};

use crate::auth::tokens::Auth;
use crate::http::request::InboundRequest;
use crate::http::response::{ErrorResponse, GatewayResponse, RedirectResponse};
use crate::http::server::AppState;

const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

const READY_FAILED: &str = "[api] nok";

/// `POST /auth/login`, `/auth/login/passkey`, `/auth/register`,
/// `/auth/provider/google`.
pub async fn login(State(state): State<AppState>, request: InboundRequest) -> Response {
    if let Err(rejection) = verify_captcha(&state, &request).await {
        return rejection;
    }

    let mut out = GatewayResponse::new();
    if let Err(err) = state.forwarder.forward(&request, None, &mut out).await {
        tracing::error!(client_ip = %request.client_ip, error = %err, "Login forward failed");
        return ErrorResponse::from_error(StatusCode::BAD_GATEWAY, &err).into_response();
    }

    if out.status != StatusCode::OK {
        return out.into_response();
    }

    let auth: Auth = match serde_json::from_slice(&out.body) {
        Ok(auth) => auth,
        Err(err) => {
            let reason = format!("login response body invalid: {}", err);
            tracing::error!(client_ip = %request.client_ip, error = %reason, "Login response rejected");
            out.set_error(ErrorResponse::from_error(StatusCode::BAD_GATEWAY, &reason));
            return out.into_response();
        }
    };

    state.forwarder.codec().write_auth(&auth, &mut out.headers);
    write_redirect(&mut out, &state.redirects.webapp_url);
    out.into_response()
}

/// `POST /auth/login/passkey/init`: CAPTCHA gate, then a plain forward.
pub async fn passkey_init(State(state): State<AppState>, request: InboundRequest) -> Response {
    if let Err(rejection) = verify_captcha(&state, &request).await {
        return rejection;
    }
    forward_request(&state, &request, None).await
}

/// `POST /auth/logout`.
pub async fn logout(State(state): State<AppState>, request: InboundRequest) -> Response {
    let codec = state.forwarder.codec();
    let current = codec.read_auth(&request.headers);
    let payload = Auth {
        refresh_token: current.refresh_token,
        ..Auth::default()
    };

    let mut out = GatewayResponse::new();
    match serde_json::to_vec(&payload) {
        Ok(body) => {
            if let Err(err) = state.forwarder.forward(&request, Some(Bytes::from(body)), &mut out).await {
                tracing::error!(client_ip = %request.client_ip, error = %err, "Logout forward failed");
                out.status = StatusCode::BAD_GATEWAY;
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "Could not encode logout payload");
            out.status = StatusCode::INTERNAL_SERVER_ERROR;
        }
    }

    codec.write_auth(&Auth::default(), &mut out.headers);
    write_redirect(&mut out, &state.redirects.website_url);
    out.into_response()
}

/// `ANY /api/{*path}`.
pub async fn forward(State(state): State<AppState>, request: InboundRequest) -> Response {
    if !ALLOWED_METHODS.contains(&request.method) {
        let reason = format!("request method {} is not allowed", request.method);
        return ErrorResponse::from_error(StatusCode::BAD_REQUEST, &reason).into_response();
    }
    forward_request(&state, &request, None).await
}

/// `GET /csrf`.
pub async fn rotate_csrf(State(state): State<AppState>, request: InboundRequest) -> Response {
    state.csrf.rotation_response(&request.headers).await
}

/// `/live`.
pub async fn live() -> &'static str {
    "ok"
}

/// `/ready`: the backend must answer its healthcheck.
pub async fn ready(State(state): State<AppState>) -> Response {
    match state.forwarder.healthcheck().await {
        Ok(()) => "ok".into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, READY_FAILED).into_response()
        }
    }
}

async fn forward_request(state: &AppState, request: &InboundRequest, body: Option<Bytes>) -> Response {
    let mut out = GatewayResponse::new();
    match state.forwarder.forward(request, body, &mut out).await {
        Ok(_) => out.into_response(),
        Err(err) => {
            tracing::error!(client_ip = %request.client_ip, error = %err, "Forward failed");
            out.set_error(ErrorResponse::from_error(StatusCode::BAD_GATEWAY, &err));
            out.into_response()
        }
    }
}

async fn verify_captcha(state: &AppState, request: &InboundRequest) -> Result<(), Response> {
    match state.captcha.verify(request).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(ErrorResponse::captcha_bad().into_response()),
        Err(err) => {
            tracing::error!(client_ip = %request.client_ip, error = %err, "Captcha verification failed");
            Err(ErrorResponse::captcha_error(&err).into_response())
        }
    }
}

fn write_redirect(out: &mut GatewayResponse, url: &str) {
    if let Err(err) = out.set_json(&RedirectResponse::new(url)) {
        tracing::error!(error = %err, "Could not encode redirect");
    }
}
