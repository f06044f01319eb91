//! Gateway response builder and JSON payloads.
//!
//! # Responsibilities
//! - Accumulate status, headers and body written by the forwarder, the cookie
//!   codec and the handlers
//! - Render the gateway's own JSON bodies (errors and redirects)
//! - Convert into an axum `Response` once the handler is done
//!
//! # Design Decisions
//! - Bodies are fully buffered; backend responses are small JSON documents
//! - Error bodies always carry the user-facing `message`; `error` holds the
//!   diagnostic and is omitted when empty

use axum::{
    body::{Body, Bytes},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::upstream::headers::APPLICATION_JSON;

pub const DEFAULT_ERROR_MESSAGE: &str = "Unexpected error happened. Please try again later.";
pub const CAPTCHA_BAD_MESSAGE: &str = "Captcha validation unsuccessful. Please try again.";
pub const CAPTCHA_ERROR_MESSAGE: &str =
    "Unexpected response from captcha validation service. Please try again later.";

/// Mutable response under construction.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Default for GatewayResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

impl GatewayResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the body with a JSON document and mark it as JSON.
    pub fn set_json<T: Serialize>(&mut self, value: &T) -> Result<(), serde_json::Error> {
        self.body = Bytes::from(serde_json::to_vec(value)?);
        self.headers.insert(CONTENT_TYPE, APPLICATION_JSON);
        Ok(())
    }

    /// Turn this response into an error document, keeping the cookies already set.
    pub fn set_error(&mut self, error: ErrorResponse) {
        self.status = error.status;
        self.body = error.to_body();
        self.headers.insert(CONTENT_TYPE, APPLICATION_JSON);
    }
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// JSON error body `{message, error}` with its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    #[serde(skip)]
    pub status: StatusCode,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error: error.into(),
        }
    }

    /// Generic user message with the error's display text as diagnostic.
    pub fn from_error(status: StatusCode, error: &impl std::fmt::Display) -> Self {
        Self::new(status, DEFAULT_ERROR_MESSAGE, error.to_string())
    }

    pub fn captcha_bad() -> Self {
        Self::new(StatusCode::BAD_REQUEST, CAPTCHA_BAD_MESSAGE, "")
    }

    pub fn captcha_error(error: &impl std::fmt::Display) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            CAPTCHA_ERROR_MESSAGE,
            error.to_string(),
        )
    }

    fn to_body(&self) -> Bytes {
        // Two string fields cannot fail to serialize.
        Bytes::from(serde_json::to_vec(self).unwrap_or_default())
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let mut response = GatewayResponse::new();
        response.set_error(self);
        response.into_response()
    }
}

/// `{"redirectUrl": ...}` returned after login and logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectResponse {
    pub redirect_url: String,
}

impl RedirectResponse {
    pub fn new(redirect_url: impl Into<String>) -> Self {
        Self {
            redirect_url: redirect_url.into(),
        }
    }
}
