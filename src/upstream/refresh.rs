//! Token refresh call.
//!
//! `POST /auth/refresh` with the refresh token as bearer and the current
//! access token in the body. A 401 means "log in again" and is not an error.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::auth::tokens::Auth;
use crate::upstream::endpoint::BackendUrl;
use crate::upstream::headers::{write_bearer, APPLICATION_JSON};
use crate::upstream::transport::{BackendTransport, OutboundRequest, TransportError};

pub const REFRESH_PATH: &str = "/auth/refresh";

/// Longest backend body excerpt kept in an error.
const BODY_EXCERPT: usize = 512;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("refresh token API request error: {0}")]
    Transport(#[from] TransportError),

    #[error("refresh token failed [status {status}]: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("refresh token unexpected response body: {0}")]
    InvalidBody(String),
}

/// Exchanges a refresh token for a new token pair.
#[derive(Clone)]
pub struct RefreshClient {
    transport: Arc<dyn BackendTransport>,
    backend: BackendUrl,
}

impl RefreshClient {
    pub fn new(transport: Arc<dyn BackendTransport>, backend: BackendUrl) -> Self {
        Self { transport, backend }
    }

    /// New credentials, or an empty `Auth` when the backend wants a new login.
    pub async fn refresh(&self, auth: &Auth) -> Result<Auth, RefreshError> {
        let mut request = OutboundRequest::new(Method::POST, self.backend.endpoint(REFRESH_PATH, None));
        request.headers.insert(CONTENT_TYPE, APPLICATION_JSON);
        request.headers.insert(ACCEPT, APPLICATION_JSON);
        write_bearer(&mut request.headers, &auth.refresh_token);

        let payload = Auth::new(auth.access_token.clone(), "");
        let body = serde_json::to_vec(&payload).map_err(|e| RefreshError::InvalidBody(e.to_string()))?;
        request.body = Some(Bytes::from(body));

        let response = self.transport.send(&request).await?;

        match response.status {
            StatusCode::UNAUTHORIZED => Ok(Auth::default()),
            StatusCode::OK => serde_json::from_slice(&response.body)
                .map_err(|e| RefreshError::InvalidBody(e.to_string())),
            status => Err(RefreshError::UnexpectedStatus {
                status: status.as_u16(),
                body: excerpt(&response.body),
            }),
        }
    }
}

fn excerpt(body: &[u8]) -> String {
    let end = body.len().min(BODY_EXCERPT);
    String::from_utf8_lossy(&body[..end]).into_owned()
}
