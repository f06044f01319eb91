//! Inbound request view handed to gateway handlers.
//!
//! # Responsibilities
//! - Buffer the client body once (honours the router's body limit)
//! - Carry the resolved client IP alongside method, URI and headers
//! - Expose path and raw query for backend path rewriting
//!
//! # Design Decisions
//! - Read-only: handlers write into a separate `GatewayResponse`
//! - The client IP is resolved by the defaults middleware and read from a
//!   request extension; direct extraction falls back to resolving it here

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, FromRequest, Request},
    http::{HeaderMap, Method, StatusCode, Uri},
};

use crate::http::response::ErrorResponse;
use crate::upstream::headers::resolve_client_ip;

/// Client IP resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

/// Buffered inbound request.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_ip: String,
}

impl InboundRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            client_ip: "0.0.0.0".to_string(),
        }
    }

    /// Percent-encoded path as received.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string, without the `?`.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }
}

impl<S> FromRequest<S> for InboundRequest
where
    S: Send + Sync,
{
    type Rejection = ErrorResponse;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (parts, body) = request.into_parts();

        let client_ip = match parts.extensions.get::<ClientIp>() {
            Some(ip) => ip.0.clone(),
            None => {
                let peer = parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|info| info.0.ip());
                resolve_client_ip(&parts.headers, peer)
            }
        };

        let method = parts.method.clone();
        let uri = parts.uri.clone();
        let headers = parts.headers.clone();

        let body = Bytes::from_request(Request::from_parts(parts, body), state)
            .await
            .map_err(|rejection| {
                tracing::warn!(error = %rejection, "Could not read request body");
                ErrorResponse::from_error(rejection.status(), &rejection)
            })?;

        Ok(Self {
            method,
            uri,
            headers,
            body,
            client_ip,
        })
    }
}
