//! Backend readiness probe.

use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::upstream::endpoint::BackendUrl;
use crate::upstream::headers::APPLICATION_JSON;
use crate::upstream::transport::{BackendTransport, OutboundRequest, TransportError};

pub const HEALTHCHECK_PATH: &str = "/healthcheck";

#[derive(Debug, Error)]
pub enum HealthcheckError {
    #[error("healthcheck API request error: {0}")]
    Transport(#[from] TransportError),

    #[error("healthcheck failed [{status}], body: {body}")]
    Unhealthy { status: u16, body: String },
}

/// `GET /healthcheck` on the backend; anything but 200 is unhealthy.
pub async fn healthcheck(
    transport: &dyn BackendTransport,
    backend: &BackendUrl,
) -> Result<(), HealthcheckError> {
    let mut request = OutboundRequest::new(Method::GET, backend.endpoint(HEALTHCHECK_PATH, None));
    request.headers.insert(CONTENT_TYPE, APPLICATION_JSON);
    request.headers.insert(ACCEPT, APPLICATION_JSON);

    let response = transport.send(&request).await?;
    if response.status != StatusCode::OK {
        return Err(HealthcheckError::Unhealthy {
            status: response.status.as_u16(),
            body: String::from_utf8_lossy(&response.body).into_owned(),
        });
    }
    Ok(())
}
