//! Default request/response headers.
//!
//! Before the handler the client IP is resolved once and stored as a
//! [`ClientIp`] extension; after it, responses without a `Content-Type` are
//! marked as JSON.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header::CONTENT_TYPE, Request},
    middleware::Next,
    response::Response,
};

use crate::http::request::ClientIp;
use crate::upstream::headers::{resolve_client_ip, APPLICATION_JSON};

pub async fn defaults_middleware(mut request: Request<Body>, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    let client_ip = resolve_client_ip(request.headers(), peer);
    request.extensions_mut().insert(ClientIp(client_ip));

    let mut response = next.run(request).await;

    if !response.headers().contains_key(CONTENT_TYPE) {
        response.headers_mut().insert(CONTENT_TYPE, APPLICATION_JSON);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Extension,
        middleware::from_fn,
        response::IntoResponse,
        routing::get,
        Router,
    };
    use std::net::{IpAddr, Ipv4Addr};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/ip", get(|Extension(ip): Extension<ClientIp>| async move { ip.0 }))
            .route(
                "/empty",
                get(|| async { axum::http::StatusCode::NO_CONTENT.into_response() }),
            )
            .layer(from_fn(defaults_middleware))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_client_ip_from_headers() {
        let request = Request::builder()
            .uri("/ip")
            .header("x-real-ip", "3.3.3.3")
            .header("cf-connecting-ip", "4.4.4.4")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(body_string(response).await, "4.4.4.4");
    }

    #[tokio::test]
    async fn test_client_ip_from_peer() {
        let mut request = Request::builder().uri("/ip").body(Body::empty()).unwrap();
        request.extensions_mut().insert(ConnectInfo(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)),
            4000,
        )));
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(body_string(response).await, "10.0.0.7");
    }

    #[tokio::test]
    async fn test_default_content_type() {
        let request = Request::builder().uri("/empty").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "application/json");

        let request = Request::builder().uri("/ip").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_string(response).await, "0.0.0.0");
    }
}
