//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};

use axum::{
    body::{Body, Bytes},
    http::{header::CONTENT_TYPE, HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;

use api_gateway::auth::{CookieCodec, CookieConfig};
use api_gateway::captcha::StaticCaptchaProvider;
use api_gateway::csrf::{CsrfGuard, MemoryTokenStore};
use api_gateway::http::{AppState, GatewayServer, Redirects, ServerSettings};
use api_gateway::upstream::{BackendUrl, Forwarder, ReqwestTransport, TransportSettings};

pub const WEBAPP_URL: &str = "http://webapp.local";
pub const WEBSITE_URL: &str = "http://website.local";

/// A request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Mock backend listening on an ephemeral port.
pub struct MockBackend {
    pub url: String,
    recorded: Arc<Mutex<Vec<Recorded>>>,
}

impl MockBackend {
    pub fn requests(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }
}

/// Start a programmable mock backend. `reply` answers with status and JSON body.
pub async fn start_backend<F, Fut>(reply: F) -> MockBackend
where
    F: Fn(Recorded) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let recorded: Arc<Mutex<Vec<Recorded>>> = Arc::default();
    let reply = Arc::new(reply);

    let log = recorded.clone();
    let router = Router::new().fallback(move |request: Request<Body>| {
        let log = log.clone();
        let reply = reply.clone();
        async move {
            let (parts, body) = request.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
            let seen = Recorded {
                method: parts.method,
                path_and_query: parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str().to_string())
                    .unwrap_or_default(),
                headers: parts.headers,
                body,
            };
            log.lock().unwrap().push(seen.clone());

            let (status, body) = reply(seen).await;
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, [(CONTENT_TYPE, "application/json")], body).into_response()
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    MockBackend {
        url: format!("http://{}", addr),
        recorded,
    }
}

/// Gateway state wired to a real transport against `backend_url`.
pub fn app_state(backend_url: &str, captcha: StaticCaptchaProvider) -> AppState {
    let codec = CookieCodec::new(CookieConfig::default());
    let transport = Arc::new(ReqwestTransport::new(&TransportSettings::default()).unwrap());
    AppState {
        forwarder: Arc::new(Forwarder::new(
            transport,
            BackendUrl::parse(backend_url).unwrap(),
            codec.clone(),
        )),
        captcha: Arc::new(captcha),
        csrf: Arc::new(CsrfGuard::new(Arc::new(MemoryTokenStore::new()), codec)),
        redirects: Arc::new(Redirects {
            webapp_url: WEBAPP_URL.into(),
            website_url: WEBSITE_URL.into(),
        }),
    }
}

pub fn router(state: AppState, settings: ServerSettings) -> Router {
    GatewayServer::new(state, &settings).router()
}

/// HS256 access token carrying `sub` and `iat`.
pub fn access_token(sub: u64, iat: u64) -> String {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &serde_json::json!({ "sub": sub, "iat": iat }),
        &jsonwebtoken::EncodingKey::from_secret(b"backend-secret"),
    )
    .unwrap()
}

pub fn request(method: Method, uri: &str, cookies: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookies) = cookies {
        builder = builder.header("cookie", cookies);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value of `name` among the response's Set-Cookie headers.
pub fn cookie_value(response: &Response, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    set_cookies(response).into_iter().find_map(|c| {
        c.strip_prefix(&prefix)
            .and_then(|rest| rest.split(';').next())
            .map(str::to_string)
    })
}
