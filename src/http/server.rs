//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout, compression, metrics,
//!   CORS, CSRF, default headers)
//! - Serve plain HTTP or TLS with graceful shutdown
//!
//! # Data Flow
//! ```text
//! SetRequestId → Trace → PropagateRequestId → Timeout → [Compression]
//!     → BodyLimit → metrics → CORS → [CSRF] → defaults → handler
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware::{from_fn, from_fn_with_state},
    routing::{any, get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::captcha::CaptchaProvider;
use crate::config::GatewayConfig;
use crate::csrf::{csrf_middleware, CsrfGuard};
use crate::http::handlers;
use crate::http::middleware::{cors_middleware, defaults_middleware, metrics_middleware, CorsPolicy};
use crate::upstream::Forwarder;

/// Cookie-aware auth routes that hand out tokens.
const LOGIN_ROUTES: [&str; 4] = [
    "/auth/login",
    "/auth/login/passkey",
    "/auth/register",
    "/auth/provider/google",
];
const PASSKEY_INIT_ROUTE: &str = "/auth/login/passkey/init";
const LOGOUT_ROUTE: &str = "/auth/logout";

/// Auth routes are reachable with and without the `/api` prefix.
const ROUTE_PREFIXES: [&str; 2] = ["", "/api"];

const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Redirect targets returned after login and logout.
#[derive(Debug, Clone, Default)]
pub struct Redirects {
    pub webapp_url: String,
    pub website_url: String,
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<Forwarder>,
    pub captcha: Arc<dyn CaptchaProvider>,
    pub csrf: Arc<CsrfGuard>,
    pub redirects: Arc<Redirects>,
}

/// Router-level switches and limits.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub csrf_enabled: bool,
    pub compress: bool,
    pub request_timeout: Duration,
    pub max_body_size: usize,
    pub cors: CorsPolicy,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            csrf_enabled: false,
            compress: false,
            request_timeout: Duration::from_secs(30),
            max_body_size: 2 * 1024 * 1024,
            cors: CorsPolicy::default(),
        }
    }
}

impl ServerSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            csrf_enabled: config.csrf.enabled,
            compress: config.listener.compress,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            max_body_size: config.listener.max_body_size,
            cors: CorsPolicy::new(&config.cors.allowed_origins),
        }
    }
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    pub fn new(state: AppState, settings: &ServerSettings) -> Self {
        Self {
            router: Self::build_router(state, settings),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: AppState, settings: &ServerSettings) -> Router {
        let guard = state.csrf.clone();

        let mut router = Router::new();
        for prefix in ROUTE_PREFIXES {
            for route in LOGIN_ROUTES {
                router = router.route(&format!("{}{}", prefix, route), post(handlers::login));
            }
            router = router
                .route(&format!("{}{}", prefix, PASSKEY_INIT_ROUTE), post(handlers::passkey_init))
                .route(&format!("{}{}", prefix, LOGOUT_ROUTE), post(handlers::logout));
        }

        let mut router = router
            .route("/api/{*path}", any(handlers::forward))
            .route("/csrf", get(handlers::rotate_csrf))
            .route("/live", any(handlers::live))
            .route("/ready", any(handlers::ready))
            .with_state(state)
            .layer(from_fn(defaults_middleware));

        if settings.csrf_enabled {
            router = router.layer(from_fn_with_state(guard, csrf_middleware));
        }

        let mut router = router
            .layer(from_fn_with_state(Arc::new(settings.cors.clone()), cors_middleware))
            .layer(from_fn(metrics_middleware))
            .layer(DefaultBodyLimit::max(settings.max_body_size));

        if settings.compress {
            router = router.layer(CompressionLayer::new());
        }

        router
            .layer(TimeoutLayer::new(settings.request_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve plain HTTP until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until `shutdown` resolves.
    pub async fn run_tls<F>(self, addr: SocketAddr, tls: RustlsConfig, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            shutdown.await;
            drain.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        tracing::info!(address = %addr, "HTTPS server starting");
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}
