//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a validated `GatewayConfig` into the shared handler state
//! - Connect the token store (Redis when CSRF is enabled)
//! - Build the backend transport and CAPTCHA provider
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Without CSRF the in-memory store backs the `/csrf` endpoint, so no Redis
//!   is needed for local setups

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::auth::cookie::CookieCodec;
use crate::captcha::{CaptchaError, GoogleReCaptchaProvider};
use crate::config::GatewayConfig;
use crate::csrf::{CsrfGuard, MemoryTokenStore, RedisTokenStore, StoreError, TokenStore};
use crate::http::server::{AppState, Redirects};
use crate::upstream::{BackendUrl, Forwarder, ReqwestTransport, TransportError};

/// Budget for the initial Redis connection and PING.
pub const REDIS_STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid API_URL: {0}")]
    ApiUrl(#[from] url::ParseError),

    #[error("backend transport: {0}")]
    Transport(#[from] TransportError),

    #[error("captcha provider: {0}")]
    Captcha(#[from] CaptchaError),

    #[error("CSRF token store: {0}")]
    Store(#[from] StoreError),
}

/// Build the handler state for `config`.
pub async fn build_app_state(config: &GatewayConfig) -> Result<AppState, StartupError> {
    let backend = BackendUrl::parse(&config.backend.api_url)?;
    let transport = Arc::new(ReqwestTransport::new(&config.backend.transport_settings())?);
    let codec = CookieCodec::new(config.cookie_config());

    let store: Arc<dyn TokenStore> = if config.csrf.enabled {
        let store = tokio::time::timeout(
            REDIS_STARTUP_TIMEOUT,
            RedisTokenStore::connect(&config.csrf.redis_url, config.csrf.store_timeout()),
        )
        .await
        .map_err(|_| StoreError::Timeout(REDIS_STARTUP_TIMEOUT))??;
        tracing::info!(redis = %config.csrf.redis_url, "CSRF token store connected");
        Arc::new(store)
    } else {
        tracing::info!("CSRF protection disabled, using in-memory token store");
        Arc::new(MemoryTokenStore::new())
    };

    let captcha = GoogleReCaptchaProvider::with_verify_url(&config.captcha.secret, &config.captcha.verify_url)?;
    let csrf = CsrfGuard::new(store, codec.clone()).with_key_prefix(&config.csrf.key_prefix);

    Ok(AppState {
        forwarder: Arc::new(Forwarder::new(transport, backend, codec)),
        captcha: Arc::new(captcha),
        csrf: Arc::new(csrf),
        redirects: Arc::new(Redirects {
            webapp_url: config.urls.webapp_url.clone(),
            website_url: config.urls.website_url.clone(),
        }),
    })
}
