//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::cookie::{CookieConfig, CSRF_TOKEN_TTL};
use crate::upstream::transport::TransportSettings;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS, compression).
    pub listener: ListenerConfig,

    /// Backend API connection.
    pub backend: BackendConfig,

    /// Public URLs of the gateway, website and web app.
    pub urls: UrlConfig,

    /// Origins receiving CORS headers.
    pub cors: CorsConfig,

    /// CSRF protection and its token store.
    pub csrf: CsrfConfig,

    /// CAPTCHA verification for login-class routes.
    pub captcha: CaptchaConfig,

    /// Inbound request limits.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Cookie attributes derived from the gateway URL.
    pub fn cookie_config(&self) -> CookieConfig {
        CookieConfig {
            domain: cookie_domain(&self.urls.gateway_url),
            secure: self.urls.gateway_url.contains("https"),
            csrf_ttl: CSRF_TOKEN_TTL,
        }
    }
}

/// Host part of a URL: scheme, slashes and port removed.
pub fn cookie_domain(url: &str) -> String {
    let domain = url.replace("http://", "").replace("https://", "").replace('/', "");
    match domain.split_once(':') {
        Some((host, _)) => host.to_string(),
        None => domain,
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:80"). A bare ":port" binds all interfaces.
    pub bind_address: String,

    /// Optional TLS termination.
    pub tls: TlsConfig,

    /// Gzip responses when the client accepts it.
    pub compress: bool,

    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:80".to_string(),
            tls: TlsConfig::default(),
            compress: true,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,

    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Backend API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Scheme, host and port of the backend (e.g., "http://api:8080").
    pub api_url: String,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Total time for one backend call in seconds.
    pub request_timeout_secs: u64,

    /// Idle pooled connection lifetime in seconds.
    pub idle_timeout_secs: u64,

    /// Attempts per call on dropped connections (1 = no retry).
    pub attempts: u32,

    /// Dump outbound requests and responses at info level.
    pub debug_http: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            connect_timeout_secs: 2,
            request_timeout_secs: 5,
            idle_timeout_secs: 90,
            attempts: 2,
            debug_http: false,
        }
    }
}

impl BackendConfig {
    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            attempts: self.attempts,
            debug_http: self.debug_http,
        }
    }
}

/// Public URLs.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UrlConfig {
    /// The gateway's own URL; cookie domain and `Secure` derive from it.
    pub gateway_url: String,

    /// Redirect target after logout.
    pub website_url: String,

    /// Redirect target after login.
    pub webapp_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// CSRF protection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub enabled: bool,

    /// Redis connection (`host:port` or a `redis://` URL).
    pub redis_url: String,

    /// Timeout for a single token store call in milliseconds.
    pub store_timeout_ms: u64,

    /// Namespace of CSRF keys.
    pub key_prefix: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            redis_url: "localhost:6379".to_string(),
            store_timeout_ms: 500,
            key_prefix: crate::csrf::CSRF_KEY_PREFIX.to_string(),
        }
    }
}

impl CsrfConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptchaConfig {
    /// Empty secret disables verification.
    pub secret: String,

    pub verify_url: String,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            verify_url: crate::captcha::google::GOOGLE_VERIFY_URL.to_string(),
        }
    }
}

/// Inbound timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a whole inbound request in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_domain() {
        assert_eq!(cookie_domain("https://gateway.example.com/"), "gateway.example.com");
        assert_eq!(cookie_domain("http://localhost:3001"), "localhost");
        assert_eq!(cookie_domain(""), "");
    }

    #[test]
    fn test_cookie_config_secure() {
        let mut config = GatewayConfig::default();
        config.urls.gateway_url = "https://gateway.example.com".into();
        let cookies = config.cookie_config();
        assert!(cookies.secure);
        assert_eq!(cookies.domain, "gateway.example.com");

        config.urls.gateway_url = "http://localhost".into();
        assert!(!config.cookie_config().secure);
    }

    #[test]
    fn test_minimal_toml() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [backend]
            api_url = "http://api:8080"

            [csrf]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.api_url, "http://api:8080");
        assert_eq!(config.backend.attempts, 2);
        assert!(config.csrf.enabled);
        assert_eq!(config.csrf.redis_url, "localhost:6379");
        assert_eq!(config.listener.bind_address, "0.0.0.0:80");
        assert!(config.listener.compress);
    }
}
