//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, attempts > 0)
//! - Check that enabled features have what they need (TLS files, Redis)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("API_URL `{0}` is not an absolute http(s) URL")]
    InvalidApiUrl(String),

    #[error("bind address `{0}` is not a socket address")]
    InvalidBindAddress(String),

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("TLS is enabled but {0} is empty")]
    MissingTlsPath(&'static str),

    #[error("CSRF is enabled but the Redis connection is empty")]
    MissingRedis,

    #[error("metrics address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let api_url_ok = Url::parse(&config.backend.api_url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false);
    if !api_url_ok {
        errors.push(ValidationError::InvalidApiUrl(config.backend.api_url.clone()));
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.listener.bind_address.clone()));
    }

    let positive = [
        ("backend.connect_timeout_secs", config.backend.connect_timeout_secs),
        ("backend.request_timeout_secs", config.backend.request_timeout_secs),
        ("backend.attempts", u64::from(config.backend.attempts)),
        ("csrf.store_timeout_ms", config.csrf.store_timeout_ms),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ];
    for (name, value) in positive {
        if value == 0 {
            errors.push(ValidationError::NotPositive(name));
        }
    }

    let tls = &config.listener.tls;
    if tls.enabled {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::MissingTlsPath("HTTPS_CRT"));
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::MissingTlsPath("HTTPS_KEY"));
        }
    }

    if config.csrf.enabled && config.csrf.redis_url.trim().is_empty() {
        errors.push(ValidationError::MissingRedis);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.backend.api_url = "http://api.local:8080".into();
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid();
        config.backend.api_url = "api.local".into();
        config.backend.request_timeout_secs = 0;
        config.listener.tls.enabled = true;
        config.csrf.enabled = true;
        config.csrf.redis_url = String::new();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidApiUrl("api.local".into()),
                ValidationError::NotPositive("backend.request_timeout_secs"),
                ValidationError::MissingTlsPath("HTTPS_CRT"),
                ValidationError::MissingTlsPath("HTTPS_KEY"),
                ValidationError::MissingRedis,
            ]
        );
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let mut config = valid();
        config.backend.api_url = "ftp://api.local".into();
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::InvalidApiUrl("ftp://api.local".into())]
        );
    }
}
