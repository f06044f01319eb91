//! Configuration loading from disk and environment.
//!
//! Order: defaults → optional TOML file → environment variables → validation.
//! An empty environment variable counts as unset.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Load the config file (if any), apply process environment overrides and validate.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_file(path)?,
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.listener.bind_address = normalize_bind_address(&config.listener.bind_address);

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn parse_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Override config values from environment variables read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
    let flag = |key: &str| var(key).map(|v| v == "true");

    if let Some(v) = var("GATEWAY_ADDRESS") {
        config.listener.bind_address = v;
    }
    if let Some(v) = flag("GATEWAY_COMPRESS") {
        config.listener.compress = v;
    }
    if let Some(v) = flag("DEBUG_HTTP") {
        config.backend.debug_http = v;
    }
    if let Some(v) = var("CAPTCHA_SECRET") {
        config.captcha.secret = v;
    }
    if let Some(v) = var("API_URL") {
        config.backend.api_url = v;
    }
    if let Some(v) = var("GATEWAY_URL") {
        config.urls.gateway_url = v;
    }
    if let Some(v) = var("WEBSITE_URL") {
        config.urls.website_url = v;
    }
    if let Some(v) = var("WEBAPP_URL") {
        config.urls.webapp_url = v;
    }
    if let Some(v) = flag("HTTPS_ENABLED") {
        config.listener.tls.enabled = v;
    }
    if let Some(v) = var("HTTPS_KEY") {
        config.listener.tls.key_path = v;
    }
    if let Some(v) = var("HTTPS_CRT") {
        config.listener.tls.cert_path = v;
    }
    if let Some(v) = var("CORS_ALLOWED_ORIGINS") {
        config.cors.allowed_origins = parse_origins(&v);
    }
    if let Some(v) = flag("CSRF_ENABLED") {
        config.csrf.enabled = v;
    }
    if let Some(v) = var("REDIS_CONNECTION") {
        config.csrf.redis_url = v;
    }
}

/// Comma separated origins, lowercased, blanks dropped.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().to_lowercase())
        .filter(|o| !o.is_empty())
        .collect()
}

/// `:80` → `0.0.0.0:80`.
pub fn normalize_bind_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{}", address)
    } else {
        address.to_string()
    }
}
