//! CAPTCHA verification capability.
//!
//! Login-class handlers ask a [`CaptchaProvider`] whether the request carries
//! a valid challenge answer before anything is sent to the backend.
//!
//! # Design Decisions
//! - `Ok(false)` means "the client failed the challenge" (400), `Err` means the
//!   verification service could not be asked (500)
//! - A provider without a secret answers `Ok(true)` so local setups work
//!   without a CAPTCHA account

pub mod google;

use async_trait::async_trait;
use thiserror::Error;

use crate::http::request::InboundRequest;

pub use google::GoogleReCaptchaProvider;

#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("captcha verify request error: {0}")]
    Request(String),

    #[error("captcha verify response unexpected: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait CaptchaProvider: Send + Sync {
    async fn verify(&self, request: &InboundRequest) -> Result<bool, CaptchaError>;
}

/// Provider with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticCaptchaProvider {
    answer: Option<bool>,
}

impl StaticCaptchaProvider {
    pub fn accept() -> Self {
        Self { answer: Some(true) }
    }

    pub fn reject() -> Self {
        Self { answer: Some(false) }
    }

    /// Always fails as if the verification service were unreachable.
    pub fn unavailable() -> Self {
        Self { answer: None }
    }
}

#[async_trait]
impl CaptchaProvider for StaticCaptchaProvider {
    async fn verify(&self, _request: &InboundRequest) -> Result<bool, CaptchaError> {
        self.answer
            .ok_or_else(|| CaptchaError::Request("verification service unavailable".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, Uri};

    #[tokio::test]
    async fn test_static_provider_answers() {
        let request = InboundRequest::new(Method::POST, Uri::from_static("/auth/login"));
        assert!(StaticCaptchaProvider::accept().verify(&request).await.unwrap());
        assert!(!StaticCaptchaProvider::reject().verify(&request).await.unwrap());
        let err = StaticCaptchaProvider::unavailable().verify(&request).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "captcha verify request error: verification service unavailable"
        );
    }
}
