//! Google reCAPTCHA `siteverify` client.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::header::CONTENT_TYPE;
use serde::Deserialize;

use crate::captcha::{CaptchaError, CaptchaProvider};
use crate::http::request::InboundRequest;
use crate::upstream::headers::X_CT_CAPTCHA_CHALLENGE;

pub const GOOGLE_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";
pub const GOOGLE_VERIFY_TIMEOUT: Duration = Duration::from_secs(1);

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VerifyResponse {
    success: bool,
    challenge_ts: String,
    hostname: String,
    score: f32,
    action: String,
    #[serde(rename = "error-codes")]
    error_codes: Vec<String>,
}

pub struct GoogleReCaptchaProvider {
    client: reqwest::Client,
    secret: String,
    verify_url: String,
}

impl GoogleReCaptchaProvider {
    pub fn new(secret: impl Into<String>) -> Result<Self, CaptchaError> {
        Self::with_verify_url(secret, GOOGLE_VERIFY_URL)
    }

    pub fn with_verify_url(secret: impl Into<String>, verify_url: impl Into<String>) -> Result<Self, CaptchaError> {
        let client = reqwest::Client::builder()
            .timeout(GOOGLE_VERIFY_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(|e| CaptchaError::Request(e.to_string()))?;

        Ok(Self {
            client,
            secret: secret.into(),
            verify_url: verify_url.into(),
        })
    }
}

#[async_trait]
impl CaptchaProvider for GoogleReCaptchaProvider {
    async fn verify(&self, request: &InboundRequest) -> Result<bool, CaptchaError> {
        let client_ip = request.client_ip.as_str();

        if self.secret.is_empty() {
            tracing::info!(client_ip, "Captcha secret empty, skipping verify");
            return Ok(true);
        }

        let challenge = request
            .headers
            .get(X_CT_CAPTCHA_CHALLENGE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if challenge.is_empty() {
            tracing::info!(client_ip, "Captcha challenge empty");
            return Ok(false);
        }

        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("secret", &self.secret)
            .append_pair("remoteip", client_ip)
            .append_pair("response", challenge)
            .finish();

        let response = self
            .client
            .post(&self.verify_url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(form)
            .send()
            .await
            .map_err(|e| CaptchaError::Request(e.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| CaptchaError::Request(e.to_string()))?;

        let verdict: VerifyResponse =
            serde_json::from_slice(&body).map_err(|e| CaptchaError::InvalidResponse(e.to_string()))?;

        if !verdict.success {
            tracing::info!(
                client_ip,
                score = verdict.score,
                errors = %verdict.error_codes.join(", "),
                "Captcha verify unsuccessful"
            );
            return Ok(false);
        }

        tracing::info!(
            client_ip,
            score = verdict.score,
            hostname = %verdict.hostname,
            action = %verdict.action,
            challenge_ts = %verdict.challenge_ts,
            "Captcha verify: ok"
        );
        Ok(true)
    }
}
