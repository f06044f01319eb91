//! Cookie codec for session and CSRF cookies.
//!
//! # Responsibilities
//! - Read the access/refresh token pair and the CSRF token from `Cookie`
//! - Write them back as `Set-Cookie` with fixed attributes
//! - Emit deletion cookies when a session is logged out
//!
//! # Design Decisions
//! - Both auth cookies expire with the refresh token, so the pair always
//!   lives and dies together with the refresh cycle
//! - Writing a cookie replaces an earlier `Set-Cookie` of the same name in
//!   the same response (a refreshed token overrides the stale one)
//! - Attributes are rendered by hand; there is no cookie jar on the server

use std::time::Duration;

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::auth::tokens::Auth;

pub const ACCESS_TOKEN_COOKIE: &str = "cshtrka";
pub const REFRESH_TOKEN_COOKIE: &str = "cshtrkr";
pub const CSRF_TOKEN_COOKIE: &str = "cshtrkcsrf";

/// Lifetime of an issued CSRF cookie (and of its stored token).
pub const CSRF_TOKEN_TTL: Duration = Duration::from_secs(10 * 60);

/// Expiry used for deletion cookies.
const EXPIRED: &str = "Tue, 10 Nov 2009 23:00:00 GMT";

const HTTP_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Attributes shared by every cookie the gateway writes.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// `Domain` attribute; omitted when empty.
    pub domain: String,

    /// Adds the `Secure` attribute.
    pub secure: bool,

    /// Lifetime of the CSRF cookie.
    pub csrf_ttl: Duration,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            secure: false,
            csrf_ttl: CSRF_TOKEN_TTL,
        }
    }
}

/// CSRF token cookie together with the session it was issued under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsrfCookie {
    pub token: String,
    pub auth: Auth,
}

enum Expiry {
    Session,
    At(OffsetDateTime),
    Delete,
}

/// Reads and writes gateway cookies.
#[derive(Debug, Clone)]
pub struct CookieCodec {
    config: CookieConfig,
}

impl CookieCodec {
    pub fn new(config: CookieConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CookieConfig {
        &self.config
    }

    /// Read the token pair. Missing cookies yield empty tokens.
    pub fn read_auth(&self, headers: &HeaderMap) -> Auth {
        Auth::new(
            get_cookie(headers, ACCESS_TOKEN_COOKIE).unwrap_or_default(),
            get_cookie(headers, REFRESH_TOKEN_COOKIE).unwrap_or_default(),
        )
    }

    /// Write the token pair, or two deletion cookies when logged out.
    pub fn write_auth(&self, auth: &Auth, headers: &mut HeaderMap) {
        if !auth.is_logged() {
            self.write(headers, ACCESS_TOKEN_COOKIE, "", Expiry::Delete);
            self.write(headers, REFRESH_TOKEN_COOKIE, "", Expiry::Delete);
            return;
        }

        let expiry = || match auth.refresh_expiry() {
            Some(at) => Expiry::At(at),
            None => Expiry::Session,
        };
        self.write(headers, ACCESS_TOKEN_COOKIE, &auth.access_token, expiry());
        self.write(headers, REFRESH_TOKEN_COOKIE, &auth.refresh_token, expiry());
    }

    pub fn read_csrf(&self, headers: &HeaderMap) -> CsrfCookie {
        CsrfCookie {
            token: get_cookie(headers, CSRF_TOKEN_COOKIE).unwrap_or_default(),
            auth: self.read_auth(headers),
        }
    }

    /// Write the CSRF cookie, or a deletion cookie when the owning session
    /// is logged out.
    pub fn write_csrf(&self, csrf: &CsrfCookie, headers: &mut HeaderMap) {
        if !csrf.auth.is_logged() {
            self.write(headers, CSRF_TOKEN_COOKIE, "", Expiry::Delete);
            return;
        }
        let at = OffsetDateTime::now_utc() + self.config.csrf_ttl;
        self.write(headers, CSRF_TOKEN_COOKIE, &csrf.token, Expiry::At(at));
    }

    fn write(&self, headers: &mut HeaderMap, name: &str, value: &str, expiry: Expiry) {
        let rendered = self.render(name, value, expiry);
        match HeaderValue::from_str(&rendered) {
            Ok(header) => set_cookie(headers, name, header),
            Err(_) => tracing::warn!(cookie = name, "Cookie value is not a valid header value"),
        }
    }

    fn render(&self, name: &str, value: &str, expiry: Expiry) -> String {
        let mut out = format!("{}={}; Path=/", name, value);
        if !self.config.domain.is_empty() {
            out.push_str("; Domain=");
            out.push_str(&self.config.domain);
        }
        match expiry {
            Expiry::Session => {}
            Expiry::At(at) => {
                if let Ok(date) = at.to_offset(UtcOffset::UTC).format(HTTP_DATE) {
                    out.push_str("; Expires=");
                    out.push_str(&date);
                }
            }
            Expiry::Delete => {
                out.push_str("; Expires=");
                out.push_str(EXPIRED);
                out.push_str("; Max-Age=0");
            }
        }
        out.push_str("; HttpOnly");
        if self.config.secure {
            out.push_str("; Secure");
        }
        out.push_str("; SameSite=Strict");
        out
    }
}

/// Find a cookie value across every `Cookie` header of a request.
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Append a `Set-Cookie` header, dropping any earlier one for `name`.
pub fn set_cookie(headers: &mut HeaderMap, name: &str, value: HeaderValue) {
    let prefix = format!("{}=", name);
    let kept: Vec<HeaderValue> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter(|existing| !existing.as_bytes().starts_with(prefix.as_bytes()))
        .cloned()
        .collect();

    headers.remove(SET_COOKIE);
    for existing in kept {
        headers.append(SET_COOKIE, existing);
    }
    headers.append(SET_COOKIE, value);
}
