//! Bearer credential pair exchanged with the backend.

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Access/refresh token pair with their expiries.
///
/// This is also the JSON payload returned by the backend on login and
/// refresh. Expiries are kept as the RFC 3339 strings the backend sent and
/// parsed when a cookie needs them; an absent or unparsable expiry yields a
/// session cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Auth {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub access_token: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_expired_at: Option<String>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expired_at: Option<String>,
}

impl Auth {
    /// Build an Auth from bare tokens, without expiries.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            ..Self::default()
        }
    }

    /// A session is logged in when it carries an access token.
    pub fn is_logged(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// A session can be refreshed when it carries a refresh token.
    pub fn can_refresh(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    pub fn access_expiry(&self) -> Option<OffsetDateTime> {
        parse_expiry(self.access_token_expired_at.as_deref())
    }

    pub fn refresh_expiry(&self) -> Option<OffsetDateTime> {
        parse_expiry(self.refresh_token_expired_at.as_deref())
    }
}

fn parse_expiry(raw: Option<&str>) -> Option<OffsetDateTime> {
    raw.filter(|s| !s.is_empty())
        .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logged_and_refreshable_flags() {
        assert!(!Auth::default().is_logged());
        assert!(!Auth::default().can_refresh());

        let partial = Auth::new("", "r1");
        assert!(!partial.is_logged());
        assert!(partial.can_refresh());

        let full = Auth::new("t1", "r1");
        assert!(full.is_logged());
        assert!(full.can_refresh());
    }

    #[test]
    fn test_deserialize_backend_payload() {
        let auth: Auth = serde_json::from_str(
            r#"{"accessToken":"t1","accessTokenExpiredAt":"2030-01-01T10:00:00Z","refreshToken":"r1","refreshTokenExpiredAt":"2030-02-01T10:00:00+02:00"}"#,
        )
        .unwrap();

        assert_eq!(auth.access_token, "t1");
        assert_eq!(auth.refresh_token, "r1");
        assert_eq!(auth.access_expiry().unwrap().year(), 2030);
        let refresh = auth.refresh_expiry().unwrap();
        assert_eq!(refresh.unix_timestamp(), 1896163200);
    }

    #[test]
    fn test_deserialize_partial_payload() {
        let auth: Auth = serde_json::from_str(r#"{"accessToken":"t1","refreshToken":"r1"}"#).unwrap();
        assert_eq!(auth, Auth::new("t1", "r1"));
        assert!(auth.refresh_expiry().is_none());
    }

    #[test]
    fn test_unparsable_expiry_is_none() {
        let auth = Auth {
            refresh_token_expired_at: Some("next tuesday".into()),
            ..Auth::new("t1", "r1")
        };
        assert!(auth.refresh_expiry().is_none());
    }

    #[test]
    fn test_serialize_omits_empty_fields() {
        let json = serde_json::to_string(&Auth::new("t1", "")).unwrap();
        assert_eq!(json, r#"{"accessToken":"t1"}"#);
    }
}
