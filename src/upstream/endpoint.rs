//! Backend base URL and path rewriting.

use url::Url;

/// Inbound prefix stripped before a path is sent to the backend.
pub const API_PREFIX: &str = "/api";

/// Scheme, host and port of the backend API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendUrl {
    base: Url,
}

impl BackendUrl {
    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        Url::parse(raw).map(|base| Self { base })
    }

    pub fn as_url(&self) -> &Url {
        &self.base
    }

    /// Target URL for a backend path. The base URL's own path and query are
    /// replaced; `path` and `query` are expected to be percent-encoded
    /// already and are kept as they are.
    pub fn endpoint(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url.set_query(query.filter(|q| !q.is_empty()));
        url.set_fragment(None);
        url
    }

    /// Target URL for an inbound gateway path (`/api` prefix stripped).
    pub fn rewrite(&self, inbound_path: &str, query: Option<&str>) -> Url {
        let path = inbound_path.strip_prefix(API_PREFIX).unwrap_or(inbound_path);
        self.endpoint(path, query)
    }
}
