use http::Uri;
use url::{Position, Url};

use crate::forwarder::ForwardError;

/// The upstream URL a client asked for, recovered from the proxy's own
/// request path.
///
/// Clients send `/https:/api.example.com/v1/ping` so that intermediaries do
/// not collapse the double slash; the proxy restores `https://...`. The query
/// string of the inbound request is carried over unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUrl {
    url: String,
}

impl TargetUrl {
    /// Reconstitute the target from the inbound request URI.
    pub fn from_uri(uri: &Uri) -> Self {
        let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
        Self::from_path_and_query(path_and_query)
    }

    /// Reconstitute the target from a raw `/path?query` string.
    ///
    /// Only the first `:/` of the path is widened to `://`, and only when the
    /// path does not already contain `://`. Later occurrences in the path and
    /// anything in the query are left exactly as sent, rather than every
    /// `:/` being rewritten.
    pub fn from_path_and_query(path_and_query: &str) -> Self {
        let raw = path_and_query.strip_prefix('/').unwrap_or(path_and_query);
        let (path, query) = match raw.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (raw, None),
        };

        let mut url = if path.contains("://") {
            path.to_string()
        } else {
            path.replacen(":/", "://", 1)
        };
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }

        Self { url }
    }

    /// The target exactly as reconstituted, before any normalization.
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Parse into the URL that is both authorized and forwarded.
    ///
    /// Parsing resolves `.` and `..` segments, percent-encoded ones included,
    /// so the path a token is checked against is the path the upstream
    /// receives.
    pub fn parse(&self) -> Result<Url, ForwardError> {
        Url::parse(&self.url).map_err(|source| ForwardError::InvalidTarget {
            url: self.url.clone(),
            source,
        })
    }
}

impl std::fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

/// `url` up to the end of its path. Authorization never looks at the query.
pub fn authorization_subject(url: &Url) -> &str {
    &url[..Position::AfterPath]
}
