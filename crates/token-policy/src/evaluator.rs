use tracing::{debug, trace};

use crate::decision::AuthorizationDecision;
use crate::matcher::PathPattern;
use crate::token::Claims;

/// Decide whether a request falls within the capability described by
/// `claims`.
///
/// Checks run in a fixed order and the first failure wins:
///
/// 1. `method` must equal `claims.verb` exactly.
/// 2. Some entry of `claims.servers` (first in listed order) must be a string
///    prefix of `target_url`, ignoring one trailing `/` on the entry.
/// 3. What remains of `target_url` after that prefix must match the
///    `claims.path` template.
///
/// Server matching is a plain string prefix, not an origin comparison:
/// `https://good.com` also admits `https://good.com.evil.com/...`. Issuers
/// should end entries with a path (or list more specific entries first).
pub fn authorize(claims: &Claims, method: &str, target_url: &str) -> AuthorizationDecision {
    debug!(method, target_url, "authorizing request against token claims");

    if claims.verb != method {
        trace!(verb = claims.verb, method, "verb mismatch");
        return AuthorizationDecision::DeniedMethod;
    }

    let Some((server, remainder)) = match_server(&claims.servers, target_url) else {
        trace!(servers = ?claims.servers, "no server prefix matched");
        return AuthorizationDecision::DeniedServer;
    };

    if !PathPattern::parse(&claims.path).matches(remainder) {
        trace!(pattern = claims.path, remainder, "path pattern did not match");
        return AuthorizationDecision::DeniedPath;
    }

    AuthorizationDecision::Allowed {
        server: server.to_string(),
    }
}

/// Find the first server entry prefixing `target_url`.
///
/// Returns the entry as listed together with the rest of the URL after the
/// (trailing-slash-trimmed) entry.
fn match_server<'a, 'u>(servers: &'a [String], target_url: &'u str) -> Option<(&'a str, &'u str)> {
    servers.iter().find_map(|server| {
        let prefix = server.strip_suffix('/').unwrap_or(server.as_str());
        target_url
            .strip_prefix(prefix)
            .map(|remainder| (server.as_str(), remainder))
    })
}
