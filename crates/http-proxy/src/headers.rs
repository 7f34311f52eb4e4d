use http::header::{HOST, SET_COOKIE, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue};

/// Upstream response headers that never reach the client.
///
/// `Set-Cookie` would hand the target origin's session to the proxy's
/// caller. `Transfer-Encoding` describes framing the proxy has already
/// consumed by reading the body in full.
fn is_client_denied(name: &HeaderName) -> bool {
    *name == SET_COOKIE || *name == TRANSFER_ENCODING
}

/// Build the header set sent to the upstream.
///
/// Every client header is copied except `token_header`, and `Host` is set to
/// `host` whatever the client sent.
pub fn forward_to_upstream(
    headers: &HeaderMap,
    token_header: &HeaderName,
    host: HeaderValue,
) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if name == token_header || *name == HOST {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out.insert(HOST, host);
    out
}

/// Build the header set relayed back to the client from the upstream
/// response.
pub fn forward_to_client(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_client_denied(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
