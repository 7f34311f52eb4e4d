use std::io::{self, Read};
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::headers;

/// Failures while building, sending, or reading an upstream request.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid target URL '{url}': {source}")]
    InvalidTarget {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported target scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("target URL has no host: {0}")]
    MissingHost(String),

    #[error("invalid target host '{0}'")]
    InvalidHost(String),

    /// DNS, connect, TLS, timeout or body-read failure, with the full cause
    /// chain flattened into one message.
    #[error("{0}")]
    Transport(String),

    #[error("failed to decompress upstream body: {0}")]
    Decompress(#[from] io::Error),
}

/// Largest body `gzip` decoding may produce unless configured otherwise.
pub const DEFAULT_MAX_DECODED_BYTES: usize = 10 * 1024 * 1024;

/// Tunables for the upstream HTTP client.
#[derive(Debug, Clone)]
pub struct ForwarderOptions {
    /// Overall per-request deadline for the upstream call. `None` waits
    /// indefinitely.
    pub timeout: Option<Duration>,
    /// Decode `Content-Encoding: gzip` bodies before relaying them.
    pub decompress_gzip: bool,
    /// Decoding fails once the decompressed body would exceed this size.
    pub max_decoded_bytes: usize,
}

impl Default for ForwarderOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            decompress_gzip: false,
            max_decoded_bytes: DEFAULT_MAX_DECODED_BYTES,
        }
    }
}

/// A fully materialized upstream response, headers already filtered for the
/// client.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Sends authorized requests to their target origin and reads the reply in
/// full.
///
/// Connections go straight to the target (environment proxy settings are
/// ignored). Redirects are relayed rather than followed, idle connections
/// are not kept, and failed requests are never retried.
#[derive(Debug, Clone)]
pub struct RequestForwarder {
    client: reqwest::Client,
    token_header: HeaderName,
    decompress_gzip: bool,
    max_decoded_bytes: usize,
}

impl RequestForwarder {
    pub fn new(token_header: HeaderName, options: ForwarderOptions) -> reqwest::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(0)
            .no_proxy();
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            token_header,
            decompress_gzip: options.decompress_gzip,
            max_decoded_bytes: options.max_decoded_bytes,
        })
    }

    /// Forward one request to `url`, which must be the same URL the request
    /// was authorized against.
    ///
    /// A body is attached only for methods other than GET/HEAD/OPTIONS and
    /// only when the client sent a `Content-Type`. `Content-Length` and
    /// `Transfer-Encoding` are left to the client library, which derives them
    /// from the materialized body.
    pub async fn forward(
        &self,
        method: Method,
        url: Url,
        client_headers: &HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse, ForwardError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ForwardError::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = host_header_value(&url)?;
        let mut upstream_headers =
            headers::forward_to_upstream(client_headers, &self.token_header, host);
        upstream_headers.remove(CONTENT_LENGTH);
        upstream_headers.remove(TRANSFER_ENCODING);

        let attach_body = carries_body(&method) && client_headers.contains_key(CONTENT_TYPE);
        debug!(%method, %url, attach_body, "sending upstream request");

        let mut request = self
            .client
            .request(method, url)
            .headers(upstream_headers);
        if attach_body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let mut headers = headers::forward_to_client(response.headers());
        let mut body = response.bytes().await.map_err(transport_error)?;

        if self.decompress_gzip && is_gzip_only(&headers) {
            body = gunzip(&body, self.max_decoded_bytes)?;
            headers.remove(CONTENT_ENCODING);
            headers.remove(CONTENT_LENGTH);
        }

        debug!(%status, body_len = body.len(), "upstream response read");
        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

fn carries_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// `host` or `host:port`; the port is present only when the URL names a
/// non-default one.
fn host_header_value(url: &Url) -> Result<HeaderValue, ForwardError> {
    let host = url
        .host_str()
        .ok_or_else(|| ForwardError::MissingHost(url.to_string()))?;
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    HeaderValue::from_str(&host).map_err(|_| ForwardError::InvalidHost(host))
}

fn is_gzip_only(headers: &HeaderMap) -> bool {
    let mut encodings = headers.get_all(CONTENT_ENCODING).iter();
    match (encodings.next(), encodings.next()) {
        (Some(value), None) => value
            .to_str()
            .is_ok_and(|v| v.trim().eq_ignore_ascii_case("gzip")),
        _ => false,
    }
}

/// Decode a gzip body, failing once the output passes `limit` bytes.
fn gunzip(body: &[u8], limit: usize) -> Result<Bytes, io::Error> {
    let mut decoded = Vec::with_capacity(body.len().saturating_mul(2).min(limit));
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    flate2::read::MultiGzDecoder::new(body)
        .take(cap)
        .read_to_end(&mut decoded)?;
    if decoded.len() > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("decoded body exceeds {limit} bytes"),
        ));
    }
    Ok(Bytes::from(decoded))
}

fn transport_error(err: reqwest::Error) -> ForwardError {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    ForwardError::Transport(message)
}
