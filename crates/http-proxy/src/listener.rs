use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use token_policy::{authorize, AuthError, TokenValidator};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::ProxyError;
use crate::forwarder::{ForwarderOptions, RequestForwarder};
use crate::target::{authorization_subject, TargetUrl};

/// Header carrying the capability token unless configured otherwise.
pub const DEFAULT_TOKEN_HEADER: &str = "x-bump-proxy-token";

/// Request bodies above this size are refused before authorization.
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const ALLOWED_METHODS: &str = "OPTIONS, GET, POST, PUT, PATCH, DELETE";

/// Configuration for the HTTP reverse proxy.
pub struct ProxyConfig {
    /// Address to bind the listening socket to.
    pub listen_addr: SocketAddr,
    /// Request header that carries the capability token. Never forwarded.
    pub token_header: HeaderName,
    /// Validator bound to the pinned issuer key.
    pub validator: TokenValidator,
    pub forwarder: ForwarderOptions,
    pub max_body_bytes: usize,
}

/// Immutable state shared by every request handler.
struct ProxyState {
    token_header: HeaderName,
    validator: TokenValidator,
    forwarder: RequestForwarder,
}

/// The capability-gated reverse proxy server.
///
/// Every request names its upstream in the path (`/https:/host/path`),
/// presents a signed token in the token header, and is forwarded only when
/// the token's claims cover the method, server and path.
pub struct Proxy {
    listen_addr: SocketAddr,
    max_body_bytes: usize,
    allow_headers: HeaderValue,
    state: Arc<ProxyState>,
}

impl Proxy {
    pub fn new(config: ProxyConfig) -> anyhow::Result<Self> {
        let forwarder = RequestForwarder::new(config.token_header.clone(), config.forwarder)
            .context("failed to build upstream HTTP client")?;
        let allow_headers = HeaderValue::from_str(&format!(
            "Content-Type, Authorization, {}, x-requested-with",
            config.token_header
        ))
        .context("token header name is not a valid header value")?;

        Ok(Self {
            listen_addr: config.listen_addr,
            max_body_bytes: config.max_body_bytes,
            allow_headers,
            state: Arc::new(ProxyState {
                token_header: config.token_header,
                validator: config.validator,
                forwarder,
            }),
        })
    }

    /// Build the axum router serving every path.
    ///
    /// CORS headers are set on every response, overriding any the upstream
    /// sent.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", any(handle_request))
            .route("/{*target}", any(handle_request))
            .with_state(Arc::clone(&self.state))
            .layer(DefaultBodyLimit::max(self.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .layer(SetResponseHeaderLayer::overriding(
                ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOWED_METHODS),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                ACCESS_CONTROL_ALLOW_HEADERS,
                self.allow_headers.clone(),
            ))
    }

    /// Bind `listen_addr` and serve until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.listen_addr))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    /// In-flight requests are allowed to finish.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, token_header = %self.state.token_header, "http-proxy listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context("proxy server terminated with an error")?;

        tracing::info!("http-proxy stopped");
        Ok(())
    }
}

async fn handle_request(
    State(state): State<Arc<ProxyState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method == Method::OPTIONS {
        return Response::new(Body::empty());
    }

    let request_id = Uuid::new_v4();
    let target = TargetUrl::from_uri(&uri);

    match proxy_request(&state, request_id, method.clone(), &target, &headers, body).await {
        Ok(response) => response,
        Err(err) => {
            match &err {
                ProxyError::Upstream(source) => {
                    tracing::error!(%request_id, %method, %target, error = %source, "upstream request failed");
                }
                other => {
                    tracing::warn!(%request_id, %method, %target, status = %other.status(), reason = %other, "request rejected");
                }
            }
            err.into_response()
        }
    }
}

/// Authenticate, authorize and forward one request.
async fn proxy_request(
    state: &ProxyState,
    request_id: Uuid,
    method: Method,
    target: &TargetUrl,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    if !is_supported(&method) {
        return Err(ProxyError::UnsupportedMethod);
    }

    let token = headers
        .get(&state.token_header)
        .ok_or_else(|| ProxyError::MissingToken(state.token_header.to_string()))?
        .to_str()
        .map_err(|_| AuthError::TokenInvalid)?;

    let claims = state.validator.validate(token)?;

    let url = target.parse()?;
    let decision = authorize(&claims, authorization_verb(&method), authorization_subject(&url));
    if !decision.is_allowed() {
        return Err(ProxyError::Forbidden(decision));
    }

    let upstream = state
        .forwarder
        .forward(method.clone(), url, headers, body)
        .await?;

    tracing::info!(
        %request_id,
        %method,
        %target,
        status = upstream.status.as_u16(),
        bytes = upstream.body.len(),
        "request forwarded"
    );

    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = upstream.headers;
    Ok(response)
}

fn is_supported(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// The verb a token must name. HEAD is forwarded as HEAD but needs a GET
/// capability.
fn authorization_verb(method: &Method) -> &str {
    if *method == Method::HEAD {
        "GET"
    } else {
        method.as_str()
    }
}
