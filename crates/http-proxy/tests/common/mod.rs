//! Shared harness for the proxy integration tests: a mock upstream origin,
//! token minting with the checked-in test keys, and a proxy router builder.

#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::{Body, Bytes};
use axum::extract::Path;
use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderName, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post, put};
use axum::{Json, Router};
use futures_util::stream;
use http_proxy::{ForwarderOptions, Proxy, ProxyConfig, DEFAULT_MAX_BODY_BYTES};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use serde_json::{json, Value};
use token_policy::TokenValidator;
use tokio::net::TcpListener;
use tower::ServiceExt;

const ISSUER_PRIVATE: &[u8] = include_bytes!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../token-policy/testdata/issuer_private.pem"
));
const ISSUER_PUBLIC: &[u8] = include_bytes!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../token-policy/testdata/issuer_public.pem"
));
const ROGUE_PRIVATE: &[u8] = include_bytes!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../token-policy/testdata/rogue_private.pem"
));

pub const TOKEN_HEADER: &str = "x-bump-proxy-token";

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Claims valid for the next hour.
pub fn claims<S: AsRef<str>>(verb: &str, path: &str, servers: &[S]) -> Value {
    let servers: Vec<&str> = servers.iter().map(|s| s.as_ref()).collect();
    json!({
        "exp": now() + 3600,
        "verb": verb,
        "path": path,
        "servers": servers,
    })
}

/// Sign `claims` with the issuer key the proxy trusts.
pub fn mint(claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(ISSUER_PRIVATE).unwrap();
    jsonwebtoken::encode(&Header::new(Algorithm::RS512), claims, &key).unwrap()
}

/// Sign `claims` with a key the proxy does not trust.
pub fn mint_rogue(claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(ROGUE_PRIVATE).unwrap();
    jsonwebtoken::encode(&Header::new(Algorithm::RS512), claims, &key).unwrap()
}

// ---------------------------------------------------------------------------
// Proxy
// ---------------------------------------------------------------------------

pub struct ProxyBuilder {
    token_header: String,
    forwarder: ForwarderOptions,
    max_body_bytes: usize,
}

impl Default for ProxyBuilder {
    fn default() -> Self {
        Self {
            token_header: TOKEN_HEADER.to_string(),
            forwarder: ForwarderOptions::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ProxyBuilder {
    pub fn token_header(mut self, name: &str) -> Self {
        self.token_header = name.to_string();
        self
    }

    pub fn decompress_gzip(mut self) -> Self {
        self.forwarder.decompress_gzip = true;
        self
    }

    pub fn max_decoded_bytes(mut self, limit: usize) -> Self {
        self.forwarder.max_decoded_bytes = limit;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.forwarder.timeout = Some(timeout);
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn build(self) -> Router {
        self.build_proxy().router()
    }

    pub fn build_proxy(self) -> Proxy {
        let key = DecodingKey::from_rsa_pem(ISSUER_PUBLIC).unwrap();
        let config = ProxyConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            token_header: HeaderName::try_from(self.token_header).unwrap(),
            validator: TokenValidator::new(key),
            forwarder: self.forwarder,
            max_body_bytes: self.max_body_bytes,
        };
        Proxy::new(config).unwrap()
    }
}

pub fn proxy() -> Router {
    ProxyBuilder::default().build()
}

/// A proxied response, fully read.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.to_str().unwrap())
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    TestResponse {
        status,
        headers,
        body,
    }
}

/// A request carrying `token` in the default token header.
pub fn request(method: Method, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(TOKEN_HEADER, token)
        .body(Body::empty())
        .unwrap()
}

// ---------------------------------------------------------------------------
// Mock upstream
// ---------------------------------------------------------------------------

/// An axum server on an ephemeral localhost port standing in for a target
/// origin.
pub struct MockUpstream {
    addr: SocketAddr,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, upstream_router()).await.unwrap();
        });
        Self { addr }
    }

    /// The server entry a token lists to reach this upstream.
    pub fn server(&self) -> String {
        format!("http://127.0.0.1:{}", self.addr.port())
    }

    pub fn host(&self) -> String {
        format!("127.0.0.1:{}", self.addr.port())
    }

    /// The proxy request path targeting `path` on this upstream.
    pub fn proxy_path(&self, path: &str) -> String {
        format!("/http:/127.0.0.1:{}{}", self.addr.port(), path)
    }
}

/// A localhost port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn upstream_router() -> Router {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", put(update_post))
        .route("/echo", any(echo))
        .route("/cookies", get(cookies))
        .route("/stream", get(chunked))
        .route("/gzip", get(gzipped))
        .route("/redirect", get(redirect))
        .route("/cors", get(upstream_cors))
        .route("/slow", get(slow))
        .route("/teapot", post(teapot))
}

async fn list_posts() -> Json<Value> {
    Json(json!([{ "id": 1, "title": "foo", "body": "bar", "userId": 1 }]))
}

async fn create_post(Json(post): Json<Value>) -> impl IntoResponse {
    (StatusCode::CREATED, Json(post))
}

async fn update_post(Path(id): Path<u64>, Json(mut post): Json<Value>) -> Json<Value> {
    post["id"] = json!(id);
    Json(post)
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let headers: serde_json::Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();
    Json(json!({
        "method": method.as_str(),
        "uri": uri.to_string(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn cookies() -> Response {
    Response::builder()
        .header(SET_COOKIE, "session=abc; HttpOnly")
        .header(SET_COOKIE, "theme=dark")
        .header("x-upstream", "mock")
        .header(CONTENT_TYPE, "text/plain")
        .body(Body::from("cookies"))
        .unwrap()
}

async fn chunked() -> Response {
    let chunks = vec![
        Ok::<_, std::io::Error>(Bytes::from_static(b"hello ")),
        Ok(Bytes::from_static(b"world")),
    ];
    Response::builder()
        .header(CONTENT_TYPE, "text/plain")
        .body(Body::from_stream(stream::iter(chunks)))
        .unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub const GZIP_PAYLOAD: &[u8] = br#"{"compressed":true}"#;

async fn gzipped() -> Response {
    Response::builder()
        .header(CONTENT_TYPE, "application/json")
        .header(CONTENT_ENCODING, "gzip")
        .body(Body::from(gzip(GZIP_PAYLOAD)))
        .unwrap()
}

async fn redirect() -> Response {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(LOCATION, "/posts")
        .body(Body::empty())
        .unwrap()
}

async fn upstream_cors() -> Response {
    Response::builder()
        .header("access-control-allow-origin", "https://upstream.example")
        .body(Body::from("ok"))
        .unwrap()
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "late"
}

async fn teapot() -> impl IntoResponse {
    (StatusCode::IM_A_TEAPOT, Json(json!({ "error": "short and stout" })))
}
