//! Capability-gated HTTP reverse proxy for the tokengate project.
//!
//! Clients name the upstream they want in the request path and present a
//! signed capability token. The proxy verifies the token, checks the request
//! against the token's claims, and only then forwards it and relays the reply.
//!
//! # Architecture
//!
//! ```text
//! Client  --HTTP-->  http-proxy  --HTTP(S)-->  target origin
//!                        |
//!                 [TokenValidator]
//!                   [authorize]
//!                  [HeaderFilter]
//! ```
//!
//! A request for `/https:/api.example.com/v1/ping` targets
//! `https://api.example.com/v1/ping`. The token header is stripped before
//! forwarding, `Host` is rewritten for the target, and `Set-Cookie` and
//! `Transfer-Encoding` are dropped from the upstream response. CORS headers
//! are attached to every response.

pub mod error;
pub mod forwarder;
pub mod headers;
pub mod listener;
pub mod target;

// Re-export the primary public types at the crate root for convenience.
pub use error::ProxyError;
pub use forwarder::{
    ForwardError, ForwarderOptions, RequestForwarder, UpstreamResponse, DEFAULT_MAX_DECODED_BYTES,
};
pub use listener::{Proxy, ProxyConfig, DEFAULT_MAX_BODY_BYTES, DEFAULT_TOKEN_HEADER};
pub use target::TargetUrl;
