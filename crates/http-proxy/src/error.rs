use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use token_policy::{AuthError, AuthorizationDecision};

use crate::forwarder::ForwardError;

/// Everything that can end an inbound request before an upstream response is
/// relayed. Each variant renders as a JSON `{"error": ...}` body.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0} header is missing")]
    MissingToken(String),

    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error("{}", .0.denial_reason().unwrap_or("Forbidden"))]
    Forbidden(AuthorizationDecision),

    #[error("HTTP method not supported")]
    UnsupportedMethod,

    #[error(transparent)]
    Upstream(#[from] ForwardError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken(_) | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::UnsupportedMethod => StatusCode::METHOD_NOT_ALLOWED,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
