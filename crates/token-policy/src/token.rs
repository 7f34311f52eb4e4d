use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Why a capability token was rejected.
///
/// The `Display` text is the message returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    TokenInvalid,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Token has missing required claim {0}")]
    MissingClaim(&'static str),
}

/// The capability encoded in a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Expiry, in seconds since the Unix epoch.
    pub exp: i64,
    /// The single HTTP method the bearer may use.
    pub verb: String,
    /// Path template the request path must match after the server prefix.
    pub path: String,
    /// Ordered origin prefixes the target URL may start with.
    pub servers: Vec<String>,
}

/// Payload as it appears on the wire. Every claim is optional here so that
/// absence can be reported by name instead of as a decode failure.
#[derive(Debug, Deserialize)]
struct RawClaims {
    exp: Option<i64>,
    verb: Option<String>,
    path: Option<String>,
    servers: Option<Vec<String>>,
}

/// Verifies capability tokens against a pinned RSA public key.
///
/// The signing algorithm is fixed to RS512; tokens whose header names any
/// other algorithm are rejected as invalid.
#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl TokenValidator {
    pub fn new(key: DecodingKey) -> Self {
        let mut validation = Validation::new(Algorithm::RS512);
        // Expiry and claim presence are checked below, in a fixed order and
        // with zero leeway.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims::<&str>(&[]);
        Self { key, validation }
    }

    /// Validate `token` against the current wall clock.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate_at(token, chrono::Utc::now().timestamp())
    }

    /// Validate `token` as of `now` (seconds since the Unix epoch).
    ///
    /// Order of checks: signature and structure, then expiry (only if `exp`
    /// is present), then presence of `exp`, `verb`, `path`, `servers`.
    pub fn validate_at(&self, token: &str, now: i64) -> Result<Claims, AuthError> {
        let raw = jsonwebtoken::decode::<RawClaims>(token, &self.key, &self.validation)
            .map_err(|err| {
                debug!(error = %err, "token failed verification");
                AuthError::TokenInvalid
            })?
            .claims;

        if let Some(exp) = raw.exp {
            if exp <= now {
                return Err(AuthError::TokenExpired);
            }
        }

        let exp = raw.exp.ok_or(AuthError::MissingClaim("exp"))?;
        let verb = raw.verb.ok_or(AuthError::MissingClaim("verb"))?;
        let path = raw.path.ok_or(AuthError::MissingClaim("path"))?;
        let servers = raw.servers.ok_or(AuthError::MissingClaim("servers"))?;

        Ok(Claims {
            exp,
            verb,
            path,
            servers,
        })
    }
}
