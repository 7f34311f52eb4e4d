/// The outcome of checking a request against a token's capability claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationDecision {
    /// The request is within scope. `server` is the `servers` entry the
    /// target URL was matched against, as listed in the token.
    Allowed { server: String },
    /// The request method differs from the token's `verb`.
    DeniedMethod,
    /// No `servers` entry is a prefix of the target URL.
    DeniedServer,
    /// The path remainder does not match the token's `path` pattern.
    DeniedPath,
}

impl AuthorizationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Client-facing reason for a denial. `None` when allowed.
    pub fn denial_reason(&self) -> Option<&'static str> {
        match self {
            Self::Allowed { .. } => None,
            Self::DeniedMethod => Some("HTTP method not allowed"),
            Self::DeniedServer => Some("Server not allowed"),
            Self::DeniedPath => Some("Path not allowed"),
        }
    }
}
