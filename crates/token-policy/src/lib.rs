//! # token-policy
//!
//! Authorization core for the tokengate proxy. This crate verifies signed
//! capability tokens against a pinned RSA public key and decides whether an
//! incoming request (method + target URL) is within the capability the token
//! grants.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use token_policy::{authorize, loader, TokenValidator};
//!
//! let key = loader::load_public_key("jwt_signing_public.pem").unwrap();
//! let validator = TokenValidator::new(key);
//! let claims = validator.validate("eyJ...").unwrap();
//! let decision = authorize(&claims, "GET", "https://api.example.com/v1/ping");
//! println!("{:?}", decision);
//! ```

mod decision;
mod evaluator;
pub mod loader;
pub mod matcher;
mod token;

// Re-export primary public API at crate root.
pub use decision::AuthorizationDecision;
pub use evaluator::authorize;
pub use matcher::PathPattern;
pub use token::{AuthError, Claims, TokenValidator};

// Key type accepted by `TokenValidator::new`.
pub use jsonwebtoken::DecodingKey;
