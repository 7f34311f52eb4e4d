use std::path::Path;

use anyhow::{bail, Context, Result};
use jsonwebtoken::DecodingKey;

/// Load the token-verification key from a PEM file on disk.
pub fn load_public_key(path: impl AsRef<Path>) -> Result<DecodingKey> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read public key file: {}", path.display()))?;
    public_key_from_pem(&contents)
        .with_context(|| format!("failed to parse public key file: {}", path.display()))
}

/// Parse an RSA public key from PEM text.
///
/// Accepts both SPKI (`BEGIN PUBLIC KEY`) and PKCS#1 (`BEGIN RSA PUBLIC KEY`)
/// encodings. Literal `\n` sequences are turned into newlines first, which is
/// how a multi-line PEM usually survives a single-line environment variable.
pub fn public_key_from_pem(pem: &str) -> Result<DecodingKey> {
    let pem = unescape_newlines(pem);
    let pem = pem.trim();
    if pem.is_empty() {
        bail!("public key PEM is empty");
    }
    DecodingKey::from_rsa_pem(pem.as_bytes()).context("not a valid RSA public key PEM")
}

fn unescape_newlines(value: &str) -> String {
    value.replace("\\n", "\n")
}
