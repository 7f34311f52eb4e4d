//! Issuer key-pair generation.
//!
//! The private key stays with whatever service mints capability tokens; the
//! public key is what the proxy pins.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use tracing::info;

use crate::cli::KeygenArgs;

pub const PRIVATE_KEY_FILE: &str = "jwt_signing_private.pem";
pub const PUBLIC_KEY_FILE: &str = "jwt_signing_public.pem";

/// Smallest modulus accepted for RS512 verification.
const MIN_BITS: usize = 2048;

pub struct KeyPair {
    /// PKCS#8 `BEGIN PRIVATE KEY` PEM.
    pub private_pem: String,
    /// SubjectPublicKeyInfo `BEGIN PUBLIC KEY` PEM.
    pub public_pem: String,
}

pub fn generate(bits: usize) -> Result<KeyPair> {
    ensure!(bits >= MIN_BITS, "RSA keys must be at least {MIN_BITS} bits");

    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, bits).context("failed to generate RSA key")?;
    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .context("failed to encode private key")?
        .to_string();
    let public_pem = private
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .context("failed to encode public key")?;

    Ok(KeyPair {
        private_pem,
        public_pem,
    })
}

/// A PEM as a single `.env`-friendly line with literal `\n` separators.
pub fn escape_newlines(pem: &str) -> String {
    pem.trim_end().replace('\n', "\\n")
}

/// Write both halves of `pair` into `dir`. Existing files are only replaced
/// when `force` is set.
pub fn write_pair(dir: &Path, pair: &KeyPair, force: bool) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    let private_path = dir.join(PRIVATE_KEY_FILE);
    let public_path = dir.join(PUBLIC_KEY_FILE);
    if !force {
        for path in [&private_path, &public_path] {
            ensure!(
                !path.exists(),
                "{} already exists; pass --force to overwrite",
                path.display()
            );
        }
    }

    write_file(&private_path, &pair.private_pem, 0o600)?;
    write_file(&public_path, &pair.public_pem, 0o644)?;
    Ok((private_path, public_path))
}

fn write_file(path: &Path, contents: &str, mode: u32) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// `tokengate keygen`.
pub fn run(args: &KeygenArgs) -> Result<()> {
    info!(bits = args.bits, out_dir = %args.out_dir.display(), "generating issuer key pair");
    let pair = generate(usize::from(args.bits))?;
    let (private_path, public_path) = write_pair(&args.out_dir, &pair, args.force)?;

    println!("Private key written to {}", private_path.display());
    println!("Public key written to {}", public_path.display());
    println!();
    println!("JWT_SIGNING_PUBLIC_KEY={}", escape_newlines(&pair.public_pem));
    Ok(())
}
