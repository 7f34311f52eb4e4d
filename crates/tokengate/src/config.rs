use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen_addr: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen(),
            workers: default_workers(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_token_header")]
    pub token_header: String,
    #[serde(default)]
    pub public_key_path: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_header: default_token_header(),
            public_key_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    /// Whole-request deadline for upstream calls. Unset means no deadline.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub decompress_gzip: bool,
    /// Upper bound on a gzip body once decoded.
    #[serde(default = "default_max_decoded_bytes")]
    pub max_decoded_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            decompress_gzip: false,
            max_decoded_bytes: default_max_decoded_bytes(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_listen() -> String {
    "0.0.0.0:4567".to_string()
}

fn default_workers() -> usize {
    2
}

fn default_max_body_bytes() -> usize {
    http_proxy::DEFAULT_MAX_BODY_BYTES
}

fn default_max_decoded_bytes() -> usize {
    http_proxy::DEFAULT_MAX_DECODED_BYTES
}

fn default_token_header() -> String {
    http_proxy::DEFAULT_TOKEN_HEADER.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// Returns `Ok(None)` when the file does not exist so the caller can fall
/// back to defaults and report it once logging is up.
pub fn load(path: &Path) -> anyhow::Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    let config: Config = serde_yml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;

    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.yaml")).unwrap().is_none());
    }

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.server.listen_addr, "0.0.0.0:4567");
        assert_eq!(cfg.server.workers, 2);
        assert_eq!(cfg.auth.token_header, "x-bump-proxy-token");
        assert!(cfg.auth.public_key_path.is_none());
        assert!(cfg.upstream.timeout_secs.is_none());
        assert!(!cfg.upstream.decompress_gzip);
        assert_eq!(cfg.upstream.max_decoded_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn empty_document_uses_defaults() {
        let file = write_config("{}\n");
        let cfg = load(file.path()).unwrap().unwrap();
        assert_eq!(cfg.server.listen_addr, "0.0.0.0:4567");
        assert_eq!(cfg.auth.token_header, "x-bump-proxy-token");
    }

    #[test]
    fn full_document() {
        let file = write_config(
            r#"
server:
  listen_addr: "127.0.0.1:8080"
  workers: 6
  max_body_bytes: 1024
auth:
  token_header: "x-capability"
  public_key_path: "/etc/tokengate/issuer.pem"
upstream:
  timeout_secs: 30
  decompress_gzip: true
  max_decoded_bytes: 2048
logging:
  level: "debug"
"#,
        );
        let cfg = load(file.path()).unwrap().unwrap();
        assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
        assert_eq!(cfg.server.workers, 6);
        assert_eq!(cfg.server.max_body_bytes, 1024);
        assert_eq!(cfg.auth.token_header, "x-capability");
        assert_eq!(
            cfg.auth.public_key_path,
            Some(PathBuf::from("/etc/tokengate/issuer.pem"))
        );
        assert_eq!(cfg.upstream.timeout_secs, Some(30));
        assert!(cfg.upstream.decompress_gzip);
        assert_eq!(cfg.upstream.max_decoded_bytes, 2048);
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn partial_section_fills_remaining_fields() {
        let file = write_config("server:\n  workers: 4\n");
        let cfg = load(file.path()).unwrap().unwrap();
        assert_eq!(cfg.server.workers, 4);
        assert_eq!(cfg.server.listen_addr, "0.0.0.0:4567");
    }

    #[test]
    fn decode_cap_defaults_when_only_gzip_is_enabled() {
        let file = write_config("upstream:\n  decompress_gzip: true\n");
        let cfg = load(file.path()).unwrap().unwrap();
        assert!(cfg.upstream.decompress_gzip);
        assert_eq!(cfg.upstream.max_decoded_bytes, http_proxy::DEFAULT_MAX_DECODED_BYTES);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let file = write_config("server: [unterminated\n");
        let err = load(file.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"));
    }
}
