mod cli;
mod config;
mod keygen;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use http::HeaderName;
use tracing::{info, warn};

use http_proxy::{ForwarderOptions, Proxy, ProxyConfig};
use token_policy::{loader, DecodingKey, TokenValidator};

use crate::cli::{Cli, Command};
use crate::config::Config;

fn main() -> Result<()> {
    // 1. Pick up a local .env before clap reads its env fallbacks.
    let dotenv_path = dotenv::dotenv().ok();

    // 2. Parse CLI args.
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Keygen(ref args)) => {
            init_tracing("info");
            keygen::run(args)
        }
        Some(Command::Serve) | None => serve(&cli, dotenv_path),
    }
}

fn serve(cli: &Cli, dotenv_path: Option<std::path::PathBuf>) -> Result<()> {
    // 3. Load config, then merge CLI overrides.
    let loaded = config::load(&cli.config)?;
    let config_found = loaded.is_some();
    let mut cfg = loaded.unwrap_or_default();
    apply_overrides(&mut cfg, cli);

    // 4. Init tracing-subscriber with JSON format.
    init_tracing(&cfg.logging.level);

    if !config_found {
        warn!(
            path = %cli.config.display(),
            "configuration file not found; using defaults"
        );
    }
    if let Some(path) = dotenv_path {
        info!(path = %path.display(), "loaded environment file");
    }

    // 5. Validate settings and load the pinned key.
    let listen_addr = listen_addr(&cfg, cli.port)?;
    let token_header = HeaderName::try_from(cfg.auth.token_header.as_str())
        .with_context(|| format!("invalid token header name '{}'", cfg.auth.token_header))?;
    ensure!(cfg.server.workers > 0, "server.workers must be at least 1");
    let key = load_key(&cfg, cli.public_key_pem.as_deref())?;

    info!(
        config_file = %cli.config.display(),
        listen = %listen_addr,
        workers = cfg.server.workers,
        token_header = %token_header,
        decompress_gzip = cfg.upstream.decompress_gzip,
        max_decoded_bytes = cfg.upstream.max_decoded_bytes,
        "tokengate starting"
    );

    let proxy = Proxy::new(ProxyConfig {
        listen_addr,
        token_header,
        validator: TokenValidator::new(key),
        forwarder: ForwarderOptions {
            timeout: cfg.upstream.timeout_secs.map(Duration::from_secs),
            decompress_gzip: cfg.upstream.decompress_gzip,
            max_decoded_bytes: cfg.upstream.max_decoded_bytes,
        },
        max_body_bytes: cfg.server.max_body_bytes,
    })
    .context("failed to initialize proxy")?;

    // 6. Build the runtime and serve until ctrl-c / SIGTERM.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cfg.server.workers)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(proxy.run(shutdown_signal()))?;

    info!("tokengate shutting down");
    Ok(())
}

fn apply_overrides(cfg: &mut Config, cli: &Cli) {
    if let Some(ref listen) = cli.listen {
        cfg.server.listen_addr = listen.clone();
    }
    if let Some(workers) = cli.workers {
        cfg.server.workers = workers;
    }
    if let Some(ref header) = cli.token_header {
        cfg.auth.token_header = header.clone();
    }
    if let Some(ref path) = cli.public_key {
        cfg.auth.public_key_path = Some(path.clone());
    }
}

fn listen_addr(cfg: &Config, port: Option<u16>) -> Result<SocketAddr> {
    let mut addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address '{}'", cfg.server.listen_addr))?;
    if let Some(port) = port {
        addr.set_port(port);
    }
    Ok(addr)
}

/// An inline PEM (from `JWT_SIGNING_PUBLIC_KEY`) wins over a key file.
fn load_key(cfg: &Config, inline_pem: Option<&str>) -> Result<DecodingKey> {
    if let Some(pem) = inline_pem.filter(|pem| !pem.trim().is_empty()) {
        info!("using issuer public key from JWT_SIGNING_PUBLIC_KEY");
        return loader::public_key_from_pem(pem)
            .context("JWT_SIGNING_PUBLIC_KEY does not hold a usable public key");
    }
    if let Some(ref path) = cfg.auth.public_key_path {
        info!(path = %path.display(), "using issuer public key file");
        return loader::load_public_key(path);
    }
    bail!("no issuer public key configured: set JWT_SIGNING_PUBLIC_KEY, --public-key or auth.public_key_path")
}

fn init_tracing(default_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Resolves on the first ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT (ctrl-c)"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler; waiting for ctrl-c only");
                ctrl_c.await.ok();
                info!("received SIGINT (ctrl-c)");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT (ctrl-c)");
    }
}
