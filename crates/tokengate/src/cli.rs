use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tokengate",
    version,
    about = "Reverse proxy that forwards requests only when a signed capability token allows them"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "TOKENGATE_CONFIG", default_value = "tokengate.yaml")]
    pub config: PathBuf,

    /// Listen address (overrides config file setting)
    #[arg(long, global = true)]
    pub listen: Option<String>,

    /// Listen port, replacing the port of the listen address
    #[arg(long, global = true, env = "PORT")]
    pub port: Option<u16>,

    /// Runtime worker threads (overrides config file setting)
    #[arg(long, global = true, env = "WEB_CONCURRENCY")]
    pub workers: Option<usize>,

    /// Request header carrying the capability token
    #[arg(long, global = true, env = "PROXY_TOKEN_HEADER")]
    pub token_header: Option<String>,

    /// Path to the issuer's RSA public key PEM (overrides config file setting)
    #[arg(long, global = true)]
    pub public_key: Option<PathBuf>,

    /// Inline issuer public key PEM; literal `\n` sequences are accepted
    #[arg(long, global = true, env = "JWT_SIGNING_PUBLIC_KEY", hide_env_values = true)]
    pub public_key_pem: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the proxy (default)
    Serve,
    /// Generate an RSA key pair for signing capability tokens
    Keygen(KeygenArgs),
}

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Modulus size in bits
    #[arg(long, default_value_t = 2048, value_parser = clap::value_parser!(u16).range(2048..=8192))]
    pub bits: u16,

    /// Directory the PEM files are written to
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Overwrite existing key files
    #[arg(long)]
    pub force: bool,
}
