//! mu: offline tooling for the mu connect client.
//!
//! Encodes and decodes the wire query strings, builds signed REST call URLs,
//! verifies signatures and dissects cross-domain handoff URLs.

mod commands;
mod config;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use mu_core::{MuConfig, Session};

/// mu: connect client tooling
#[derive(Parser)]
#[command(name = "mu", version = "0.1.0", about = "Inspect mu handoff URLs, query strings and signed API calls")]
struct Cli {
    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Application API key (overrides the config file)
    #[arg(short = 'k', long = "api-key", global = true)]
    api_key: Option<String>,

    /// Scheme for the service hosts, e.g. `http:` (overrides the config file)
    #[arg(long = "protocol", global = true)]
    protocol: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode key=value pairs as a sorted query string
    Encode {
        /// Parameters in key=value form
        pairs: Vec<String>,

        /// Unescaped, separator-less form used for signatures
        #[arg(long)]
        raw: bool,
    },

    /// Decode a query string or URL
    Decode {
        /// Query string or full URL
        query: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build a signed REST call URL
    Sign {
        /// Call parameters in key=value form
        pairs: Vec<String>,

        /// Sign with an explicit secret
        #[arg(short, long)]
        secret: Option<String>,

        /// Sign with a session (requires --session-secret)
        #[arg(long, requires = "session_secret")]
        session_key: Option<String>,

        /// Secret of the session given with --session-key
        #[arg(long, requires = "session_key")]
        session_secret: Option<String>,

        /// Fixed call_id instead of the current time
        #[arg(long)]
        call_id: Option<u64>,

        /// Print the signed parameters as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check the signature of a query string or REST URL
    Verify {
        /// Query string or full URL containing sig
        query: String,

        /// Secret the call was signed with
        #[arg(short, long)]
        secret: String,
    },

    /// Dissect a handoff URL, or the handoffs embedded in a dialog URL
    Handoff {
        /// Handoff URL or dialog URL
        url: String,
    },

    /// Print the effective configuration
    Config,
}

/// The config file with the global flag overrides applied.
fn effective_config(path: Option<&Path>, api_key: Option<&str>, protocol: Option<&str>) -> Result<MuConfig> {
    let path = path.map_or_else(config::default_path, Path::to_path_buf);
    let mut service = config::Config::load(&path)?.service;
    if let Some(key) = api_key {
        service.api_key = Some(key.to_string());
    }
    if let Some(protocol) = protocol {
        service.protocol = Some(protocol.to_string());
    }
    service.validate()?;
    Ok(service)
}

fn run(cli: Cli) -> Result<()> {
    // Only the commands that talk about the service read the config file.
    let load_config = || effective_config(cli.config.as_deref(), cli.api_key.as_deref(), cli.protocol.as_deref());

    match cli.command {
        Command::Encode { pairs, raw } => commands::codec::run_encode(&pairs, raw),
        Command::Decode { query, json } => commands::codec::run_decode(&query, json),
        Command::Sign {
            pairs,
            secret,
            session_key,
            session_secret,
            call_id,
            json,
        } => {
            let session = match (session_key, session_secret) {
                (Some(key), Some(secret)) => Some(Session::new(key, secret, "")),
                _ => None,
            };
            let opts = commands::sign::SignOptions {
                secret,
                session,
                call_id,
                json,
            };
            commands::sign::run(&load_config()?, &pairs, &opts)
        }
        Command::Verify { query, secret } => commands::sign::run_verify(&query, &secret),
        Command::Handoff { url } => commands::handoff::run(&url),
        Command::Config => {
            let file = config::Config {
                service: load_config()?,
            };
            print!("{}", file.to_toml()?);
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("mu=debug,mu_core=debug")
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("mu=warn,mu_core=warn")
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli) {
        eprintln!("mu: {e:#}");
        std::process::exit(1);
    }
}
