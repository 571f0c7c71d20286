//! clipsync-relay binary entry point.
//!
//! Usage:
//! ```bash
//! clipsync-relay serve --config relay.toml
//! clipsync-relay token --user alice --secret s3cr3t --ttl-secs 86400
//! clipsync-relay --help
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clipsync_relay::auth::{sign_token, unix_now};
use clipsync_relay::storage::FsBlobStore;
use clipsync_relay::{ClipRelay, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Real-time clipboard relay server.
#[derive(Parser, Debug)]
#[command(name = "clipsync-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the relay
    Serve {
        /// Configuration file (missing file means defaults)
        #[arg(long, short, default_value = "relay.toml")]
        config: PathBuf,

        /// Override server.bind_address
        #[arg(long)]
        bind: Option<String>,

        /// Emit logs as JSON lines
        #[arg(long)]
        json_logs: bool,
    },

    /// Print a signed token for auth.mode = "signed"
    Token {
        /// User the token identifies
        #[arg(long, short)]
        user: String,

        /// HMAC secret shared with the relay
        #[arg(long, short)]
        secret: String,

        /// Validity from now, in seconds
        #[arg(long, default_value = "86400")]
        ttl_secs: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            json_logs,
        } => {
            init_tracing(json_logs);
            serve(&config, bind).await?;
        }
        Commands::Token {
            user,
            secret,
            ttl_secs,
        } => {
            anyhow::ensure!(!user.is_empty(), "--user must not be empty");
            anyhow::ensure!(!secret.is_empty(), "--secret must not be empty");
            println!("{}", sign_token(&user, unix_now() + ttl_secs, secret.as_bytes()));
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn serve(config_path: &std::path::Path, bind: Option<String>) -> Result<()> {
    let mut config = if config_path.exists() {
        Config::from_file(config_path)?
    } else {
        tracing::info!(path = %config_path.display(), "No config file, using defaults");
        Config::default()
    };
    config.apply_env();
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }
    config.validate()?;

    let blobs = FsBlobStore::new(&config.uploads.dir)
        .await
        .with_context(|| format!("Failed to open uploads dir {}", config.uploads.dir.display()))?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    tracing::info!(
        address = %listener.local_addr()?,
        auth = ?config.auth.mode,
        rate_per_second = config.limits.rate_per_second,
        dedupe_capacity = config.limits.dedupe_capacity,
        "clipsync-relay listening"
    );

    let relay = Arc::new(ClipRelay::new(config, Arc::new(blobs)));
    clipsync_relay::http::serve(listener, relay, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("clipsync-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
