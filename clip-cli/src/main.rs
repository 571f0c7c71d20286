//! # clipsync
//!
//! Command-line client for the clipsync relay.
//!
//! ## Commands
//!
//! - `listen`: Print clips from the user's other devices (optionally apply them)
//! - `send`: Publish text or a file once
//! - `watch`: Two-way sync between the system clipboard and the relay
//!
//! ## Example
//!
//! ```bash
//! # On the laptop, print everything the phone copies
//! clipsync --token u1 --device laptop listen
//!
//! # Send a line of text
//! echo "hello" | clipsync --token u1 --device desktop send
//!
//! # Send a screenshot through the blob store
//! clipsync --token u1 --device desktop send --file shot.png
//!
//! # Keep the local clipboard in sync
//! clipsync --token u1 --device desktop watch
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod client;
mod clipboard;
mod commands;

use client::ConnectOptions;
use commands::{listen, send, watch};

/// Command-line client for the clipsync relay.
#[derive(Parser, Debug)]
#[command(name = "clipsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Relay WebSocket endpoint
    #[arg(long, global = true, default_value = "ws://localhost:8080/ws")]
    addr: String,

    /// Credential presented in HELLO (in static mode the token is the user id)
    #[arg(long, global = true, default_value = "u1")]
    token: String,

    /// Device id, unique among the user's devices
    #[arg(long, global = true, default_value = "A")]
    device: String,

    /// Claimed user id (defaults to the token's user)
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print clips from other devices, reconnecting on failure
    Listen {
        /// Also write received text clips to the system clipboard
        #[arg(long)]
        apply: bool,
    },

    /// Send one clip
    Send {
        /// Text to send (reads stdin when omitted)
        #[arg(conflicts_with = "file")]
        text: Option<String>,

        /// Upload this file and send a reference to it
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// MIME type for --file (guessed from the extension when omitted)
        #[arg(long, requires = "file")]
        mime: Option<String>,
    },

    /// Sync the system clipboard both ways
    Watch {
        /// Clipboard polling interval in milliseconds
        #[arg(long, default_value = "500")]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let options = ConnectOptions {
        user: cli.user.unwrap_or_else(|| client::default_user(&cli.token)),
        addr: cli.addr,
        token: cli.token,
        device: cli.device,
    };

    match cli.command {
        Commands::Listen { apply } => {
            listen::run(&options, apply).await?;
        }
        Commands::Send { text, file, mime } => {
            if let Some(path) = file {
                send::file(&options, &path, mime.as_deref()).await?;
            } else {
                send::text(&options, text).await?;
            }
        }
        Commands::Watch { interval_ms } => {
            anyhow::ensure!(interval_ms > 0, "--interval-ms must be > 0");
            watch::run(&options, std::time::Duration::from_millis(interval_ms)).await?;
        }
    }

    Ok(())
}
