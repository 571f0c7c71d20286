//! Two-way sync between the system clipboard and the relay.

use anyhow::Result;
use clip_types::{Clip, Envelope, RecentIds};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use super::listen::inline_text;
use super::Reconnect;
use crate::client::{recv_clip, send_envelope, text_clip, ConnectOptions, RelaySocket};
use crate::clipboard::Backend;

/// Message ids remembered for echo suppression.
const RECENT_IDS: usize = 256;

/// Tracks what the clipboard last held so remote writes are not re-published.
#[derive(Debug)]
struct EchoGuard {
    last_seen: Option<String>,
    recent: RecentIds,
}

impl EchoGuard {
    fn new() -> Self {
        Self {
            last_seen: None,
            recent: RecentIds::new(RECENT_IDS),
        }
    }

    /// Whether a polled clipboard value is a new local change to publish.
    fn local_change(&mut self, text: &str) -> bool {
        if text.is_empty() || self.last_seen.as_deref() == Some(text) {
            return false;
        }
        self.last_seen = Some(text.to_string());
        true
    }

    fn sent(&mut self, msg_id: &str) {
        self.recent.exists_or_add(msg_id);
    }

    /// Text to write to the clipboard for a remote clip, if any.
    fn remote_clip(&mut self, clip: &Clip) -> Option<String> {
        if self.recent.exists_or_add(&clip.msg_id) {
            return None;
        }
        let text = inline_text(clip)?;
        if self.last_seen.as_deref() == Some(text.as_str()) {
            return None;
        }
        self.last_seen = Some(text.clone());
        Some(text)
    }
}

/// Run the watch command until Ctrl-C.
pub async fn run(options: &ConnectOptions, interval: Duration) -> Result<()> {
    let clipboard = Backend::detect()?;
    tracing::info!(backend = ?clipboard, "Using clipboard backend");

    let mut guard = EchoGuard::new();
    // The clipboard's content at startup is not a change
    if let Ok(text) = clipboard.read_text().await {
        guard.local_change(&text);
    }

    let mut reconnect = Reconnect::default();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let socket = tokio::select! {
            _ = &mut shutdown => return Ok(()),
            socket = reconnect.connect(options) => socket,
        };
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            result = sync(socket, &clipboard, &mut guard, interval) => match result {
                Ok(()) => eprintln!("Relay closed the connection"),
                Err(e) => eprintln!("Connection lost: {e:#}"),
            },
        }
    }
}

async fn sync(
    socket: RelaySocket,
    clipboard: &Backend,
    guard: &mut EchoGuard,
    interval: Duration,
) -> Result<()> {
    let (mut sink, mut stream) = socket.split();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let text = match clipboard.read_text().await {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::debug!(error = %e, "Clipboard read failed");
                        continue;
                    }
                };
                if !guard.local_change(&text) {
                    continue;
                }
                let clip = match text_clip(&text) {
                    Ok(clip) => clip,
                    Err(e) => {
                        eprintln!("Not syncing clipboard: {e}");
                        continue;
                    }
                };
                guard.sent(&clip.msg_id);
                send_envelope(&mut sink, &Envelope::clip(clip)).await?;
                println!("[sent] {} bytes", text.len());
            }
            received = recv_clip(&mut stream) => {
                let Some((from, clip)) = received? else {
                    return Ok(());
                };
                if let Some(text) = guard.remote_clip(&clip) {
                    clipboard.write_text(&text).await?;
                    println!("[from {from}] applied {} bytes", text.len());
                }
            }
        }
    }
}
