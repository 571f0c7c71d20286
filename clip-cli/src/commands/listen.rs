//! Print clips arriving from the user's other devices.

use anyhow::Result;
use clip_types::Clip;

use super::Reconnect;
use crate::client::{http_base_from_ws, recv_clip, resolve_url, ConnectOptions, RelaySocket};
use crate::clipboard::Backend;

/// Run the listen command until Ctrl-C.
pub async fn run(options: &ConnectOptions, apply: bool) -> Result<()> {
    let clipboard = if apply {
        Some(Backend::detect()?)
    } else {
        None
    };
    let http_base = http_base_from_ws(&options.addr);
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
            result = receive(socket, &http_base, clipboard.as_ref()) => match result {
                Ok(()) => eprintln!("Relay closed the connection"),
                Err(e) => eprintln!("Connection lost: {e:#}"),
            },
        }
    }
}

async fn receive(mut socket: RelaySocket, http_base: &str, clipboard: Option<&Backend>) -> Result<()> {
    while let Some((from, clip)) = recv_clip(&mut socket).await? {
        println!("{}", describe(&from, &clip, http_base));

        if let (Some(backend), Some(text)) = (clipboard, inline_text(&clip)) {
            if let Err(e) = backend.write_text(&text).await {
                eprintln!("Failed to apply clip to clipboard: {e:#}");
            }
        }
    }
    Ok(())
}

/// The clip's content as text, when it is an inline text clip.
pub(crate) fn inline_text(clip: &Clip) -> Option<String> {
    if clip.is_text() && clip.is_inline() {
        Some(String::from_utf8_lossy(&clip.data).into_owned())
    } else {
        None
    }
}

/// One-line rendering of a received clip.
fn describe(from: &str, clip: &Clip, http_base: &str) -> String {
    if !clip.is_inline() {
        return format!(
            "[from {from}] large clip: {} ({} bytes)",
            resolve_url(http_base, &clip.upload_url),
            clip.size
        );
    }
    match inline_text(clip) {
        Some(text) => format!("[from {from}] {text}"),
        None => format!("[from {from}] {} ({} bytes inline)", clip.mime, clip.data.len()),
    }
}
