//! Publish a single clip.

use anyhow::{bail, Context, Result};
use clip_types::{Clip, Envelope, DEFAULT_MIME};
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::client::{
    connect, detect_mime, http_base_from_ws, message_id, send_envelope, text_clip, upload_file,
    ConnectOptions,
};

/// Send text from the argument, or from stdin when none is given.
pub async fn text(options: &ConnectOptions, text: Option<String>) -> Result<()> {
    let raw = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read stdin")?;
            buf
        }
    };
    let text = raw.trim();
    if text.is_empty() {
        bail!("nothing to send");
    }

    let clip = text_clip(text)?;
    let (id, size) = (clip.msg_id.clone(), clip.size);
    publish(options, clip).await?;
    println!("Sent {size} bytes ({id})");
    Ok(())
}

/// Upload a file and send a reference to it.
pub async fn file(options: &ConnectOptions, path: &Path, mime: Option<&str>) -> Result<()> {
    let mime = mime
        .map(str::to_string)
        .unwrap_or_else(|| detect_mime(path, DEFAULT_MIME));
    let http_base = http_base_from_ws(&options.addr);

    println!("Uploading {} ({mime})...", path.display());
    let uploaded = upload_file(&http_base, path, &mime).await?;

    let clip = Clip::upload(message_id(), mime, uploaded.upload_url.as_str(), uploaded.size);
    let id = clip.msg_id.clone();
    publish(options, clip).await?;
    println!("Sent {} ({} bytes, {id})", uploaded.upload_url, uploaded.size);
    Ok(())
}

async fn publish(options: &ConnectOptions, clip: Clip) -> Result<()> {
    let mut socket = connect(options).await?;
    send_envelope(&mut socket, &Envelope::clip(clip)).await?;
    // Closing flushes the clip frame ahead of the close frame
    socket
        .close(None)
        .await
        .context("Failed to close relay connection")?;
    Ok(())
}
