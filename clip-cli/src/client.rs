//! Relay connection helpers shared by the commands.

use anyhow::{bail, Context, Result};
use clip_types::{Clip, Envelope, Hello, MAX_INLINE_BYTES};
use futures_util::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// A connected relay socket.
pub type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Time allowed for connecting and sending HELLO.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed for a file upload.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

const BACKOFF_START: Duration = Duration::from_millis(500);
const BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Who to connect as, and where.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Relay WebSocket endpoint.
    pub addr: String,
    /// HELLO credential.
    pub token: String,
    /// Claimed user id.
    pub user: String,
    /// This device's id.
    pub device: String,
}

/// Relay reply to a successful upload.
#[derive(Debug, Clone, Deserialize)]
pub struct Uploaded {
    /// Relative URL of the stored blob.
    pub upload_url: String,
    /// Stored size in bytes.
    pub size: i64,
}

/// User id implied by a token: the leading field of a signed
/// `user:expiry:mac` token, otherwise the token itself.
pub fn default_user(token: &str) -> String {
    let parts: Vec<&str> = token.split(':').collect();
    match parts.as_slice() {
        [user, expiry, mac] if !user.is_empty() && !expiry.is_empty() && !mac.is_empty() => {
            user.to_string()
        }
        _ => token.to_string(),
    }
}

/// Connect to the relay and send HELLO.
pub async fn connect(options: &ConnectOptions) -> Result<RelaySocket> {
    tokio::time::timeout(CONNECT_TIMEOUT, async {
        let (mut socket, _) = connect_async(options.addr.as_str())
            .await
            .with_context(|| format!("Failed to connect to {}", options.addr))?;
        let hello = Envelope::hello(Hello::new(
            options.token.as_str(),
            options.user.as_str(),
            options.device.as_str(),
        ));
        send_envelope(&mut socket, &hello).await?;
        Ok(socket)
    })
    .await
    .context("Timed out connecting to relay")?
}

/// Encode and send one envelope.
pub async fn send_envelope<S>(sink: &mut S, envelope: &Envelope) -> Result<()>
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let frame = envelope.encode().context("Failed to encode envelope")?;
    sink.send(Message::Text(frame))
        .await
        .context("Failed to send to relay")?;
    Ok(())
}

/// Wait for the next clip from the relay.
///
/// Returns `Ok(None)` once the relay closes the connection. Frames that are
/// not clips, or do not decode, are skipped.
pub async fn recv_clip<S>(stream: &mut S) -> Result<Option<(String, Clip)>>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message.context("Relay connection failed")? {
            Message::Text(text) => {
                let envelope = match Envelope::decode(&text) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        tracing::debug!(error = %e, "Ignoring undecodable frame");
                        continue;
                    }
                };
                let from = envelope.from.clone().unwrap_or_default();
                if let Some(clip) = envelope.into_clip() {
                    return Ok(Some((from, clip)));
                }
            }
            Message::Close(frame) => {
                if let Some(frame) = frame {
                    tracing::info!(code = u16::from(frame.code), reason = %frame.reason, "Relay closed connection");
                }
                return Ok(None);
            }
            _ => {}
        }
    }
    Ok(None)
}

/// Build a text clip, refusing payloads too large to carry inline.
pub fn text_clip(text: &str) -> Result<Clip> {
    let data = text.as_bytes().to_vec();
    if data.len() > MAX_INLINE_BYTES {
        bail!(
            "text payload is {} bytes; exceeds the {}-byte inline limit, use --file",
            data.len(),
            MAX_INLINE_BYTES
        );
    }
    Ok(Clip::inline(message_id(), "text/plain", data))
}

/// A fresh message id: `m-` followed by the UTC time to the millisecond.
pub fn message_id() -> String {
    format!("m-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ"))
}

/// HTTP base URL of the relay serving the given WebSocket endpoint.
///
/// `wss://` maps to `https://`, `ws://` to `http://`, and an address
/// without a scheme is assumed to be plain HTTP. The path is dropped.
pub fn http_base_from_ws(ws_addr: &str) -> String {
    let (scheme, rest) = if let Some(rest) = ws_addr.strip_prefix("wss://") {
        ("https", rest)
    } else if let Some(rest) = ws_addr.strip_prefix("ws://") {
        ("http", rest)
    } else {
        ("http", ws_addr)
    };
    let host = rest.split('/').next().unwrap_or(rest);
    format!("{scheme}://{host}")
}

/// Make a relay-relative URL such as `/d/<id>` absolute.
pub fn resolve_url(http_base: &str, url: &str) -> String {
    if url.starts_with('/') {
        format!("{}{url}", http_base.trim_end_matches('/'))
    } else {
        url.to_string()
    }
}

/// Upload a file to the relay's blob store.
pub async fn upload_file(http_base: &str, path: &Path, mime: &str) -> Result<Uploaded> {
    let body = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let url = format!("{}/upload", http_base.trim_end_matches('/'));

    let response = reqwest::Client::builder()
        .timeout(UPLOAD_TIMEOUT)
        .build()?
        .post(&url)
        .header(reqwest::header::CONTENT_TYPE, mime)
        .body(body)
        .send()
        .await
        .with_context(|| format!("Upload to {url} failed"))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        bail!("upload failed: status={} body={}", status.as_u16(), text.trim());
    }
    response
        .json::<Uploaded>()
        .await
        .context("Invalid upload response")
}

/// Delay before reconnect attempt `attempt` (0-based): 500 ms doubling, capped at 5 s.
pub fn backoff(attempt: u32) -> Duration {
    let mut delay = BACKOFF_START;
    for _ in 0..attempt {
        if delay >= BACKOFF_MAX {
            break;
        }
        delay *= 2;
    }
    delay.min(BACKOFF_MAX)
}

/// Guess a MIME type from a file extension.
pub fn detect_mime(path: &Path, fallback: &str) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let mime = match ext.as_deref() {
        Some("txt") | Some("log") => "text/plain",
        Some("md") => "text/markdown",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => fallback,
    };
    mime.to_string()
}
