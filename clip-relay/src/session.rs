//! Per-connection session management.
//!
//! Each WebSocket gets a Session that waits for HELLO, authenticates it,
//! registers the device, then relays clips until the peer leaves, goes
//! idle, or the relay shuts down. A keep-alive task pings the peer for the
//! lifetime of the active session.

use crate::error::{
    DeliveryError, ProtocolError, ProtocolResult, RelayError, CLOSE_NORMAL,
    CLOSE_POLICY_VIOLATION,
};
use crate::registry::{ConnHandle, Outlet};
use crate::server::ClipRelay;
use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use clip_types::{DeviceId, Envelope, Hello, MessageType, UserId};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Upper bound on sending a close frame to a stuck peer.
const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Session state machine states.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// Waiting for HELLO message.
    AwaitingHello,
    /// Session is registered and relaying clips.
    Active {
        /// Authenticated user.
        user: UserId,
        /// Device this connection serves.
        device: DeviceId,
    },
    /// Session is closing.
    Closing,
}

/// Write half of a WebSocket, shared between the session, the keep-alive
/// task, broadcasts from other sessions and the shutdown coordinator.
pub struct WsOutlet {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl WsOutlet {
    /// Wrap a sink; `cancel` aborts in-flight writes when cancelled.
    pub fn new(sink: SplitSink<WebSocket, Message>, cancel: CancellationToken) -> Self {
        Self {
            sink: Mutex::new(sink),
            cancel,
            closed: AtomicBool::new(false),
        }
    }

    /// Send a keep-alive ping.
    pub async fn ping(&self) -> Result<(), DeliveryError> {
        self.send(Message::Ping(Vec::new())).await
    }

    async fn send(&self, message: Message) -> Result<(), DeliveryError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DeliveryError::Closed("session closed".into()));
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(DeliveryError::Closed("session cancelled".into())),
            result = async {
                let mut sink = self.sink.lock().await;
                sink.send(message).await
            } => result.map_err(|e| DeliveryError::Closed(e.to_string())),
        }
    }
}

#[async_trait]
impl Outlet for WsOutlet {
    async fn deliver(&self, frame: &str) -> Result<(), DeliveryError> {
        self.send(Message::Text(frame.to_string())).await
    }

    async fn close(&self, code: u16, reason: &'static str) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let frame = Message::Close(Some(CloseFrame {
                code,
                reason: Cow::Borrowed(reason),
            }));
            let sent = tokio::time::timeout(CLOSE_WRITE_TIMEOUT, async {
                let mut sink = self.sink.lock().await;
                sink.send(frame).await
            })
            .await;
            if !matches!(sent, Ok(Ok(()))) {
                tracing::debug!(code, reason, "Close frame not delivered");
            }
        }
        self.cancel.cancel();
    }
}

/// A per-connection session.
pub struct Session {
    relay: Arc<ClipRelay>,
    outlet: Arc<WsOutlet>,
    stream: SplitStream<WebSocket>,
    cancel: CancellationToken,
    state: SessionState,
}

impl Session {
    /// Create a new session for an upgraded socket.
    pub fn new(relay: Arc<ClipRelay>, socket: WebSocket) -> Self {
        let cancel = relay.session_token();
        let (sink, stream) = socket.split();
        Self {
            outlet: Arc::new(WsOutlet::new(sink, cancel.clone())),
            relay,
            stream,
            cancel,
            state: SessionState::AwaitingHello,
        }
    }

    /// Run the session until completion.
    ///
    /// Returns an error when the handshake was rejected; the peer has
    /// already received the matching close frame.
    pub async fn run(mut self) -> Result<(), RelayError> {
        let (user, device) = match self.handshake().await {
            Ok(identity) => identity,
            Err(e) => {
                let (code, reason) = match &e {
                    _ if self.cancel.is_cancelled() => (CLOSE_NORMAL, "server shutdown"),
                    RelayError::Protocol(p) => (p.close_code(), p.close_reason()),
                    _ => (CLOSE_POLICY_VIOLATION, "auth"),
                };
                self.outlet.close(code, reason).await;
                return Err(e);
            }
        };

        let handle = self
            .relay
            .registry()
            .join(user.clone(), device.clone(), self.outlet.clone());
        self.state = SessionState::Active {
            user: user.clone(),
            device: device.clone(),
        };
        tracing::info!(%user, %device, conn = handle.id(), "Session established");

        let keepalive = spawn_keepalive(
            self.outlet.clone(),
            self.relay.config().session.ping_interval(),
            self.cancel.clone(),
        );

        let result = self.read_loop(&user, &device).await;
        self.state = SessionState::Closing;
        self.finish(&handle, result).await;
        keepalive.abort();
        Ok(())
    }

    /// Wait for HELLO, authenticate it and validate the device id.
    async fn handshake(&mut self) -> Result<(UserId, DeviceId), RelayError> {
        let hello = self.await_hello().await?;

        let user = self.relay.authenticator().authenticate(&hello).map_err(|e| {
            tracing::warn!(error = %e, device = %hello.device_id, "HELLO rejected");
            e
        })?;

        let max_len = self.relay.config().limits.max_device_id_len;
        let device = DeviceId::parse(&hello.device_id, max_len).map_err(|_| {
            tracing::warn!(%user, device = ?hello.device_id, "Invalid device id");
            ProtocolError::InvalidDeviceId(hello.device_id.clone())
        })?;

        Ok((user, device))
    }

    async fn await_hello(&mut self) -> ProtocolResult<Hello> {
        let timeout = self.relay.config().session.hello_timeout();
        let envelope = match tokio::time::timeout(timeout, self.next_envelope()).await {
            Ok(Ok(Some(envelope))) => envelope,
            Ok(Ok(None)) => {
                return Err(ProtocolError::Connection(
                    "closed before HELLO".to_string(),
                ))
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "HELLO timeout");
                return Err(ProtocolError::HelloTimeout);
            }
        };

        match (&self.state, envelope.as_hello()) {
            (SessionState::AwaitingHello, Some(hello)) => Ok(hello.clone()),
            _ => Err(ProtocolError::HelloRequired),
        }
    }

    /// Relay clips until the peer leaves, idles out, or the relay shuts down.
    async fn read_loop(&mut self, user: &UserId, device: &DeviceId) -> ProtocolResult<()> {
        let read_timeout = self.relay.config().session.read_timeout();
        loop {
            let next = match tokio::time::timeout(read_timeout, self.next_envelope()).await {
                Ok(next) => next?,
                Err(_) => {
                    tracing::debug!(%user, %device, "Read timeout, closing idle session");
                    return Ok(());
                }
            };
            let Some(envelope) = next else {
                return Ok(());
            };

            match envelope.kind {
                MessageType::Clip => {
                    let clip = envelope.clip.unwrap_or_default();
                    self.relay.handle_clip(user, device, clip).await;
                }
                MessageType::Hello => {
                    tracing::debug!(%user, %device, "Ignoring repeated HELLO");
                }
                MessageType::Unknown => {
                    tracing::debug!(%user, %device, "Ignoring unknown message type");
                }
            }
        }
    }

    /// Read the next data frame as an envelope.
    ///
    /// Control frames are skipped. Returns `Ok(None)` when the peer closed,
    /// the transport ended, or the session was cancelled.
    async fn next_envelope(&mut self) -> ProtocolResult<Option<Envelope>> {
        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(None),
                message = self.stream.next() => message,
            };
            let decoded = match message {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Err(e)) => return Err(ProtocolError::Connection(e.to_string())),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Text(text))) => Envelope::decode(&text),
                Some(Ok(Message::Binary(bytes))) => Envelope::from_slice(&bytes),
            };
            return decoded.map(Some).map_err(ProtocolError::InvalidFrame);
        }
    }

    async fn finish(&self, handle: &ConnHandle, result: ProtocolResult<()>) {
        self.relay.registry().leave(handle);
        match result {
            Ok(()) => {
                let reason = if self.cancel.is_cancelled() { "server shutdown" } else { "" };
                self.outlet.close(CLOSE_NORMAL, reason).await;
                tracing::info!(user = %handle.user(), device = %handle.device(), "Session closed");
            }
            Err(e) => {
                self.outlet.close(e.close_code(), e.close_reason()).await;
                tracing::warn!(
                    user = %handle.user(),
                    device = %handle.device(),
                    error = %e,
                    "Session ended with error"
                );
            }
        }
    }
}

/// Ping the peer every `interval` until `cancel` fires.
///
/// A failed ping closes the connection with a policy-violation code.
fn spawn_keepalive(
    outlet: Arc<WsOutlet>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if let Err(e) = outlet.ping().await {
                if !cancel.is_cancelled() {
                    tracing::debug!(error = %e, "Keep-alive ping failed");
                    outlet.close(CLOSE_POLICY_VIOLATION, "ping failed").await;
                }
                return;
            }
        }
    })
}
