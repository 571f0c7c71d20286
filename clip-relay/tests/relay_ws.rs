//! End-to-end tests: a real listener driven by WebSocket clients.

use clip_types::{Clip, Envelope, Hello, MessageType};
use clipsync_relay::auth::{sign_token, unix_now};
use clipsync_relay::config::AuthMode;
use clipsync_relay::storage::FsBlobStore;
use clipsync_relay::{ClipRelay, Config};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "s3cr3t";

struct TestRelay {
    addr: SocketAddr,
    relay: Arc<ClipRelay>,
    _dir: TempDir,
}

impl TestRelay {
    async fn start(config: Config) -> Self {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path()).await.unwrap();
        let relay = Arc::new(ClipRelay::new(config, Arc::new(blobs)));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let served = relay.clone();
        tokio::spawn(async move {
            clipsync_relay::http::serve(listener, served, std::future::pending())
                .await
                .unwrap();
        });
        Self {
            addr,
            relay,
            _dir: dir,
        }
    }

    async fn connect(&self) -> Ws {
        let (ws, _) = connect_async(format!("ws://{}/ws", self.addr)).await.unwrap();
        ws
    }

    /// Connect and say hello as (token, user, device).
    async fn join(&self, token: &str, user: &str, device: &str) -> Ws {
        let mut ws = self.connect().await;
        send(&mut ws, &Envelope::hello(Hello::new(token, user, device))).await;
        ws
    }

    async fn wait_for_conns(&self, expected: i64) {
        for _ in 0..100 {
            if self.relay.metrics().conns_current() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "conns_current stuck at {}, expected {expected}",
            self.relay.metrics().conns_current()
        );
    }

    fn snapshot(&self, key: &str) -> i64 {
        self.relay.metrics().snapshot().get(key).copied().unwrap_or(0)
    }
}

fn quiet_config() -> Config {
    let mut config = Config::default();
    config.broadcast.grace_ms = 0;
    config
}

async fn send(ws: &mut Ws, envelope: &Envelope) {
    ws.send(Message::Text(envelope.encode().unwrap())).await.unwrap();
}

async fn send_clip(ws: &mut Ws, clip: Clip) {
    send(ws, &Envelope::clip(clip)).await;
}

fn text(id: &str, body: &str) -> Clip {
    Clip::inline(id, "text/plain", body.as_bytes().to_vec())
}

/// Next envelope within `within`, skipping control frames.
async fn recv(ws: &mut Ws, within: Duration) -> Option<Envelope> {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        let message = tokio::time::timeout_at(deadline, ws.next()).await.ok()??.ok()?;
        match message {
            Message::Text(text) => return Some(Envelope::decode(&text).unwrap()),
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => return None,
        }
    }
}

/// Close code sent by the relay, if one arrives within `within`.
async fn close_code(ws: &mut Ws, within: Duration) -> Option<u16> {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await.ok()?? {
            Ok(Message::Close(Some(frame))) => return Some(u16::from(frame.code)),
            Ok(Message::Close(None)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

#[tokio::test]
async fn relays_clip_to_other_devices_only() {
    let relay = TestRelay::start(quiet_config()).await;
    let mut a = relay.join("u1", "u1", "A").await;
    let mut b = relay.join("u1", "u1", "B").await;
    let mut other_user = relay.join("u2", "u2", "C").await;
    relay.wait_for_conns(3).await;

    send_clip(&mut a, text("m1", "hello")).await;

    let got = recv(&mut b, Duration::from_secs(2)).await.expect("clip for B");
    assert_eq!(got.kind, MessageType::Clip);
    assert_eq!(got.from.as_deref(), Some("A"));
    let clip = got.into_clip().unwrap();
    assert_eq!(clip.data, b"hello");
    assert_eq!(clip.size, 5);
    assert_eq!(clip.mime, "text/plain");

    assert!(recv(&mut a, Duration::from_millis(200)).await.is_none());
    assert!(recv(&mut other_user, Duration::from_millis(200)).await.is_none());
    assert_eq!(relay.snapshot("clips_total"), 1);
}

#[tokio::test]
async fn upload_reference_is_relayed() {
    let relay = TestRelay::start(quiet_config()).await;
    let mut a = relay.join("u1", "", "A").await;
    let mut b = relay.join("u1", "", "B").await;
    relay.wait_for_conns(2).await;

    let url = format!("/d/{}", "ab".repeat(16));
    send_clip(&mut a, Clip::upload("m1", "", url.clone(), 200_000)).await;

    let clip = recv(&mut b, Duration::from_secs(2))
        .await
        .and_then(Envelope::into_clip)
        .expect("clip for B");
    assert_eq!(clip.upload_url, url);
    assert_eq!(clip.size, 200_000);
    assert_eq!(clip.mime, "application/octet-stream");
}

#[tokio::test]
async fn invalid_clips_are_dropped_without_closing() {
    let relay = TestRelay::start(quiet_config()).await;
    let mut a = relay.join("u1", "u1", "A").await;
    let mut b = relay.join("u1", "u1", "B").await;
    relay.wait_for_conns(2).await;

    let mut mismatched = text("m1", "abc");
    mismatched.size = 999;
    send_clip(&mut a, mismatched).await;
    send_clip(&mut a, Clip { msg_id: "m2".into(), ..Clip::default() }).await;
    send_clip(&mut a, Clip::upload("m3", "image/png", "/d/x", 0)).await;
    send_clip(&mut a, Clip::inline("m4", "text/plain", vec![b'a'; 64 * 1024 + 1])).await;

    assert!(recv(&mut b, Duration::from_millis(300)).await.is_none());
    assert_eq!(relay.snapshot("drops_total"), 4);
    assert_eq!(relay.snapshot("clips_total"), 0);

    // The sender's session survived
    send_clip(&mut a, text("m5", "still here")).await;
    assert!(recv(&mut b, Duration::from_secs(2)).await.is_some());
}

#[tokio::test]
async fn duplicate_msg_id_is_delivered_once() {
    let relay = TestRelay::start(quiet_config()).await;
    let mut a = relay.join("u1", "u1", "A").await;
    let mut b = relay.join("u1", "u1", "B").await;
    relay.wait_for_conns(2).await;

    send_clip(&mut a, text("same", "one")).await;
    send_clip(&mut a, text("same", "one")).await;

    assert!(recv(&mut b, Duration::from_secs(2)).await.is_some());
    assert!(recv(&mut b, Duration::from_millis(300)).await.is_none());
    assert_eq!(relay.snapshot("drops_total"), 1);
}

#[tokio::test]
async fn rate_limit_caps_burst() {
    let mut config = quiet_config();
    config.limits.rate_per_second = 1;
    let relay = TestRelay::start(config).await;
    let mut a = relay.join("u1", "u1", "A").await;
    let mut b = relay.join("u1", "u1", "B").await;
    relay.wait_for_conns(2).await;

    for i in 0..10 {
        send_clip(&mut a, text(&format!("m{i}"), "x")).await;
    }

    let mut received = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
    while recv(&mut b, deadline.saturating_duration_since(tokio::time::Instant::now()))
        .await
        .is_some()
    {
        received += 1;
    }
    assert!(received <= 1, "received {received} clips");
}

#[tokio::test]
async fn signed_token_relays() {
    let mut config = quiet_config();
    config.auth.mode = AuthMode::Signed;
    config.auth.secret = SECRET.into();
    let relay = TestRelay::start(config).await;

    let token = sign_token("u1", unix_now() + 60, SECRET.as_bytes());
    let mut a = relay.join(&token, "u1", "A").await;
    let mut b = relay.join(&token, "u1", "B").await;
    relay.wait_for_conns(2).await;

    send_clip(&mut a, text("m1", "signed")).await;
    assert!(recv(&mut b, Duration::from_secs(2)).await.is_some());
}

#[tokio::test]
async fn forged_or_expired_token_is_policy_violation() {
    let mut config = quiet_config();
    config.auth.mode = AuthMode::Signed;
    config.auth.secret = SECRET.into();
    let relay = TestRelay::start(config).await;

    let forged = sign_token("u1", unix_now() + 60, b"wrong secret");
    let expired = sign_token("u1", unix_now() - 10, SECRET.as_bytes());
    for token in [forged, expired, "u1".to_string()] {
        let mut ws = relay.join(&token, "u1", "A").await;
        assert_eq!(close_code(&mut ws, Duration::from_secs(2)).await, Some(1008), "{token}");
    }
    assert_eq!(relay.snapshot("conns_current"), 0);
}

#[tokio::test]
async fn invalid_device_ids_are_rejected() {
    let relay = TestRelay::start(quiet_config()).await;
    let too_long = "a".repeat(65);
    for device in ["", " ", "A!", too_long.as_str()] {
        let mut ws = relay.join("u1", "u1", device).await;
        assert_eq!(
            close_code(&mut ws, Duration::from_secs(2)).await,
            Some(1008),
            "{device:?}"
        );
    }

    let ok = "a".repeat(64);
    let _ws = relay.join("u1", "u1", &ok).await;
    relay.wait_for_conns(1).await;
}

#[tokio::test]
async fn first_message_must_be_hello() {
    let relay = TestRelay::start(quiet_config()).await;

    let mut ws = relay.connect().await;
    send_clip(&mut ws, text("m1", "too early")).await;
    assert_eq!(close_code(&mut ws, Duration::from_secs(2)).await, Some(1002));

    let mut ws = relay.connect().await;
    ws.send(Message::Text("{not json".into())).await.unwrap();
    assert_eq!(close_code(&mut ws, Duration::from_secs(2)).await, Some(1002));
}

#[tokio::test]
async fn unknown_types_and_repeated_hello_are_ignored() {
    let relay = TestRelay::start(quiet_config()).await;
    let mut a = relay.join("u1", "u1", "A").await;
    let mut b = relay.join("u1", "u1", "B").await;
    relay.wait_for_conns(2).await;

    a.send(Message::Text(r#"{"type":"presence","extra":1}"#.into()))
        .await
        .unwrap();
    send(&mut a, &Envelope::hello(Hello::new("u2", "u2", "Z"))).await;
    send_clip(&mut a, text("m1", "after noise")).await;

    let got = recv(&mut b, Duration::from_secs(2)).await.expect("clip for B");
    assert_eq!(got.from.as_deref(), Some("A"));
    assert_eq!(relay.snapshot("drops_total"), 0);
}

#[tokio::test]
async fn frames_with_missing_or_null_fields_keep_session_open() {
    let relay = TestRelay::start(quiet_config()).await;
    let mut a = relay.join("u1", "u1", "A").await;
    let mut b = relay.join("u1", "u1", "B").await;
    relay.wait_for_conns(2).await;

    a.send(Message::Text(
        r#"{"clip":{"msg_id":"m0","size":1,"data":"eA=="}}"#.into(),
    ))
    .await
    .unwrap();
    a.send(Message::Text(r#"{"type":null,"hello":{"token":null}}"#.into()))
        .await
        .unwrap();
    assert!(recv(&mut b, Duration::from_millis(200)).await.is_none());

    a.send(Message::Text(
        r#"{"type":"clip","clip":{"msg_id":"m1","mime":null,"size":2,"data":"aGk=","upload_url":null}}"#
            .into(),
    ))
    .await
    .unwrap();

    let clip = recv(&mut b, Duration::from_secs(2))
        .await
        .and_then(Envelope::into_clip)
        .expect("clip for B");
    assert_eq!(clip.data, b"hi");
    assert_eq!(clip.mime, "application/octet-stream");
    assert_eq!(relay.snapshot("drops_total"), 0);
    assert_eq!(relay.snapshot("conns_current"), 2);
}

#[tokio::test]
async fn disconnect_updates_connection_gauge() {
    let relay = TestRelay::start(quiet_config()).await;
    let a = relay.join("u1", "u1", "A").await;
    let _b = relay.join("u1", "u1", "B").await;
    relay.wait_for_conns(2).await;

    drop(a);
    relay.wait_for_conns(1).await;
}

#[tokio::test]
async fn reconnect_supersedes_previous_connection() {
    let relay = TestRelay::start(quiet_config()).await;
    let mut old = relay.join("u1", "u1", "B").await;
    relay.wait_for_conns(1).await;
    let mut new = relay.join("u1", "u1", "B").await;
    let mut a = relay.join("u1", "u1", "A").await;
    relay.wait_for_conns(3).await;

    send_clip(&mut a, text("m1", "latest")).await;
    assert!(recv(&mut new, Duration::from_secs(2)).await.is_some());
    assert!(recv(&mut old, Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn shutdown_closes_sessions_promptly() {
    let relay = TestRelay::start(quiet_config()).await;
    let mut a = relay.join("u1", "u1", "A").await;
    let mut b = relay.join("u1", "u1", "B").await;
    relay.wait_for_conns(2).await;

    send_clip(&mut a, text("m1", "ok")).await;
    assert!(recv(&mut b, Duration::from_secs(2)).await.is_some());

    relay.relay.shutdown().await;

    assert!(recv(&mut a, Duration::from_millis(100)).await.is_none());
    assert_eq!(relay.snapshot("conns_current"), 0);

    let refused = connect_async(format!("ws://{}/ws", relay.addr)).await;
    match refused {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 503)
        }
        other => panic!("expected 503, got {:?}", other.map(|_| ())),
    }
}
