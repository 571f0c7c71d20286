//! Main ClipRelay server coordination.
//!
//! ClipRelay owns every piece of shared state (registry, limiter, dedupe
//! windows, metrics, blob store) and runs the clip admission pipeline:
//! validation, then dedupe, then rate limiting, then fan-out.

use crate::auth::Authenticator;
use crate::broadcast::{Broadcaster, FanOut};
use crate::config::Config;
use crate::dedupe::DedupeCache;
use crate::error::{DropReason, CLOSE_NORMAL};
use crate::limits::RateLimits;
use crate::metrics::RelayMetrics;
use crate::registry::Registry;
use crate::storage::BlobStorage;
use crate::validation::validate_clip;
use clip_types::{Clip, DeviceId, UserId};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Main relay server.
pub struct ClipRelay {
    config: Config,
    authenticator: Authenticator,
    registry: Arc<Registry>,
    broadcaster: Broadcaster,
    /// Per-device token buckets.
    rate_limits: RateLimits,
    /// Per-user recent msg_id windows.
    dedupe: DedupeCache,
    metrics: Arc<RelayMetrics>,
    blobs: Arc<dyn BlobStorage>,
    /// Parent of every session's cancellation token.
    shutdown: CancellationToken,
    started_at: Instant,
}

impl std::fmt::Debug for ClipRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipRelay")
            .field("config", &self.config)
            .field("authenticator", &self.authenticator)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .field("connections", &self.registry.len())
            .field("shutting_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ClipRelay {
    /// Create a new ClipRelay with the given config and blob store.
    pub fn new(config: Config, blobs: Arc<dyn BlobStorage>) -> Self {
        let metrics = Arc::new(RelayMetrics::new());
        let registry = Arc::new(Registry::new(metrics.clone()));
        let broadcaster = Broadcaster::new(registry.clone(), metrics.clone(), &config.broadcast);
        Self {
            authenticator: Authenticator::from_config(&config.auth),
            rate_limits: RateLimits::new(&config.limits),
            dedupe: DedupeCache::new(config.limits.dedupe_capacity),
            registry,
            broadcaster,
            metrics,
            blobs,
            shutdown: CancellationToken::new(),
            started_at: Instant::now(),
            config,
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the hello authenticator.
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Get the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get the blob store.
    pub fn blobs(&self) -> &dyn BlobStorage {
        self.blobs.as_ref()
    }

    /// Time since the relay was created.
    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// A token cancelled when shutdown begins, for one session.
    pub fn session_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Whether shutdown has begun; new sessions are refused from then on.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Run a clip through validation, dedupe and rate limiting.
    ///
    /// On success the clip has been normalized; on rejection it has been
    /// counted in `drops_total`.
    pub fn admit(&self, user: &UserId, device: &DeviceId, clip: &mut Clip) -> Result<(), DropReason> {
        let verdict = self.check(user, device, clip);
        if let Err(reason) = &verdict {
            self.metrics.record_drop();
            tracing::debug!(%user, %device, msg_id = %clip.msg_id, %reason, "Dropped clip");
        }
        verdict
    }

    fn check(&self, user: &UserId, device: &DeviceId, clip: &mut Clip) -> Result<(), DropReason> {
        validate_clip(clip, self.config.limits.max_inline_bytes)?;
        if self.dedupe.exists_or_add(user, &clip.msg_id) {
            return Err(DropReason::Duplicate(clip.msg_id.clone()));
        }
        self.rate_limits
            .check_clip(user, device)
            .map_err(|_| DropReason::RateLimited)
    }

    /// Admit a clip and fan it out to the user's other devices.
    ///
    /// Each clip lands in at most one counter: `clips_total` when every
    /// target accepted it, `drops_total` when any target write failed. A
    /// clip with no peer online is neither. Returns `None` when the clip
    /// was dropped before fan-out.
    pub async fn handle_clip(&self, user: &UserId, device: &DeviceId, mut clip: Clip) -> Option<FanOut> {
        self.admit(user, device, &mut clip).ok()?;
        let outcome = self.broadcaster.broadcast(user, device, clip).await;
        if outcome.failed > 0 {
            self.metrics.record_drop();
        } else if outcome.delivered > 0 {
            self.metrics.record_clip();
        }
        Some(outcome)
    }

    /// Close every live session and stop admitting new ones.
    ///
    /// Returns the number of sessions closed by the coordinator. Gives up
    /// waiting for close frames after `server.shutdown_deadline_ms`; the
    /// sessions' own cancellation still tears them down.
    pub async fn shutdown(&self) -> usize {
        self.shutdown.cancel();

        let handles = self.registry.drain();
        let count = handles.len();
        tracing::info!(sessions = count, "Shutting down relay sessions");

        let closes = handles
            .iter()
            .map(|handle| handle.outlet().close(CLOSE_NORMAL, "server shutdown"));
        let deadline = self.config.server.shutdown_deadline();
        if tokio::time::timeout(deadline, futures_util::future::join_all(closes))
            .await
            .is_err()
        {
            tracing::warn!(
                deadline_ms = deadline.as_millis() as u64,
                "Shutdown deadline reached before all sessions closed"
            );
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{device, user, RecordingOutlet};
    use crate::storage::FsBlobStore;
    use clip_types::Envelope;
    use tempfile::TempDir;

    async fn test_relay(config: Config) -> (ClipRelay, TempDir) {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path()).await.unwrap();
        (ClipRelay::new(config, Arc::new(blobs)), dir)
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.broadcast.grace_ms = 0;
        config
    }

    fn text(id: &str, body: &str) -> Clip {
        Clip::inline(id, "text/plain", body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn relays_between_devices_of_one_user() {
        let (relay, _dir) = test_relay(fast_config()).await;
        let peer = Arc::new(RecordingOutlet::default());
        let stranger = Arc::new(RecordingOutlet::default());
        relay
            .registry()
            .join(user("u1"), device("A"), Arc::new(RecordingOutlet::default()));
        relay.registry().join(user("u1"), device("B"), peer.clone());
        relay.registry().join(user("u2"), device("C"), stranger.clone());

        let outcome = relay
            .handle_clip(&user("u1"), &device("A"), text("m1", "hello"))
            .await;
        assert_eq!(outcome.map(|o| o.delivered), Some(1));
        assert!(stranger.frames().is_empty());

        let envelope = Envelope::decode(&peer.frames()[0]).unwrap();
        assert_eq!(envelope.from.as_deref(), Some("A"));
        assert_eq!(relay.metrics().snapshot()["clips_total"], 1);
    }

    #[tokio::test]
    async fn invalid_clip_is_dropped_before_dedupe() {
        let (relay, _dir) = test_relay(fast_config()).await;
        let mut bad = text("m1", "abc");
        bad.size = 10;
        assert!(matches!(
            relay.admit(&user("u1"), &device("A"), &mut bad),
            Err(DropReason::Invalid(_))
        ));
        // Same id is still fresh for the dedupe stage
        let mut good = text("m1", "abc");
        assert!(relay.admit(&user("u1"), &device("A"), &mut good).is_ok());

        let snap = relay.metrics().snapshot();
        assert_eq!(snap["drops_total"], 1);
        assert_eq!(snap["clips_total"], 0);
    }

    #[tokio::test]
    async fn each_clip_counted_once() {
        let (relay, _dir) = test_relay(fast_config()).await;
        let total = |relay: &ClipRelay| {
            let snap = relay.metrics().snapshot();
            (snap["clips_total"], snap["drops_total"])
        };

        // No peer online: nothing broadcast, nothing dropped
        relay.handle_clip(&user("u1"), &device("A"), text("m0", "x")).await;
        assert_eq!(total(&relay), (0, 0));

        relay
            .registry()
            .join(user("u1"), device("B"), Arc::new(RecordingOutlet::failing()));
        let outcome = relay
            .handle_clip(&user("u1"), &device("A"), text("m1", "x"))
            .await;
        assert_eq!(outcome, Some(FanOut { delivered: 0, failed: 1 }));
        assert_eq!(total(&relay), (0, 1));

        let healthy = Arc::new(RecordingOutlet::default());
        relay.registry().join(user("u1"), device("C"), healthy.clone());
        let outcome = relay
            .handle_clip(&user("u1"), &device("A"), text("m2", "x"))
            .await;
        assert_eq!(outcome, Some(FanOut { delivered: 1, failed: 1 }));
        assert_eq!(healthy.frames().len(), 1);
        assert_eq!(total(&relay), (0, 2));
        assert_eq!(relay.metrics().device_drops(&user("u1"), &device("B")), 2);

        relay
            .registry()
            .join(user("u1"), device("B"), Arc::new(RecordingOutlet::default()));
        relay.handle_clip(&user("u1"), &device("A"), text("m3", "x")).await;
        assert_eq!(total(&relay), (1, 2));
    }

    #[tokio::test]
    async fn duplicate_msg_id_is_dropped() {
        let (relay, _dir) = test_relay(fast_config()).await;
        let peer = Arc::new(RecordingOutlet::default());
        relay.registry().join(user("u1"), device("B"), peer.clone());

        relay.handle_clip(&user("u1"), &device("A"), text("dup", "x")).await;
        let second = relay.handle_clip(&user("u1"), &device("A"), text("dup", "x")).await;
        assert!(second.is_none());
        assert_eq!(peer.frames().len(), 1);
        assert_eq!(relay.metrics().snapshot()["drops_total"], 1);
    }

    #[tokio::test]
    async fn rate_limit_applies_per_device() {
        let mut config = fast_config();
        config.limits.rate_per_second = 1;
        config.limits.dedupe_capacity = 0;
        let (relay, _dir) = test_relay(config).await;

        let admitted = (0..10)
            .filter(|i| {
                let mut clip = text(&format!("m{i}"), "x");
                relay.admit(&user("u1"), &device("A"), &mut clip).is_ok()
            })
            .count();
        assert_eq!(admitted, 1);

        let mut other = text("other", "x");
        assert!(relay.admit(&user("u1"), &device("B"), &mut other).is_ok());
        assert_eq!(relay.metrics().snapshot()["drops_total"], 9);
    }

    #[tokio::test]
    async fn shutdown_closes_and_zeroes_connections() {
        let (relay, _dir) = test_relay(fast_config()).await;
        let a = Arc::new(RecordingOutlet::default());
        let b = Arc::new(RecordingOutlet::default());
        relay.registry().join(user("u1"), device("A"), a.clone());
        relay.registry().join(user("u2"), device("B"), b.clone());
        let token = relay.session_token();

        assert_eq!(relay.shutdown().await, 2);
        assert!(relay.is_shutting_down());
        assert!(token.is_cancelled());
        assert_eq!(relay.metrics().conns_current(), 0);
        assert_eq!(*a.closes.lock().unwrap(), vec![CLOSE_NORMAL]);
        assert_eq!(*b.closes.lock().unwrap(), vec![CLOSE_NORMAL]);
    }
}
