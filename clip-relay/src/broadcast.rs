//! Fan-out of admitted clips to a user's other devices.
//!
//! Targets are snapshotted from the registry, so no registry lock is held
//! while writing. Writes are sequential per clip, each bounded by the write
//! timeout: the worst case for one clip is `targets x write_timeout`.

use crate::config::BroadcastConfig;
use crate::error::DeliveryError;
use crate::metrics::RelayMetrics;
use crate::registry::{ConnHandle, Registry};
use clip_types::{Clip, DeviceId, Envelope, UserId};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Targets that accepted the frame.
    pub delivered: usize,
    /// Targets whose write failed or timed out.
    pub failed: usize,
}

/// Delivers clips to the sender's peers.
#[derive(Debug)]
pub struct Broadcaster {
    registry: Arc<Registry>,
    metrics: Arc<RelayMetrics>,
    grace: Duration,
    write_timeout: Duration,
}

impl Broadcaster {
    /// Create a broadcaster over `registry`.
    pub fn new(registry: Arc<Registry>, metrics: Arc<RelayMetrics>, config: &BroadcastConfig) -> Self {
        Self {
            registry,
            metrics,
            grace: config.grace(),
            write_timeout: config.write_timeout(),
        }
    }

    /// Send `clip` from `from` to every other live device of `user`.
    ///
    /// When the user has no other device online the target set is
    /// re-checked once after the grace interval, covering a peer that is
    /// mid-handshake. Failed writes are counted against the target device
    /// and never abort the remaining targets.
    pub async fn broadcast(&self, user: &UserId, from: &DeviceId, clip: Clip) -> FanOut {
        let mut targets = self.registry.targets(user, from);
        if targets.is_empty() && !self.grace.is_zero() {
            tokio::time::sleep(self.grace).await;
            targets = self.registry.targets(user, from);
        }
        if targets.is_empty() {
            tracing::debug!(%user, %from, msg_id = %clip.msg_id, "No peers online");
            return FanOut::default();
        }

        let frame = match Envelope::clip(clip).with_from(from.as_str()).encode() {
            Ok(frame) => frame,
            Err(e) => {
                let error = DeliveryError::from(e);
                for target in &targets {
                    self.metrics.record_backpressure(user, target.device());
                }
                tracing::warn!(%user, %from, targets = targets.len(), %error, "Delivery failed");
                return FanOut {
                    delivered: 0,
                    failed: targets.len(),
                };
            }
        };

        let mut outcome = FanOut::default();
        for target in &targets {
            match self.deliver(target, &frame).await {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    outcome.failed += 1;
                    self.metrics.record_backpressure(user, target.device());
                    tracing::warn!(
                        %user,
                        device = %target.device(),
                        conn = target.id(),
                        error = %e,
                        "Delivery failed"
                    );
                }
            }
        }

        tracing::debug!(
            %user,
            %from,
            delivered = outcome.delivered,
            failed = outcome.failed,
            "Broadcast complete"
        );
        outcome
    }

    async fn deliver(&self, target: &ConnHandle, frame: &str) -> Result<(), DeliveryError> {
        match tokio::time::timeout(self.write_timeout, target.outlet().deliver(frame)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout),
        }
    }
}
