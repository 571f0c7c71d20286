//! Operational counters and backpressure accounting.

use clip_types::{DeviceId, UserId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

/// Snapshot key for total clips broadcast to every target.
pub const CLIPS_TOTAL: &str = "clips_total";
/// Snapshot key for total drops.
pub const DROPS_TOTAL: &str = "drops_total";
/// Snapshot key for live connections.
pub const CONNS_CURRENT: &str = "conns_current";
/// Prefix of per-device backpressure keys (`drops_device:<user>|<device>`).
pub const DROPS_DEVICE_PREFIX: &str = "drops_device:";

/// Relay counters.
///
/// Counter increments are lock-free. Only inserting a new device into the
/// backpressure map takes the mutex; existing entries are bumped under the
/// same short critical section.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Clips delivered to every target.
    pub clips_total: AtomicU64,
    /// Rejected, duplicate, rate-limited and backpressure-failed clips.
    pub drops_total: AtomicU64,
    /// Live registered connections.
    pub conns_current: AtomicI64,
    device_drops: Mutex<HashMap<(UserId, DeviceId), u64>>,
}

impl RelayMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a clip delivered to every target.
    pub fn record_clip(&self) {
        self.clips_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a clip that was rejected or lost to backpressure.
    pub fn record_drop(&self) {
        self.drops_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed write to one target device.
    ///
    /// Only the per-device counter moves; the clip itself is settled once
    /// in `drops_total` after its fan-out finishes.
    pub fn record_backpressure(&self, user: &UserId, device: &DeviceId) {
        let mut map = self
            .device_drops
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *map.entry((user.clone(), device.clone())).or_insert(0) += 1;
    }

    /// Count a connection joining the registry.
    pub fn connection_opened(&self) {
        self.conns_current.fetch_add(1, Ordering::Relaxed);
    }

    /// Count `n` connections leaving the registry.
    pub fn connections_closed(&self, n: i64) {
        self.conns_current.fetch_sub(n, Ordering::Relaxed);
    }

    /// Current live connection count.
    pub fn conns_current(&self) -> i64 {
        self.conns_current.load(Ordering::Relaxed)
    }

    /// Backpressure failures recorded for one device.
    pub fn device_drops(&self, user: &UserId, device: &DeviceId) -> u64 {
        self.device_drops
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&(user.clone(), device.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Point-in-time copy of every counter.
    ///
    /// Keys are `clips_total`, `drops_total`, `conns_current` and one
    /// `drops_device:<user>|<device>` per device that ever failed a write.
    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        let mut out = BTreeMap::new();
        out.insert(
            CLIPS_TOTAL.to_string(),
            self.clips_total.load(Ordering::Relaxed) as i64,
        );
        out.insert(
            DROPS_TOTAL.to_string(),
            self.drops_total.load(Ordering::Relaxed) as i64,
        );
        out.insert(CONNS_CURRENT.to_string(), self.conns_current());

        let map = self
            .device_drops
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for ((user, device), count) in map.iter() {
            out.insert(
                format!("{DROPS_DEVICE_PREFIX}{user}|{device}"),
                *count as i64,
            );
        }
        out
    }
}
