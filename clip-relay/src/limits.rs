//! Per-device rate limiting for clipsync-relay.
//!
//! Each (user, device) pair gets its own token bucket whose capacity equals
//! its refill rate: a device that has been quiet for a second can send a
//! burst of `rate` clips, after which it is admitted at `rate` per second.
//!
//! ## Design Notes
//!
//! Buckets are created lazily on first use and are never evicted. Device-id
//! cardinality is bounded by the number of real devices per user, so the
//! map stays small.
//!
//! The governor crate's keyed GCRA limiter is used; GCRA with
//! `burst == rate` admits exactly the same sequences as a continuously
//! replenished token bucket of that capacity.

use crate::config::LimitsConfig;
use clip_types::{DeviceId, UserId};
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Bucket key: one bucket per device of each user.
type DeviceKey = (UserId, DeviceId);

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Admission control for clips.
#[derive(Clone)]
pub struct RateLimits {
    /// `None` when limiting is disabled (rate <= 0).
    clip_limiter: Option<Arc<KeyedLimiter<DeviceKey>>>,
    rate_per_second: u32,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("clip_limiter", &"KeyedLimiter<(UserId, DeviceId)>")
            .field("rate_per_second", &self.rate_per_second)
            .finish()
    }
}

impl RateLimits {
    /// Create rate limiters from configuration.
    ///
    /// A rate of zero or less disables limiting entirely.
    pub fn new(config: &LimitsConfig) -> Self {
        Self::per_second(config.rate_per_second)
    }

    /// Create a limiter admitting `rate` clips per second per device.
    pub fn per_second(rate: i64) -> Self {
        let clamped = rate.clamp(0, u32::MAX as i64) as u32;
        let clip_limiter = NonZeroU32::new(clamped)
            .map(|rps| Arc::new(RateLimiter::keyed(Quota::per_second(rps))));
        Self {
            clip_limiter,
            rate_per_second: clamped,
        }
    }

    /// Whether limiting is active.
    pub fn is_enabled(&self) -> bool {
        self.clip_limiter.is_some()
    }

    /// Check if a clip from this device may be admitted, consuming a token.
    ///
    /// # Returns
    ///
    /// `Ok(())` if allowed, `Err` if the device's bucket is empty.
    pub fn check_clip(&self, user: &UserId, device: &DeviceId) -> Result<(), RateLimitError> {
        let Some(limiter) = &self.clip_limiter else {
            return Ok(());
        };
        limiter
            .check_key(&(user.clone(), device.clone()))
            .map_err(|_| RateLimitError::ClipLimitExceeded)
    }

    /// Get the number of tracked device buckets (for metrics).
    pub fn tracked_devices(&self) -> usize {
        self.clip_limiter.as_ref().map_or(0, |l| l.len())
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// Too many clips from this device.
    ClipLimitExceeded,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClipLimitExceeded => write!(f, "clip rate limit exceeded"),
        }
    }
}

impl std::error::Error for RateLimitError {}
