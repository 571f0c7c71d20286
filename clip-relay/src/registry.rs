//! Live connection registry.
//!
//! Maps each user to the devices currently connected for that user. One
//! entry per (user, device); a later join for the same pair replaces the
//! earlier handle (last writer wins) without closing it.
//!
//! ## Accounting
//!
//! `conns_current` is incremented on every join and decremented exactly once
//! per joined handle, whether the handle leaves normally, is superseded and
//! leaves later, or is captured by [`Registry::drain`] during shutdown. The
//! `released` flag on each handle is the single source of truth for that.

use crate::error::DeliveryError;
use crate::metrics::RelayMetrics;
use async_trait::async_trait;
use clip_types::{DeviceId, UserId};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// The write side of a live connection.
#[async_trait]
pub trait Outlet: Send + Sync {
    /// Write one text frame to the peer.
    async fn deliver(&self, frame: &str) -> Result<(), DeliveryError>;

    /// Send a close frame and stop all further I/O on the connection.
    async fn close(&self, code: u16, reason: &'static str);
}

/// A registered connection.
pub struct ConnHandle {
    id: u64,
    user: UserId,
    device: DeviceId,
    outlet: Arc<dyn Outlet>,
    released: AtomicBool,
}

impl std::fmt::Debug for ConnHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnHandle")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("device", &self.device)
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ConnHandle {
    /// Registry-unique handle id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Owning user.
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Device this connection serves.
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Write side of the connection.
    pub fn outlet(&self) -> &Arc<dyn Outlet> {
        &self.outlet
    }

    /// Mark the handle as no longer counted. Returns `true` the first time only.
    fn release(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }
}

/// Per-user connection registry.
#[derive(Debug)]
pub struct Registry {
    users: DashMap<UserId, HashMap<DeviceId, Arc<ConnHandle>>>,
    next_id: AtomicU64,
    metrics: Arc<RelayMetrics>,
}

impl Registry {
    /// Create an empty registry reporting into `metrics`.
    pub fn new(metrics: Arc<RelayMetrics>) -> Self {
        Self {
            users: DashMap::new(),
            next_id: AtomicU64::new(1),
            metrics,
        }
    }

    /// Register a connection for (user, device), replacing any previous one.
    pub fn join(&self, user: UserId, device: DeviceId, outlet: Arc<dyn Outlet>) -> Arc<ConnHandle> {
        let handle = Arc::new(ConnHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            user: user.clone(),
            device: device.clone(),
            outlet,
            released: AtomicBool::new(false),
        });

        let replaced = self
            .users
            .entry(user)
            .or_default()
            .insert(device, handle.clone());
        self.metrics.connection_opened();

        if let Some(old) = replaced {
            tracing::debug!(
                user = %handle.user,
                device = %handle.device,
                old_conn = old.id,
                new_conn = handle.id,
                "Superseded existing connection"
            );
        }
        handle
    }

    /// Unregister a connection.
    ///
    /// The map entry is only removed while it still points at `handle`; a
    /// superseded handle leaves the newer registration untouched.
    pub fn leave(&self, handle: &ConnHandle) {
        if let Some(mut devices) = self.users.get_mut(&handle.user) {
            if devices
                .get(&handle.device)
                .is_some_and(|current| current.id == handle.id)
            {
                devices.remove(&handle.device);
            }
        }
        self.users
            .remove_if(&handle.user, |_, devices| devices.is_empty());

        if handle.release() {
            self.metrics.connections_closed(1);
        }
    }

    /// Snapshot of the user's other live connections.
    pub fn targets(&self, user: &UserId, exclude: &DeviceId) -> Vec<Arc<ConnHandle>> {
        self.users
            .get(user)
            .map(|devices| {
                devices
                    .iter()
                    .filter(|(device, _)| *device != exclude)
                    .map(|(_, handle)| handle.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove every registration and return the captured handles.
    ///
    /// Captured handles are released here and subtracted from
    /// `conns_current`, so their later `leave` does not count them again.
    pub fn drain(&self) -> Vec<Arc<ConnHandle>> {
        let users: Vec<UserId> = self.users.iter().map(|e| e.key().clone()).collect();
        let mut captured = Vec::new();
        for user in users {
            if let Some((_, devices)) = self.users.remove(&user) {
                captured.extend(devices.into_values());
            }
        }

        let released = captured.iter().filter(|h| h.release()).count() as i64;
        self.metrics.connections_closed(released);
        captured
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.users.iter().map(|e| e.value().len()).sum()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Number of users with at least one registered connection.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}
