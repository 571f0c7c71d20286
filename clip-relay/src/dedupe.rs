//! Per-user duplicate suppression.
//!
//! Each user owns a [`RecentIds`] window, created on first use. Windows are
//! independent: the same `msg_id` from two users is never a duplicate.

use clip_types::{RecentIds, UserId};
use dashmap::DashMap;

/// Bounded recency sets keyed by user.
#[derive(Debug)]
pub struct DedupeCache {
    capacity: usize,
    windows: DashMap<UserId, RecentIds>,
}

impl DedupeCache {
    /// Create a cache remembering `capacity` ids per user (0 disables it).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            windows: DashMap::new(),
        }
    }

    /// Returns `true` if `msg_id` was seen recently for `user`; otherwise records it.
    ///
    /// Empty ids and a zero capacity always yield `false` without allocating
    /// a window.
    pub fn exists_or_add(&self, user: &UserId, msg_id: &str) -> bool {
        if self.capacity == 0 || msg_id.is_empty() {
            return false;
        }
        self.windows
            .entry(user.clone())
            .or_insert_with(|| RecentIds::new(self.capacity))
            .exists_or_add(msg_id)
    }

    /// Number of users with a window.
    pub fn users(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[test]
    fn second_sighting_is_duplicate() {
        let cache = DedupeCache::new(8);
        assert!(!cache.exists_or_add(&user("u1"), "m1"));
        assert!(cache.exists_or_add(&user("u1"), "m1"));
        assert!(cache.exists_or_add(&user("u1"), "m1"));
    }

    #[test]
    fn users_are_isolated() {
        let cache = DedupeCache::new(8);
        assert!(!cache.exists_or_add(&user("u1"), "m1"));
        assert!(!cache.exists_or_add(&user("u2"), "m1"));
        assert_eq!(cache.users(), 2);
    }

    #[test]
    fn oldest_id_is_evicted_first() {
        let cache = DedupeCache::new(2);
        let u = user("u1");
        assert!(!cache.exists_or_add(&u, "a"));
        assert!(!cache.exists_or_add(&u, "b"));
        assert!(!cache.exists_or_add(&u, "c"));
        // "a" fell out of the window, "c" is still there
        assert!(!cache.exists_or_add(&u, "a"));
        assert!(cache.exists_or_add(&u, "a"));
        assert!(cache.exists_or_add(&u, "c"));
    }

    #[test]
    fn empty_id_and_zero_capacity_never_match() {
        let cache = DedupeCache::new(8);
        assert!(!cache.exists_or_add(&user("u1"), ""));
        assert!(!cache.exists_or_add(&user("u1"), ""));
        assert_eq!(cache.users(), 0);

        let disabled = DedupeCache::new(0);
        assert!(!disabled.exists_or_add(&user("u1"), "m1"));
        assert!(!disabled.exists_or_add(&user("u1"), "m1"));
        assert_eq!(disabled.users(), 0);
    }
}
