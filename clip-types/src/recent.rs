//! Bounded FIFO set of recently seen message ids.

use std::collections::{HashSet, VecDeque};

/// A fixed-capacity set that forgets its oldest entry first.
///
/// Capacity 0 disables it: nothing is remembered and nothing is ever
/// reported as seen.
#[derive(Debug, Clone, Default)]
pub struct RecentIds {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl RecentIds {
    /// Create an empty set remembering at most `capacity` ids.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    /// Returns `true` if `id` was already present; otherwise records it.
    ///
    /// An empty id is never recorded and never a duplicate.
    pub fn exists_or_add(&mut self, id: &str) -> bool {
        if self.capacity == 0 || id.is_empty() {
            return false;
        }
        if self.members.contains(id) {
            return true;
        }
        self.members.insert(id.to_string());
        self.order.push_back(id.to_string());
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        false
    }

    /// Whether `id` is currently remembered.
    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// Number of remembered ids.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
