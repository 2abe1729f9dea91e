//! Delegation affinity.
//!
//! Worker nodes keep issued delegations in a store local to the node, so a
//! `reencrypt` call is only meaningful on the node that ran the matching
//! `gen_rekey`. This table remembers that origin node per delegation id.
//!
//! The table is bounded. Once `capacity` ids are pinned, pinning a new id
//! evicts the oldest one, and an evicted id is routed by round robin again.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Pins kept when no capacity is configured.
pub const DEFAULT_AFFINITY_CAPACITY: usize = 100_000;

/// Concurrent `rekey_id → origin node index` table with oldest-first eviction.
#[derive(Debug)]
pub struct DelegationAffinity {
    pins: DashMap<String, usize>,
    /// Pinned ids in insertion order. Only touched while pinning.
    order: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl Default for DelegationAffinity {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_AFFINITY_CAPACITY)
    }
}

impl DelegationAffinity {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table holding at most `capacity` pins (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pins: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record that `rekey_id` was issued by the node at `node_index`.
    /// A later pin for the same id replaces the node but keeps the id's age.
    pub fn pin(&self, rekey_id: impl Into<String>, node_index: usize) {
        let rekey_id = rekey_id.into();
        let mut order = self.order.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.pins.insert(rekey_id.clone(), node_index).is_none() {
            order.push_back(rekey_id);
        }

        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.pins.remove(&oldest);
                tracing::trace!(rekey_id = %oldest, "Evicted delegation pin");
            }
        }
    }

    /// Origin node index for `rekey_id`, if it is still pinned.
    pub fn origin(&self, rekey_id: &str) -> Option<usize> {
        self.pins.get(rekey_id).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}
