//! Bounded recency list with per-key access counters.
//!
//! Tracks object ids that were requested recently, whether or not they ended
//! up cached, so the frequency-threshold admission policy can ask "how many
//! times has this id been seen lately?" before spending write budget on it.
//!
//! ## Architecture
//!
//! ```text
//!   index: FxHashMap<K, GhostEntry>        list: IntrusiveList<K>
//!   ┌───────┬────────────────┐             head ─► [C] ◄──► [B] ◄──► [A] ◄── tail
//!   │ key A │ slot_1, cnt 3  │                MRU                        LRU
//!   │ key B │ slot_2, cnt 1  │
//!   └───────┴────────────────┘
//! ```
//!
//! ## Behavior
//! - `record_access(k)`: at capacity first evicts the LRU key, dropping its
//!   counter; then bumps the counter of `k` and moves it to MRU
//! - `count(k)`: peeks the counter without touching recency
//!
//! Capacity is counted in slots, never in object bytes.
use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::ds::intrusive_list::IntrusiveList;
use crate::ds::slot_arena::SlotId;
use crate::error::{ConfigError, InvariantError};

#[derive(Debug, Clone, Copy)]
struct GhostEntry {
    slot: SlotId,
    count: u32,
}

// Large byte budgets grow on demand instead of reserving up front.
const PREALLOCATE_LIMIT: usize = 1 << 16;

/// Slot-bounded LRU of recently seen keys and their access counts.
#[derive(Debug)]
pub struct GhostCache<K> {
    list: IntrusiveList<K>,
    index: FxHashMap<K, GhostEntry>,
    capacity: usize,
}

impl<K> GhostCache<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates a ghost cache holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        let reserve = capacity.min(PREALLOCATE_LIMIT);
        Self {
            list: IntrusiveList::with_capacity(reserve),
            index: FxHashMap::with_capacity_and_hasher(reserve, Default::default()),
            capacity,
        }
    }

    /// Sizes the ghost cache from a byte budget, one slot per `slot_bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `slot_bytes` is zero.
    pub fn with_byte_budget(bytes: u64, slot_bytes: u64) -> Result<Self, ConfigError> {
        if slot_bytes == 0 {
            return Err(ConfigError::new("ghost cache slot size must be greater than zero"));
        }
        let slots = usize::try_from(bytes / slot_bytes).map_err(|_| {
            ConfigError::new(format!("ghost cache budget of {bytes} bytes is too large"))
        })?;
        Ok(Self::new(slots))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Current counter for `key`, without refreshing its recency.
    pub fn count(&self, key: &K) -> Option<u32> {
        self.index.get(key).map(|entry| entry.count)
    }

    /// Records one access to `key` and returns its updated counter.
    ///
    /// At capacity the LRU key is evicted first, even when `key` is already
    /// resident; if that was `key` itself it starts again at 1. With zero
    /// capacity nothing is retained and every call returns 1.
    pub fn record_access(&mut self, key: K) -> u32 {
        if self.capacity == 0 {
            return 1;
        }

        if self.list.len() >= self.capacity
            && let Some(old_key) = self.list.pop_back()
        {
            self.index.remove(&old_key);
        }

        if let Some(entry) = self.index.get_mut(&key) {
            entry.count = entry.count.saturating_add(1);
            self.list.move_to_front(entry.slot);
            return entry.count;
        }

        let slot = self.list.push_front(key.clone());
        self.index.insert(key, GhostEntry { slot, count: 1 });
        1
    }

    /// Forgets `key`; returns `true` if it was tracked.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.index.remove(key) {
            Some(entry) => {
                self.list.remove(entry.slot);
                true
            },
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.list.clear();
        self.index.clear();
    }

    /// Verifies that list and index agree.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        if self.list.len() != self.index.len() {
            return Err(InvariantError::new(format!(
                "ghost list holds {} keys but index holds {}",
                self.list.len(),
                self.index.len()
            )));
        }
        if self.list.len() > self.capacity {
            return Err(InvariantError::new(format!(
                "ghost cache holds {} keys, capacity {}",
                self.list.len(),
                self.capacity
            )));
        }
        for entry in self.index.values() {
            if !self.list.contains(entry.slot) {
                return Err(InvariantError::new(format!(
                    "ghost index points at dead slot {:?}",
                    entry.slot
                )));
            }
            if entry.count == 0 {
                return Err(InvariantError::new("ghost entry with zero count"));
            }
        }
        Ok(())
    }
}
