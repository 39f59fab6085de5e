//! Segmented (hot/cold) LRU over sealed boxes.
//!
//! Boxes, not objects, are the unit of recency here: one hit on any object in
//! a sealed box refreshes the whole box. A box that falls off the cold LRU end
//! is gone for good; a box that falls off the hot LRU end gets one more pass
//! through cold.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  positions: FxHashMap<BoxId, QueuePosition { segment, slot }>           │
//! │                                                                         │
//! │   HOT (IntrusiveList<BoxId>)            COLD (IntrusiveList<BoxId>)     │
//! │   ┌───────────────────────────┐         ┌───────────────────────────┐   │
//! │   │ MRU                  LRU  │ demote  │ MRU                  LRU  │   │
//! │   │ [b9] ◄──► [b4] ◄──► [b2] ─┼────────►│ [b7] ◄──► [b3] ◄──► [b1] ─┼─► evicted
//! │   └───────────────────────────┘         └───────────────────────────┘   │
//! │        ▲             ▲                             │                    │
//! │      sealed      hot hit                       cold hit                 │
//! │                   (MRU)  ◄─────────────────────────┘                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Accounting
//!
//! Every box counts as `max_box_size` bytes regardless of its fill. Each
//! segment is capped at `max_cache_size / 2` and checks only its own size:
//! a push that would exceed the cap first moves out that segment's LRU box.
//!
//! ## Operations
//!
//! | Operation          | Time | Notes                                       |
//! |--------------------|------|---------------------------------------------|
//! | `promote_to_hot`   | O(1) | may demote one hot box, which may evict one |
//! | `promote_to_cold`  | O(1) | may evict the cold LRU box                  |
//! | `touch_hit`        | O(1) | hot: reshuffle; cold: remove + promote      |
//!
//! Every operation that can evict returns the evicted [`BoxId`]; the caller
//! must destroy it in the [`BoxStore`](crate::store::BoxStore) before the
//! next request.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ds::intrusive_list::IntrusiveList;
use crate::ds::slot_arena::SlotId;
use crate::error::InvariantError;
use crate::store::BoxId;

/// Which queue a sealed box lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Hot,
    Cold,
}

/// Location of a resident sealed box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePosition {
    pub segment: Segment,
    slot: SlotId,
}

/// Hot/cold LRU of sealed boxes with byte-capped segments.
#[derive(Debug)]
pub struct SegmentedEvictionQueue {
    hot: IntrusiveList<BoxId>,
    cold: IntrusiveList<BoxId>,
    positions: FxHashMap<BoxId, QueuePosition>,
    max_box_size: u64,
    segment_capacity: u64,
}

impl SegmentedEvictionQueue {
    /// Creates a queue for a cache of `max_cache_size` bytes split evenly
    /// between hot and cold.
    ///
    /// The caller guarantees each half can hold at least one box.
    pub fn new(max_cache_size: u64, max_box_size: u64) -> Self {
        let segment_capacity = max_cache_size / 2;
        debug_assert!(max_box_size > 0 && segment_capacity >= max_box_size);
        let boxes = (segment_capacity / max_box_size.max(1)) as usize;
        Self {
            hot: IntrusiveList::with_capacity(boxes),
            cold: IntrusiveList::with_capacity(boxes),
            positions: FxHashMap::with_capacity_and_hasher(boxes * 2, Default::default()),
            max_box_size,
            segment_capacity,
        }
    }

    /// Byte cap of each segment.
    pub fn segment_capacity(&self) -> u64 {
        self.segment_capacity
    }

    pub fn hot_len(&self) -> usize {
        self.hot.len()
    }

    pub fn cold_len(&self) -> usize {
        self.cold.len()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// `hot_len * max_box_size`.
    pub fn hot_size(&self) -> u64 {
        self.hot.len() as u64 * self.max_box_size
    }

    /// `cold_len * max_box_size`.
    pub fn cold_size(&self) -> u64 {
        self.cold.len() as u64 * self.max_box_size
    }

    pub fn position(&self, id: BoxId) -> Option<QueuePosition> {
        self.positions.get(&id).copied()
    }

    pub fn contains(&self, id: BoxId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Hot boxes from MRU to LRU.
    pub fn hot_boxes(&self) -> impl Iterator<Item = BoxId> + '_ {
        self.hot.iter().copied()
    }

    /// Cold boxes from MRU to LRU.
    pub fn cold_boxes(&self) -> impl Iterator<Item = BoxId> + '_ {
        self.cold.iter().copied()
    }

    #[inline]
    fn would_overflow(&self, len: usize) -> bool {
        (len as u64 + 1) * self.max_box_size > self.segment_capacity
    }

    /// Pushes `id` to the hot MRU end, demoting the hot LRU box to cold first
    /// if hot is full. Returns the box evicted from cold by that demotion.
    #[must_use = "an evicted box must be destroyed in the box store"]
    pub fn promote_to_hot(&mut self, id: BoxId) -> Option<BoxId> {
        debug_assert!(!self.contains(id), "{id} is already queued");
        let mut evicted = None;
        if self.would_overflow(self.hot.len())
            && let Some(demoted) = self.hot.pop_back()
        {
            self.positions.remove(&demoted);
            debug!(box_id = %demoted, "demoted hot box to cold");
            evicted = self.promote_to_cold(demoted);
        }

        let slot = self.hot.push_front(id);
        self.positions.insert(
            id,
            QueuePosition {
                segment: Segment::Hot,
                slot,
            },
        );
        evicted
    }

    /// Pushes `id` to the cold MRU end, evicting the cold LRU box first if
    /// cold is full. Returns the evicted box.
    #[must_use = "an evicted box must be destroyed in the box store"]
    pub fn promote_to_cold(&mut self, id: BoxId) -> Option<BoxId> {
        debug_assert!(!self.contains(id), "{id} is already queued");
        let mut evicted = None;
        if self.would_overflow(self.cold.len())
            && let Some(victim) = self.cold.pop_back()
        {
            self.positions.remove(&victim);
            evicted = Some(victim);
        }

        let slot = self.cold.push_front(id);
        self.positions.insert(
            id,
            QueuePosition {
                segment: Segment::Cold,
                slot,
            },
        );
        evicted
    }

    /// Records a hit on a resident box.
    ///
    /// A hot box moves to the hot MRU end. A cold box leaves cold and is
    /// promoted to hot, which can cascade into one demotion and one eviction.
    ///
    /// # Panics
    ///
    /// Panics if `id` has no queue position: a sealed box must always be
    /// queued, so this means the index and queue have desynchronized.
    #[must_use = "an evicted box must be destroyed in the box store"]
    pub fn touch_hit(&mut self, id: BoxId) -> Option<BoxId> {
        let Some(position) = self.positions.get(&id).copied() else {
            panic!("sealed {id} has no queue position");
        };
        match position.segment {
            Segment::Hot => {
                self.hot.move_to_front(position.slot);
                None
            },
            Segment::Cold => {
                self.cold.remove(position.slot);
                self.positions.remove(&id);
                self.promote_to_hot(id)
            },
        }
    }

    /// Validates list/position agreement and the per-segment byte caps.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        if self.hot.len() + self.cold.len() != self.positions.len() {
            return Err(InvariantError::new(format!(
                "hot {} + cold {} boxes but {} positions",
                self.hot.len(),
                self.cold.len(),
                self.positions.len()
            )));
        }
        if self.hot_size() > self.segment_capacity {
            return Err(InvariantError::new(format!(
                "hot size {} exceeds {}",
                self.hot_size(),
                self.segment_capacity
            )));
        }
        if self.cold_size() > self.segment_capacity {
            return Err(InvariantError::new(format!(
                "cold size {} exceeds {}",
                self.cold_size(),
                self.segment_capacity
            )));
        }
        for (id, position) in &self.positions {
            let list = match position.segment {
                Segment::Hot => &self.hot,
                Segment::Cold => &self.cold,
            };
            if list.get(position.slot) != Some(id) {
                return Err(InvariantError::new(format!(
                    "{id} position {:?} does not point at it",
                    position.segment
                )));
            }
        }
        Ok(())
    }
}
