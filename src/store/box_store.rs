//! Box allocation, sealing and the object index.
//!
//! ## Architecture
//!
//! ```text
//!   open: FxHashMap<bound, CacheBox>          sealed: FxHashMap<BoxId, CacheBox>
//!   ┌────────┬─────────────────────┐          ┌────────┬──────────────────────┐
//!   │   64   │ box 9  (12/100 B)   │          │ box 3  │ {a: 0, b: 40, c: 70} │
//!   │  4096  │ box 11 (90/100 B)   │  seal ─► │ box 7  │ {d: 0}               │
//!   └────────┴─────────────────────┘          └────────┴──────────────────────┘
//!
//!   index: FxHashMap<object id, BoxId>   (sealed residents only)
//!     a ─► 3, b ─► 3, c ─► 3, d ─► 7
//! ```
//!
//! Each size class has at most one open box, created on first use. An append
//! that would overflow the open box seals it first; an append that fills the
//! box exactly seals it right after. Sealed boxes are returned to the caller
//! so it can hand them to the eviction queue, and stay here (for their member
//! list) until [`BoxStore::evict`] destroys them.
//!
//! Objects in an open box are found only through that box's offsets, never
//! through the index.

use std::fmt;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::InvariantError;
use crate::size_class::SizeClassTable;

/// Monotonic box identifier; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoxId(pub u64);

impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "box#{}", self.0)
    }
}

/// Fixed-capacity append-only container for one size class.
#[derive(Debug, Clone)]
pub struct CacheBox {
    id: BoxId,
    bound: u64,
    used: u64,
    offsets: FxHashMap<String, u64>,
}

impl CacheBox {
    fn new(id: BoxId, bound: u64) -> Self {
        Self {
            id,
            bound,
            used: 0,
            offsets: FxHashMap::default(),
        }
    }

    pub fn id(&self) -> BoxId {
        self.id
    }

    /// Size class this box was opened for.
    pub fn bound(&self) -> u64 {
        self.bound
    }

    /// Bytes written so far.
    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.offsets.contains_key(id)
    }

    /// Offset at which `id` was appended.
    pub fn offset_of(&self, id: &str) -> Option<u64> {
        self.offsets.get(id).copied()
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.offsets.keys().map(String::as_str)
    }
}

/// Boxes sealed by a single store operation, oldest first.
///
/// One append can seal at most two boxes: the full box it overflowed, and
/// the fresh box it filled exactly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[must_use = "sealed boxes must be inserted into the eviction queue"]
pub struct SealedBoxes {
    first: Option<BoxId>,
    second: Option<BoxId>,
}

impl SealedBoxes {
    fn push(&mut self, id: BoxId) {
        if self.first.is_none() {
            self.first = Some(id);
        } else {
            debug_assert!(self.second.is_none(), "more than two seals in one operation");
            self.second = Some(id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    pub fn len(&self) -> usize {
        usize::from(self.first.is_some()) + usize::from(self.second.is_some())
    }
}

impl IntoIterator for SealedBoxes {
    type Item = BoxId;
    type IntoIter = std::iter::Flatten<std::array::IntoIter<Option<BoxId>, 2>>;

    fn into_iter(self) -> Self::IntoIter {
        [self.first, self.second].into_iter().flatten()
    }
}

/// Where an append landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub box_id: BoxId,
    pub offset: u64,
    pub sealed: SealedBoxes,
}

/// Owner of open boxes, sealed box contents and the object index.
#[derive(Debug)]
pub struct BoxStore {
    classes: SizeClassTable,
    max_box_size: u64,
    open: FxHashMap<u64, CacheBox>,
    sealed: FxHashMap<BoxId, CacheBox>,
    index: FxHashMap<String, BoxId>,
    next_box_id: u64,
    seals: u64,
    fragmentation_ratio_accum: f64,
    fragmented_bytes: u64,
}

impl BoxStore {
    /// Creates a store routing through `classes` into boxes of `max_box_size` bytes.
    ///
    /// The caller validates that every class fits in a box.
    pub fn new(classes: SizeClassTable, max_box_size: u64) -> Self {
        debug_assert!(classes.max_object_size() <= max_box_size);
        Self {
            open: FxHashMap::with_capacity_and_hasher(classes.len(), Default::default()),
            classes,
            max_box_size,
            sealed: FxHashMap::default(),
            index: FxHashMap::default(),
            next_box_id: 1,
            seals: 0,
            fragmentation_ratio_accum: 0.0,
            fragmented_bytes: 0,
        }
    }

    pub fn classes(&self) -> &SizeClassTable {
        &self.classes
    }

    pub fn max_box_size(&self) -> u64 {
        self.max_box_size
    }

    /// Size class for `size`, or `None` if it exceeds the largest class.
    #[inline]
    pub fn route(&self, size: u64) -> Option<u64> {
        self.classes.route(size)
    }

    /// Returns `true` if `id` sits in the open box of `size_class`.
    #[inline]
    pub fn lookup_open(&self, size_class: u64, id: &str) -> bool {
        self.open
            .get(&size_class)
            .is_some_and(|open_box| open_box.contains(id))
    }

    /// Returns the sealed box holding `id`, if any.
    #[inline]
    pub fn lookup_sealed(&self, id: &str) -> Option<BoxId> {
        self.index.get(id).copied()
    }

    pub fn open_box(&self, size_class: u64) -> Option<&CacheBox> {
        self.open.get(&size_class)
    }

    pub fn open_boxes(&self) -> impl Iterator<Item = &CacheBox> {
        self.open.values()
    }

    pub fn sealed_box(&self, id: BoxId) -> Option<&CacheBox> {
        self.sealed.get(&id)
    }

    /// Number of sealed boxes still resident.
    pub fn sealed_len(&self) -> usize {
        self.sealed.len()
    }

    /// Number of objects reachable through the index.
    pub fn indexed_len(&self) -> usize {
        self.index.len()
    }

    /// Total number of seals since creation.
    pub fn seal_count(&self) -> u64 {
        self.seals
    }

    /// Sum over sealed boxes of `(max_box_size - used) / max_box_size`.
    pub fn fragmentation_ratio_accum(&self) -> f64 {
        self.fragmentation_ratio_accum
    }

    /// Sum over sealed boxes of `max_box_size - used`.
    pub fn fragmented_bytes(&self) -> u64 {
        self.fragmented_bytes
    }

    fn allocate_id(&mut self) -> BoxId {
        let id = BoxId(self.next_box_id);
        self.next_box_id += 1;
        id
    }

    /// Appends `id` to the open box of `size_class`, sealing as needed.
    ///
    /// # Panics
    ///
    /// Panics if `size` exceeds the box capacity; callers route first.
    pub fn append(&mut self, size_class: u64, id: &str, size: u64) -> Placement {
        assert!(
            size <= self.max_box_size,
            "object of {size} bytes cannot fit a {} byte box",
            self.max_box_size
        );
        let mut sealed = SealedBoxes::default();

        let overflows = self
            .open
            .get(&size_class)
            .is_some_and(|open_box| open_box.used + size > self.max_box_size);
        if overflows {
            sealed.push(self.seal(size_class));
        }

        if !self.open.contains_key(&size_class) {
            let box_id = self.allocate_id();
            debug!(%box_id, size_class, "opened box");
            self.open.insert(size_class, CacheBox::new(box_id, size_class));
        }

        let (box_id, offset, full) = {
            let max = self.max_box_size;
            let open_box = self
                .open
                .get_mut(&size_class)
                .expect("open box exists after allocation");
            let offset = open_box.used;
            open_box.offsets.insert(id.to_owned(), offset);
            open_box.used += size;
            (open_box.id, offset, open_box.used == max)
        };

        if full {
            sealed.push(self.seal(size_class));
        }

        Placement {
            box_id,
            offset,
            sealed,
        }
    }

    /// Seals the open box of `size_class`, indexing its members.
    fn seal(&mut self, size_class: u64) -> BoxId {
        let open_box = self
            .open
            .remove(&size_class)
            .expect("sealing a size class without an open box");
        self.seal_box(open_box)
    }

    fn seal_box(&mut self, open_box: CacheBox) -> BoxId {
        let box_id = open_box.id;
        let waste = self.max_box_size - open_box.used;

        self.seals += 1;
        self.fragmented_bytes += waste;
        self.fragmentation_ratio_accum += waste as f64 / self.max_box_size as f64;
        for member in open_box.offsets.keys() {
            self.index.insert(member.clone(), box_id);
        }
        debug!(
            %box_id,
            size_class = open_box.bound,
            objects = open_box.len(),
            used = open_box.used,
            waste,
            "sealed box"
        );

        self.sealed.insert(box_id, open_box);
        box_id
    }

    /// Destroys a sealed box that fell off the cold queue, dropping its
    /// members from the index. Returns the number of objects uncached.
    ///
    /// An index entry is only dropped while it still points at this box; an
    /// id re-sealed into a newer box keeps its newer entry.
    ///
    /// # Panics
    ///
    /// Panics if `box_id` is not a resident sealed box.
    pub fn evict(&mut self, box_id: BoxId) -> usize {
        let evicted = self
            .sealed
            .remove(&box_id)
            .unwrap_or_else(|| panic!("evicting {box_id} which is not sealed"));

        let mut dropped = 0;
        for member in evicted.offsets.keys() {
            if self.index.get(member.as_str()) == Some(&box_id) {
                self.index.remove(member.as_str());
                dropped += 1;
            }
        }
        debug!(%box_id, objects = dropped, "evicted box");
        dropped
    }

    /// Replaces the size-class table, moving every open box to the first new
    /// bound that covers its old bound (or the largest new bound).
    ///
    /// When several open boxes land on the same new bound the fullest one
    /// stays open; the others are sealed if they hold anything, or dropped if
    /// empty. The returned boxes, oldest first, must be queued by the caller.
    #[must_use = "sealed boxes must be inserted into the eviction queue"]
    pub fn remap_classes(&mut self, classes: SizeClassTable) -> Vec<BoxId> {
        let mut regrouped: FxHashMap<u64, Vec<CacheBox>> = FxHashMap::default();
        for (_, open_box) in self.open.drain() {
            regrouped
                .entry(classes.covering(open_box.bound))
                .or_default()
                .push(open_box);
        }
        self.classes = classes;

        let mut sealed = Vec::new();
        for (bound, mut boxes) in regrouped {
            // Fullest last; ties keep the older box open.
            boxes.sort_by(|a, b| a.used.cmp(&b.used).then(b.id.cmp(&a.id)));
            let Some(mut keep) = boxes.pop() else {
                continue;
            };
            for extra in boxes {
                if !extra.is_empty() {
                    sealed.push(self.seal_box(extra));
                }
            }
            debug!(box_id = %keep.id, from = keep.bound, to = bound, "remapped open box");
            keep.bound = bound;
            self.open.insert(bound, keep);
        }
        sealed.sort();
        sealed
    }

    /// Checks the store's own invariants.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        for (bound, open_box) in &self.open {
            if open_box.bound != *bound {
                return Err(InvariantError::new(format!(
                    "{} filed under class {bound} but serves {}",
                    open_box.id, open_box.bound
                )));
            }
            if open_box.used > self.max_box_size {
                return Err(InvariantError::new(format!(
                    "{} holds {} bytes, capacity {}",
                    open_box.id, open_box.used, self.max_box_size
                )));
            }
            if self.sealed.contains_key(&open_box.id) {
                return Err(InvariantError::new(format!(
                    "{} is both open and sealed",
                    open_box.id
                )));
            }
        }
        for (object, box_id) in &self.index {
            let holder = self.sealed.get(box_id).ok_or_else(|| {
                InvariantError::new(format!("{object} indexed to missing {box_id}"))
            })?;
            if !holder.contains(object) {
                return Err(InvariantError::new(format!(
                    "{object} indexed to {box_id} which does not hold it"
                )));
            }
        }
        Ok(())
    }
}
