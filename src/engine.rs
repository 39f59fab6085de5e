//! Request processing: the single owner of every cache structure.
//!
//! ## Architecture
//!
//! ```text
//!   request(id, size)
//!      │
//!      ├─ advance quantum clock
//!      ├─ route size ──────────────── none ──► Unroutable
//!      ├─ open box of class holds id ───────► HitOpen
//!      ├─ index holds id ──► touch_hit ─────► HitSealed   (may demote + evict)
//!      └─ miss ──► AdmissionController::decide
//!                    ├─ reject ─────────────► MissRejected
//!                    └─ admit ──► BoxStore::append
//!                                   └─ each sealed box ──► promote_to_hot
//!                                                            └─ evicted ──► BoxStore::evict
//!                                            ─────────────► MissAdmitted
//! ```
//!
//! Hit counters are recorded before the promotion cascade runs, so a hit
//! that evicts an unrelated box is still a hit.
//!
//! ## Example Usage
//!
//! ```
//! use flashbox::builder::EngineBuilder;
//! use flashbox::engine::RequestOutcome;
//!
//! let mut engine = EngineBuilder::new(400)
//!     .max_box_size(100)
//!     .size_classes(vec![100])
//!     .build();
//!
//! assert!(matches!(engine.request("a", 60), RequestOutcome::MissAdmitted(_)));
//! assert_eq!(engine.request("a", 60), RequestOutcome::HitOpen);
//! assert_eq!(engine.request("huge", 101), RequestOutcome::Unroutable);
//! assert_eq!(engine.counters().num_requests, 3);
//! ```

use tracing::{debug, trace};

use crate::admission::AdmissionController;
use crate::ds::GhostCache;
use crate::error::{ConfigError, InvariantError};
use crate::metrics::snapshot::EngineSnapshot;
use crate::metrics::traits::MetricsSnapshotProvider;
use crate::policy::SegmentedEvictionQueue;
use crate::size_class::{SizeClassTable, SizeHistogram};
use crate::store::{BoxId, BoxStore};

/// What happened to one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Found in the open box of its size class.
    HitOpen,
    /// Found in a sealed box, which was touched in the eviction queue.
    HitSealed(BoxId),
    /// Missed and written into the given box.
    MissAdmitted(BoxId),
    /// Missed and refused by admission control.
    MissRejected,
    /// Larger than the largest size class.
    Unroutable,
}

impl RequestOutcome {
    pub fn is_hit(self) -> bool {
        matches!(self, RequestOutcome::HitOpen | RequestOutcome::HitSealed(_))
    }
}

/// Running totals exposed after every request.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct EngineCounters {
    pub num_requests: u64,
    pub request_bytes: u64,
    pub hits: u64,
    pub hit_bytes: u64,
    pub open_hits: u64,
    pub sealed_hits: u64,
    pub miss_admitted: u64,
    pub admitted_bytes: u64,
    pub miss_rejected: u64,
    pub unroutable: u64,
    pub num_seals: u64,
    /// Sum over seals of `(max_box_size - used) / max_box_size`.
    pub fragmentation_ratio_accum: f64,
    pub fragmented_bytes: u64,
    pub evicted_boxes: u64,
    pub evicted_objects: u64,
}

impl EngineCounters {
    /// Object hit ratio.
    pub fn hit_ratio(&self) -> f64 {
        ratio(self.hits as f64, self.num_requests)
    }

    pub fn byte_hit_ratio(&self) -> f64 {
        ratio(self.hit_bytes as f64, self.request_bytes)
    }

    /// Mean unused share of a sealed box; 0 before the first seal.
    pub fn fragmentation_ratio(&self) -> f64 {
        ratio(self.fragmentation_ratio_accum, self.num_seals)
    }

    /// Seals per request.
    pub fn sealed_box_ratio(&self) -> f64 {
        ratio(self.num_seals as f64, self.num_requests)
    }

    pub fn misses(&self) -> u64 {
        self.miss_admitted + self.miss_rejected
    }
}

fn ratio(numerator: f64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

/// Flash cache simulator instance.
///
/// Built through [`EngineBuilder`](crate::builder::EngineBuilder). Every
/// structure is owned here, so independent engines share nothing.
#[derive(Debug)]
pub struct CacheEngine {
    store: BoxStore,
    queue: SegmentedEvictionQueue,
    admission: AdmissionController,
    ghost: GhostCache<String>,
    histogram: Option<SizeHistogram>,
    counters: EngineCounters,
}

impl CacheEngine {
    pub(crate) fn from_parts(
        store: BoxStore,
        queue: SegmentedEvictionQueue,
        admission: AdmissionController,
        ghost: GhostCache<String>,
        histogram: Option<SizeHistogram>,
    ) -> Self {
        Self {
            store,
            queue,
            admission,
            ghost,
            histogram,
            counters: EngineCounters::default(),
        }
    }

    /// Processes one request.
    pub fn request(&mut self, id: &str, size: u64) -> RequestOutcome {
        self.counters.num_requests += 1;
        self.counters.request_bytes = self.counters.request_bytes.saturating_add(size);
        self.admission.advance(self.counters.num_requests);

        let Some(size_class) = self.store.route(size) else {
            self.counters.unroutable += 1;
            trace!(id, size, "unroutable request");
            return RequestOutcome::Unroutable;
        };
        if let Some(histogram) = &mut self.histogram {
            histogram.record(size);
        }

        if self.store.lookup_open(size_class, id) {
            self.record_hit(size);
            self.counters.open_hits += 1;
            trace!(id, size, size_class, "open box hit");
            return RequestOutcome::HitOpen;
        }

        if let Some(box_id) = self.store.lookup_sealed(id) {
            self.record_hit(size);
            self.counters.sealed_hits += 1;
            trace!(id, size, %box_id, "sealed box hit");
            if let Some(evicted) = self.queue.touch_hit(box_id) {
                self.destroy(evicted);
            }
            return RequestOutcome::HitSealed(box_id);
        }

        if !self.admission.decide(id, size, &mut self.ghost) {
            self.counters.miss_rejected += 1;
            trace!(id, size, "miss rejected");
            return RequestOutcome::MissRejected;
        }

        self.counters.miss_admitted += 1;
        self.counters.admitted_bytes = self.counters.admitted_bytes.saturating_add(size);
        let placement = self.store.append(size_class, id, size);
        trace!(id, size, box_id = %placement.box_id, offset = placement.offset, "miss admitted");
        for sealed in placement.sealed {
            self.enqueue_sealed(sealed);
        }
        RequestOutcome::MissAdmitted(placement.box_id)
    }

    fn record_hit(&mut self, size: u64) {
        self.counters.hits += 1;
        self.counters.hit_bytes = self.counters.hit_bytes.saturating_add(size);
    }

    fn enqueue_sealed(&mut self, box_id: BoxId) {
        if let Some(evicted) = self.queue.promote_to_hot(box_id) {
            self.destroy(evicted);
        }
    }

    fn destroy(&mut self, box_id: BoxId) {
        let dropped = self.store.evict(box_id);
        self.counters.evicted_boxes += 1;
        self.counters.evicted_objects += dropped as u64;
        debug!(%box_id, objects = dropped, "box left the cold queue");
    }

    /// Replaces the size-class bounds, remapping open boxes without losing
    /// their contents.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `bounds` is not a valid table or its
    /// largest bound exceeds the box size.
    pub fn update_size_classes(&mut self, bounds: Vec<u64>) -> Result<(), ConfigError> {
        let table = SizeClassTable::try_new(bounds)?;
        self.apply_size_classes(table)
    }

    /// Rederives `classes` bounds from the recorded size histogram and
    /// applies them. The largest bound stays where it is.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the histogram is disabled or empty.
    pub fn rebalance_size_classes(&mut self, classes: usize) -> Result<(), ConfigError> {
        let Some(histogram) = &self.histogram else {
            return Err(ConfigError::new("size histogram is not enabled"));
        };
        let max_object_size = self.store.classes().max_object_size();
        let table = histogram.equal_population_bounds(classes, max_object_size)?;
        self.apply_size_classes(table)
    }

    fn apply_size_classes(&mut self, table: SizeClassTable) -> Result<(), ConfigError> {
        if table.max_object_size() > self.store.max_box_size() {
            return Err(ConfigError::new(format!(
                "largest size class {} exceeds box size {}",
                table.max_object_size(),
                self.store.max_box_size()
            )));
        }
        debug!(bounds = ?table.bounds(), "updating size classes");
        for sealed in self.store.remap_classes(table) {
            self.enqueue_sealed(sealed);
        }
        Ok(())
    }

    /// Counters including the store's seal and fragmentation totals.
    pub fn counters(&self) -> EngineCounters {
        EngineCounters {
            num_seals: self.store.seal_count(),
            fragmentation_ratio_accum: self.store.fragmentation_ratio_accum(),
            fragmented_bytes: self.store.fragmented_bytes(),
            ..self.counters
        }
    }

    pub fn store(&self) -> &BoxStore {
        &self.store
    }

    pub fn queue(&self) -> &SegmentedEvictionQueue {
        &self.queue
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn ghost(&self) -> &GhostCache<String> {
        &self.ghost
    }

    pub fn histogram(&self) -> Option<&SizeHistogram> {
        self.histogram.as_ref()
    }

    /// Cross-checks store, queue and ghost cache.
    ///
    /// Every sealed box must be queued and every queued box sealed.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.store.check_invariants()?;
        self.queue.check_invariants()?;
        self.ghost.check_invariants()?;

        if self.store.sealed_len() != self.queue.len() {
            return Err(InvariantError::new(format!(
                "{} sealed boxes but {} queued",
                self.store.sealed_len(),
                self.queue.len()
            )));
        }
        for box_id in self.queue.hot_boxes().chain(self.queue.cold_boxes()) {
            if self.store.sealed_box(box_id).is_none() {
                return Err(InvariantError::new(format!(
                    "{box_id} is queued but not sealed"
                )));
            }
        }
        for open_box in self.store.open_boxes() {
            if self.queue.contains(open_box.id()) {
                return Err(InvariantError::new(format!(
                    "open {} is queued",
                    open_box.id()
                )));
            }
        }
        let c = &self.counters;
        if c.hits + c.miss_admitted + c.miss_rejected + c.unroutable != c.num_requests {
            return Err(InvariantError::new(format!(
                "outcomes do not sum to {} requests",
                c.num_requests
            )));
        }
        Ok(())
    }
}

impl MetricsSnapshotProvider<EngineSnapshot> for CacheEngine {
    fn snapshot(&self) -> EngineSnapshot {
        let budget = self.admission.budget();
        EngineSnapshot {
            counters: self.counters(),
            hot_boxes: self.queue.hot_len(),
            cold_boxes: self.queue.cold_len(),
            open_boxes: self.store.open_boxes().count(),
            indexed_objects: self.store.indexed_len(),
            ghost_entries: self.ghost.len(),
            quantum: self.admission.quantum(),
            admission_balance: budget.balance(),
            admission_written: budget.written(),
            admission_threshold: self.admission.threshold(),
            admission_probability: self.admission.probability(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{AdmissionConfig, AdmissionPolicy};
    use crate::builder::EngineBuilder;

    fn small_engine() -> CacheEngine {
        EngineBuilder::new(400)
            .max_box_size(100)
            .size_classes(vec![50, 100])
            .build()
    }

    #[test]
    fn open_hit_then_sealed_hit() {
        let mut engine = small_engine();
        let RequestOutcome::MissAdmitted(first) = engine.request("a", 60) else {
            panic!("expected admission");
        };
        assert_eq!(engine.request("a", 60), RequestOutcome::HitOpen);

        // overflow seals the box holding a
        engine.request("b", 60);
        assert_eq!(engine.request("a", 60), RequestOutcome::HitSealed(first));
        assert_eq!(engine.counters().hits, 2);
        assert_eq!(engine.counters().sealed_hits, 1);
        engine.check_invariants().unwrap();
    }

    #[test]
    fn unroutable_only_counts_the_request() {
        let mut engine = small_engine();
        assert_eq!(engine.request("big", 101), RequestOutcome::Unroutable);
        let counters = engine.counters();
        assert_eq!(counters.num_requests, 1);
        assert_eq!(counters.unroutable, 1);
        assert_eq!(counters.hits + counters.misses(), 0);
        assert_eq!(engine.store().open_boxes().count(), 0);
    }

    #[test]
    fn oversized_requests_saturate_request_bytes() {
        let mut engine = small_engine();
        assert_eq!(engine.request("a", u64::MAX), RequestOutcome::Unroutable);
        assert_eq!(engine.request("b", u64::MAX), RequestOutcome::Unroutable);
        let counters = engine.counters();
        assert_eq!(counters.num_requests, 2);
        assert_eq!(counters.unroutable, 2);
        assert_eq!(counters.request_bytes, u64::MAX);
        assert_eq!(counters.hit_bytes, 0);
        engine.check_invariants().unwrap();
    }

    #[test]
    fn rejected_miss_writes_nothing() {
        let mut engine = EngineBuilder::new(400)
            .max_box_size(100)
            .size_classes(vec![100])
            .admission(
                AdmissionConfig::new(AdmissionPolicy::Linear, 10)
                    .warmup_quanta(0)
                    .k(1),
            )
            .build();
        assert!(matches!(engine.request("a", 20), RequestOutcome::MissAdmitted(_)));
        // written 20 >= quota 10, p < 0
        assert_eq!(engine.request("b", 20), RequestOutcome::MissRejected);
        assert_eq!(engine.request("b", 20), RequestOutcome::MissRejected);
        assert_eq!(engine.counters().miss_rejected, 2);
        assert_eq!(engine.store().open_box(100).map(|b| b.len()), Some(1));
    }

    #[test]
    fn fragmentation_ratio_is_zero_without_seals() {
        let mut engine = small_engine();
        engine.request("a", 10);
        assert_eq!(engine.counters().fragmentation_ratio(), 0.0);
        assert_eq!(engine.counters().sealed_box_ratio(), 0.0);
    }

    #[test]
    fn fragmentation_accumulates_waste_share() {
        let mut engine = small_engine();
        engine.request("a", 60);
        engine.request("b", 60);
        let counters = engine.counters();
        assert_eq!(counters.num_seals, 1);
        assert_eq!(counters.fragmented_bytes, 40);
        assert!((counters.fragmentation_ratio() - 0.4).abs() < 1e-12);
        assert!((counters.sealed_box_ratio() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn update_size_classes_keeps_open_content() {
        let mut engine = small_engine();
        engine.request("a", 30);
        engine.request("b", 80);
        engine.update_size_classes(vec![100]).unwrap();

        // the fuller box stays open under 100, the other one is sealed
        assert_eq!(engine.request("b", 80), RequestOutcome::HitOpen);
        assert!(matches!(engine.request("a", 30), RequestOutcome::HitSealed(_)));
        assert_eq!(engine.queue().hot_len(), 1);
        engine.check_invariants().unwrap();
    }

    #[test]
    fn update_size_classes_rejects_oversized_bound() {
        let mut engine = small_engine();
        let err = engine.update_size_classes(vec![50, 200]).unwrap_err();
        assert!(err.to_string().contains("box size"));
        assert!(engine.update_size_classes(vec![100, 50]).is_err());
    }

    #[test]
    fn rebalance_needs_histogram() {
        let mut engine = small_engine();
        assert!(engine.rebalance_size_classes(2).is_err());

        let mut engine = EngineBuilder::new(400)
            .max_box_size(100)
            .size_classes(vec![100])
            .record_size_histogram(true)
            .build();
        for (n, size) in [4u64, 4, 4, 90, 90, 90].into_iter().enumerate() {
            engine.request(&n.to_string(), size);
        }
        engine.rebalance_size_classes(2).unwrap();
        assert_eq!(engine.store().classes().bounds(), &[4, 100]);
    }

    #[test]
    fn snapshot_reports_gauges() {
        let mut engine = small_engine();
        engine.request("a", 60);
        engine.request("b", 60);
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.counters.num_requests, 2);
        assert_eq!(snapshot.hot_boxes, 1);
        assert_eq!(snapshot.open_boxes, 1);
        assert_eq!(snapshot.indexed_objects, 1);
        assert_eq!(snapshot.admission_probability, Some(1.0));
    }
}
