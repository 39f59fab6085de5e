use crate::engine::EngineCounters;

/// Engine counters plus gauges captured at snapshot time.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct EngineSnapshot {
    pub counters: EngineCounters,

    // gauges
    pub hot_boxes: usize,
    pub cold_boxes: usize,
    pub open_boxes: usize,
    pub indexed_objects: usize,
    pub ghost_entries: usize,

    pub quantum: u64,
    pub admission_balance: i64,
    pub admission_written: u64,
    pub admission_threshold: Option<i64>,
    pub admission_probability: Option<f64>,
}

impl EngineSnapshot {
    /// Final figures of a run.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            waste_cache_ratio: self.counters.fragmentation_ratio(),
            sealed_box_request_ratio: self.counters.sealed_box_ratio(),
            object_hit_ratio: self.counters.hit_ratio(),
            byte_hit_ratio: self.counters.byte_hit_ratio(),
        }
    }
}

/// End-of-run ratios.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// Mean unused share of a sealed box (WCR).
    pub waste_cache_ratio: f64,
    /// Seals per request (SBRR).
    pub sealed_box_request_ratio: f64,
    pub object_hit_ratio: f64,
    pub byte_hit_ratio: f64,
}
