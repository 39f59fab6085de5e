pub use crate::admission::{AdmissionConfig, AdmissionController, AdmissionPolicy};
pub use crate::builder::EngineBuilder;
pub use crate::ds::{GhostCache, IntrusiveList, SlotArena, SlotId};
pub use crate::engine::{CacheEngine, EngineCounters, RequestOutcome};
pub use crate::error::{ConfigError, InvariantError};
pub use crate::metrics::{
    EngineSnapshot, MetricsExporter, MetricsSnapshotProvider, PrometheusTextExporter, RunSummary,
    StatsSeries,
};
pub use crate::policy::{Segment, SegmentedEvictionQueue};
pub use crate::size_class::{SizeClassTable, SizeHistogram};
pub use crate::store::{BoxId, BoxStore, CacheBox};
pub use crate::trace::{TraceReader, TraceRequest};
