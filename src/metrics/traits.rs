//! # Metrics Traits
//!
//! Snapshotting and export are split so the engine never knows where its
//! numbers go.
//!
//! ```text
//!   CacheEngine ──► MetricsSnapshotProvider<EngineSnapshot>
//!                                │
//!             ┌──────────────────┴──────────────────┐
//!             ▼                                     ▼
//!        StatsSeries                     MetricsExporter<EngineSnapshot>
//!   (periodic sampling)                  (PrometheusTextExporter, ...)
//! ```

/// Produce a point-in-time copy of metrics.
pub trait MetricsSnapshotProvider<S> {
    fn snapshot(&self) -> S;
}

/// Export/publish metrics to monitoring backends.
pub trait MetricsExporter<S> {
    fn export(&self, snapshot: &S);
}
