pub mod exporter;
pub mod series;
pub mod snapshot;
pub mod traits;

pub use exporter::PrometheusTextExporter;
pub use series::{SeriesSample, StatsSeries};
pub use snapshot::{EngineSnapshot, RunSummary};
pub use traits::{MetricsExporter, MetricsSnapshotProvider};
