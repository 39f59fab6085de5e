use std::fmt::Display;
use std::io::Write;
use std::sync::Mutex;

use crate::metrics::snapshot::{EngineSnapshot, RunSummary};
use crate::metrics::traits::MetricsExporter;

/// Prometheus text exporter for engine snapshots.
///
/// Writes the Prometheus text exposition format so a replay can be scraped
/// or pushed to a gateway.
#[derive(Debug)]
pub struct PrometheusTextExporter<W: Write + Send + Sync> {
    prefix: String,
    writer: Mutex<W>,
}

impl<W: Write + Send + Sync> PrometheusTextExporter<W> {
    pub fn new(prefix: impl Into<String>, writer: W) -> Self {
        Self {
            prefix: prefix.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_metric(&self, kind: &str, name: &str, value: impl Display) {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = writeln!(writer, "# TYPE {} {}", name, kind);
        let _ = writeln!(writer, "{} {}", name, value);
    }

    fn write_counter(&self, suffix: &str, value: u64) {
        self.write_metric("counter", &self.metric_name(suffix), value);
    }

    fn write_gauge(&self, suffix: &str, value: impl Display) {
        self.write_metric("gauge", &self.metric_name(suffix), value);
    }

    fn metric_name(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", self.prefix, suffix)
        }
    }
}

impl<W: Write + Send + Sync> MetricsExporter<EngineSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &EngineSnapshot) {
        let c = &snapshot.counters;
        self.write_counter("requests_total", c.num_requests);
        self.write_counter("request_bytes_total", c.request_bytes);
        self.write_counter("hits_total", c.hits);
        self.write_counter("hit_bytes_total", c.hit_bytes);
        self.write_counter("open_hits_total", c.open_hits);
        self.write_counter("sealed_hits_total", c.sealed_hits);
        self.write_counter("misses_admitted_total", c.miss_admitted);
        self.write_counter("admitted_bytes_total", c.admitted_bytes);
        self.write_counter("misses_rejected_total", c.miss_rejected);
        self.write_counter("unroutable_total", c.unroutable);
        self.write_counter("seals_total", c.num_seals);
        self.write_counter("fragmented_bytes_total", c.fragmented_bytes);
        self.write_counter("evicted_boxes_total", c.evicted_boxes);
        self.write_counter("evicted_objects_total", c.evicted_objects);

        self.write_gauge("hot_boxes", snapshot.hot_boxes);
        self.write_gauge("cold_boxes", snapshot.cold_boxes);
        self.write_gauge("open_boxes", snapshot.open_boxes);
        self.write_gauge("indexed_objects", snapshot.indexed_objects);
        self.write_gauge("ghost_entries", snapshot.ghost_entries);
        self.write_gauge("admission_quantum", snapshot.quantum);
        self.write_gauge("admission_balance_bytes", snapshot.admission_balance);
        self.write_gauge("admission_written_bytes", snapshot.admission_written);
        if let Some(threshold) = snapshot.admission_threshold {
            self.write_gauge("admission_threshold", threshold);
        }
        if let Some(p) = snapshot.admission_probability.filter(|p| p.is_finite()) {
            self.write_gauge("admission_probability", p);
        }
    }
}

impl<W: Write + Send + Sync> MetricsExporter<RunSummary> for PrometheusTextExporter<W> {
    fn export(&self, summary: &RunSummary) {
        self.write_gauge("waste_cache_ratio", summary.waste_cache_ratio);
        self.write_gauge("sealed_box_request_ratio", summary.sealed_box_request_ratio);
        self.write_gauge("object_hit_ratio", summary.object_hit_ratio);
        self.write_gauge("byte_hit_ratio", summary.byte_hit_ratio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineCounters;

    fn render<S>(prefix: &str, value: &S) -> String
    where
        PrometheusTextExporter<Vec<u8>>: MetricsExporter<S>,
    {
        let exporter = PrometheusTextExporter::new(prefix, Vec::new());
        exporter.export(value);
        String::from_utf8(exporter.into_inner()).unwrap()
    }

    #[test]
    fn exports_counters_and_gauges_with_prefix() {
        let snapshot = EngineSnapshot {
            counters: EngineCounters {
                num_requests: 12,
                hits: 5,
                ..EngineCounters::default()
            },
            hot_boxes: 3,
            admission_balance: -40,
            admission_threshold: Some(2),
            ..EngineSnapshot::default()
        };
        let text = render("flashbox", &snapshot);
        assert!(text.contains("# TYPE flashbox_requests_total counter\nflashbox_requests_total 12\n"));
        assert!(text.contains("flashbox_hits_total 5\n"));
        assert!(text.contains("# TYPE flashbox_hot_boxes gauge\nflashbox_hot_boxes 3\n"));
        assert!(text.contains("flashbox_admission_balance_bytes -40\n"));
        assert!(text.contains("flashbox_admission_threshold 2\n"));
        assert!(!text.contains("admission_probability"));
    }

    #[test]
    fn skips_undefined_probability() {
        let snapshot = EngineSnapshot {
            admission_probability: Some(f64::NAN),
            ..EngineSnapshot::default()
        };
        assert!(!render("", &snapshot).contains("admission_probability"));
    }

    #[test]
    fn exports_run_summary_without_prefix() {
        let summary = RunSummary {
            object_hit_ratio: 0.5,
            ..RunSummary::default()
        };
        let text = render("", &summary);
        assert!(text.contains("object_hit_ratio 0.5\n"));
        assert!(text.starts_with("# TYPE waste_cache_ratio gauge\n"));
    }
}
