//! Periodic samples of the engine's running ratios.

use crate::engine::EngineCounters;

/// One point of the time series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSample {
    pub requests: u64,
    pub sealed_box_ratio: f64,
    pub seals: u64,
    pub hit_ratio: f64,
    pub byte_hit_ratio: f64,
}

/// Samples counters every `sample_every` requests.
///
/// The engine does not sample itself; the replay loop feeds counters in
/// after each request and the series keeps the ones on the cadence.
#[derive(Debug, Clone)]
pub struct StatsSeries {
    sample_every: u64,
    samples: Vec<SeriesSample>,
}

impl StatsSeries {
    /// A `sample_every` of zero disables sampling.
    pub fn new(sample_every: u64) -> Self {
        Self {
            sample_every,
            samples: Vec::new(),
        }
    }

    pub fn sample_every(&self) -> u64 {
        self.sample_every
    }

    /// Records a sample if the request count is on the cadence. Returns
    /// whether one was taken.
    pub fn observe(&mut self, counters: &EngineCounters) -> bool {
        let requests = counters.num_requests;
        if self.sample_every == 0 || requests == 0 || requests % self.sample_every != 0 {
            return false;
        }
        if self.samples.last().is_some_and(|last| last.requests == requests) {
            return false;
        }
        self.samples.push(SeriesSample {
            requests,
            sealed_box_ratio: counters.sealed_box_ratio(),
            seals: counters.num_seals,
            hit_ratio: counters.hit_ratio(),
            byte_hit_ratio: counters.byte_hit_ratio(),
        });
        true
    }

    pub fn samples(&self) -> &[SeriesSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Writes the samples as CSV with a header row.
    pub fn write_csv<W: std::io::Write>(&self, mut out: W) -> std::io::Result<()> {
        writeln!(out, "requests,sealed_box_ratio,seals,hit_ratio,byte_hit_ratio")?;
        for s in &self.samples {
            writeln!(
                out,
                "{},{},{},{},{}",
                s.requests, s.sealed_box_ratio, s.seals, s.hit_ratio, s.byte_hit_ratio
            )?;
        }
        Ok(())
    }
}
