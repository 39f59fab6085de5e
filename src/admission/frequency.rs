//! Interval-tracked frequency threshold admission.
//!
//! Bytes admitted in a quantum are measured in multiples of the quota
//! ("intervals"). Once past the first boundary, a miss is only admitted when
//! the ghost cache has seen its id often enough; the required count rises by
//! one for each quota's worth of bytes already admitted.

use crate::ds::GhostCache;
use crate::error::ConfigError;

/// Threshold value that freezes admission for the whole quantum.
pub const FROZEN: i64 = -1;

#[derive(Debug, Clone)]
pub struct FrequencyThreshold {
    boundaries: Vec<u64>,
    threshold: i64,
    current_interval: u64,
}

impl FrequencyThreshold {
    /// Boundaries are `[1, 1 + base, 1 + 2*base, ..., 1 + interval*base]`
    /// with `base = (k - 1) / interval`.
    pub fn try_new(k: u32, interval: u32) -> Result<Self, ConfigError> {
        if interval == 0 {
            return Err(ConfigError::new("frequency threshold interval must be > 0"));
        }
        let base = u64::from(k.saturating_sub(1)) / u64::from(interval);
        if base < 1 {
            return Err(ConfigError::new(format!(
                "frequency threshold needs (k - 1) / interval >= 1, got k={k} interval={interval}"
            )));
        }
        let boundaries = std::iter::once(1)
            .chain((1..=u64::from(interval)).map(|n| 1 + n * base))
            .collect();
        Ok(Self {
            boundaries,
            threshold: 0,
            current_interval: 1,
        })
    }

    pub fn boundaries(&self) -> &[u64] {
        &self.boundaries
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    pub fn current_interval(&self) -> u64 {
        self.current_interval
    }

    fn in_first_segment(&self) -> bool {
        self.current_interval <= self.boundaries[1]
    }

    /// Frequency gate for a miss. Outside the first segment the ghost cache
    /// is charged with one access for `id`.
    pub fn admits(&self, id: &str, ghost: &mut GhostCache<String>) -> bool {
        if self.threshold == FROZEN {
            return false;
        }
        if self.in_first_segment() {
            return true;
        }
        let seen = ghost.record_access(id.to_owned());
        seen > 1 && i64::from(seen - 1) >= self.threshold
    }

    /// Moves to the next interval once `written` passes the current one.
    pub fn record_admit(&mut self, written: u64, quota: u64) {
        if written > self.current_interval.saturating_mul(quota) {
            self.current_interval += 1;
            self.threshold += 1;
        }
    }

    /// Derives the next quantum's threshold from where the finished quantum
    /// ended, then restarts interval tracking.
    pub fn rollover(&mut self, balance: i64) -> i64 {
        let len = self.boundaries.len();
        self.threshold = if balance <= 0 {
            FROZEN
        } else if self.in_first_segment() {
            0
        } else if self.current_interval <= self.boundaries[len - 2] {
            self.current_interval as i64 - 1
        } else {
            FROZEN
        };
        self.current_interval = 1;
        self.threshold
    }
}
