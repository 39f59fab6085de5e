//! Size-class routing.
//!
//! A size class is identified by its upper bound. An object of `size` bytes
//! belongs to the first bound `>= size`; sizes above the largest bound are
//! unroutable and never touch the cache.
//!
//! Two ways of deriving bounds are provided:
//!
//! - [`SizeClassTable::equal_log`]: static, splits the bit length of the
//!   maximum object size into equal shares.
//! - [`SizeHistogram::equal_population_bounds`]: dynamic, picks bounds so each
//!   class receives roughly the same number of observed requests. The caller
//!   hands the result to
//!   [`CacheEngine::update_size_classes`](crate::engine::CacheEngine::update_size_classes).
//!
//! ## Example
//!
//! ```
//! use flashbox::size_class::SizeClassTable;
//!
//! let table = SizeClassTable::equal_log(1 << 20, 4).unwrap();
//! assert_eq!(table.bounds(), &[32, 1024, 32768, 1 << 20]);
//! assert_eq!(table.route(100), Some(1024));
//! assert_eq!(table.route((1 << 20) + 1), None);
//! ```

use crate::error::ConfigError;

/// Ordered, strictly ascending list of size-class upper bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeClassTable {
    bounds: Vec<u64>,
}

impl SizeClassTable {
    /// Builds a table from explicit upper bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `bounds` is empty, contains zero, or is not
    /// strictly ascending.
    pub fn try_new(bounds: Vec<u64>) -> Result<Self, ConfigError> {
        if bounds.is_empty() {
            return Err(ConfigError::new("at least one size class is required"));
        }
        if bounds[0] == 0 {
            return Err(ConfigError::new("size class bounds must be greater than zero"));
        }
        if let Some(pair) = bounds.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(ConfigError::new(format!(
                "size class bounds must be strictly ascending, got {} then {}",
                pair[0], pair[1]
            )));
        }
        Ok(Self { bounds })
    }

    /// Splits the bit length of `max_object_size` into `classes` equal
    /// shares: bounds are `2^(base * (i + 1))` for the first `classes - 1`
    /// classes, and `max_object_size` for the last.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `classes` or `max_object_size` is zero, or
    /// if `max_object_size` is too small to produce distinct bounds.
    pub fn equal_log(max_object_size: u64, classes: usize) -> Result<Self, ConfigError> {
        if classes == 0 {
            return Err(ConfigError::new("number of size classes must be greater than zero"));
        }
        if max_object_size == 0 {
            return Err(ConfigError::new("max object size must be greater than zero"));
        }
        let digits = u64::BITS - max_object_size.leading_zeros();
        let base = digits / classes as u32;

        let mut bounds = Vec::with_capacity(classes);
        for index in 0..classes as u32 - 1 {
            bounds.push(1u64 << (base * (index + 1)));
        }
        bounds.push(max_object_size);

        Self::try_new(bounds).map_err(|err| {
            ConfigError::new(format!(
                "{classes} equal-log classes do not fit max object size {max_object_size}: {err}"
            ))
        })
    }

    /// Returns the size class serving `size`, or `None` if unroutable.
    #[inline]
    pub fn route(&self, size: u64) -> Option<u64> {
        let idx = self.bounds.partition_point(|&bound| bound < size);
        self.bounds.get(idx).copied()
    }

    /// Returns the first bound `>= bound`, falling back to the largest bound.
    pub fn covering(&self, bound: u64) -> u64 {
        self.route(bound).unwrap_or_else(|| self.max_object_size())
    }

    pub fn bounds(&self) -> &[u64] {
        &self.bounds
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Largest routable object size.
    pub fn max_object_size(&self) -> u64 {
        self.bounds.last().copied().unwrap_or(0)
    }
}

const HISTOGRAM_BUCKETS: usize = u64::BITS as usize + 1;

/// Power-of-two histogram of requested object sizes.
///
/// Bucket `k` counts sizes in `(2^(k-1), 2^k]`; sizes 0 and 1 land in bucket 0.
#[derive(Debug, Clone)]
pub struct SizeHistogram {
    buckets: [u64; HISTOGRAM_BUCKETS],
    total: u64,
}

impl SizeHistogram {
    pub fn new() -> Self {
        Self {
            buckets: [0; HISTOGRAM_BUCKETS],
            total: 0,
        }
    }

    #[inline]
    fn bucket_of(size: u64) -> usize {
        if size <= 1 {
            0
        } else {
            (u64::BITS - (size - 1).leading_zeros()) as usize
        }
    }

    fn bucket_bound(bucket: usize) -> u64 {
        if bucket >= u64::BITS as usize {
            u64::MAX
        } else {
            1u64 << bucket
        }
    }

    pub fn record(&mut self, size: u64) {
        self.buckets[Self::bucket_of(size)] += 1;
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of samples whose bucket upper bound is `2^bucket`.
    pub fn bucket_count(&self, bucket: usize) -> u64 {
        self.buckets.get(bucket).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.buckets = [0; HISTOGRAM_BUCKETS];
        self.total = 0;
    }

    /// Derives bounds that give each of `classes` classes a roughly equal
    /// share of the recorded samples. Adjacent shares that fall in the same
    /// bucket collapse, so fewer classes than requested may come back. The
    /// last bound is always `max_object_size`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if no samples were recorded, or `classes` or
    /// `max_object_size` is zero.
    pub fn equal_population_bounds(
        &self,
        classes: usize,
        max_object_size: u64,
    ) -> Result<SizeClassTable, ConfigError> {
        if self.total == 0 {
            return Err(ConfigError::new("size histogram is empty"));
        }
        if classes == 0 || max_object_size == 0 {
            return Err(ConfigError::new(
                "classes and max object size must be greater than zero",
            ));
        }

        let mut bounds: Vec<u64> = Vec::with_capacity(classes);
        for share in 1..classes as u128 {
            let target = (self.total as u128 * share).div_ceil(classes as u128);
            let mut cumulative = 0u128;
            for (bucket, &count) in self.buckets.iter().enumerate() {
                cumulative += count as u128;
                if cumulative >= target {
                    let bound = Self::bucket_bound(bucket).min(max_object_size);
                    if bounds.last().is_none_or(|&last| bound > last) && bound < max_object_size {
                        bounds.push(bound);
                    }
                    break;
                }
            }
        }
        bounds.push(max_object_size);
        SizeClassTable::try_new(bounds)
    }
}

impl Default for SizeHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_picks_first_bound_at_or_above() {
        let table = SizeClassTable::try_new(vec![100, 1000, 10_000]).unwrap();
        assert_eq!(table.route(0), Some(100));
        assert_eq!(table.route(100), Some(100));
        assert_eq!(table.route(101), Some(1000));
        assert_eq!(table.route(10_000), Some(10_000));
        assert_eq!(table.route(10_001), None);
        assert_eq!(table.max_object_size(), 10_000);
    }

    #[test]
    fn rejects_bad_bounds() {
        assert!(SizeClassTable::try_new(vec![]).is_err());
        assert!(SizeClassTable::try_new(vec![0, 10]).is_err());
        assert!(SizeClassTable::try_new(vec![10, 10]).is_err());
        assert!(SizeClassTable::try_new(vec![20, 10]).is_err());
    }

    #[test]
    fn equal_log_for_default_box_size() {
        let table = SizeClassTable::equal_log(104_857_600, 4).unwrap();
        // 104_857_600 has 27 significant bits, so base = 6.
        assert_eq!(table.bounds(), &[64, 4096, 262_144, 104_857_600]);
    }

    #[test]
    fn equal_log_single_class_is_max() {
        let table = SizeClassTable::equal_log(500, 1).unwrap();
        assert_eq!(table.bounds(), &[500]);
    }

    #[test]
    fn equal_log_rejects_too_many_classes() {
        assert!(SizeClassTable::equal_log(4, 8).is_err());
        assert!(SizeClassTable::equal_log(0, 2).is_err());
        assert!(SizeClassTable::equal_log(1024, 0).is_err());
    }

    #[test]
    fn covering_falls_back_to_largest() {
        let table = SizeClassTable::try_new(vec![64, 512]).unwrap();
        assert_eq!(table.covering(10), 64);
        assert_eq!(table.covering(100), 512);
        assert_eq!(table.covering(4096), 512);
    }

    #[test]
    fn histogram_buckets_by_power_of_two() {
        let mut hist = SizeHistogram::new();
        hist.record(1);
        hist.record(2);
        hist.record(3);
        hist.record(4);
        hist.record(5);
        assert_eq!(hist.bucket_count(0), 1);
        assert_eq!(hist.bucket_count(1), 1);
        assert_eq!(hist.bucket_count(2), 2);
        assert_eq!(hist.bucket_count(3), 1);
        assert_eq!(hist.total(), 5);
    }

    #[test]
    fn equal_population_splits_samples() {
        let mut hist = SizeHistogram::new();
        for _ in 0..50 {
            hist.record(100);
        }
        for _ in 0..50 {
            hist.record(5000);
        }
        let table = hist.equal_population_bounds(2, 1 << 20).unwrap();
        assert_eq!(table.bounds(), &[128, 1 << 20]);
        assert_eq!(table.route(100), Some(128));
        assert_eq!(table.route(5000), Some(1 << 20));
    }

    #[test]
    fn equal_population_collapses_duplicate_shares() {
        let mut hist = SizeHistogram::new();
        for _ in 0..10 {
            hist.record(60);
        }
        let table = hist.equal_population_bounds(4, 4096).unwrap();
        assert_eq!(table.bounds(), &[64, 4096]);
    }

    #[test]
    fn equal_population_needs_samples() {
        let hist = SizeHistogram::default();
        assert!(hist.equal_population_bounds(4, 4096).is_err());
    }
}
