//! Engine configuration.
//!
//! [`EngineBuilder`] collects every startup parameter and validates them
//! together. Invalid configurations are refused with a [`ConfigError`]; there
//! is no silent fallback.
//!
//! ## Example
//!
//! ```rust
//! use flashbox::admission::{AdmissionConfig, AdmissionPolicy};
//! use flashbox::builder::EngineBuilder;
//!
//! let engine = EngineBuilder::new(8 << 30)
//!     .max_box_size(64 << 20)
//!     .equal_log_classes(4, 1 << 20)
//!     .admission(AdmissionConfig::new(AdmissionPolicy::FrequencyThreshold, 1 << 30).k(3))
//!     .ghost_byte_budget(1 << 20, 8)
//!     .try_build()
//!     .unwrap();
//! assert_eq!(engine.ghost().capacity(), 131_072);
//! assert_eq!(engine.queue().segment_capacity(), 4 << 30);
//! ```

use crate::admission::{AdmissionConfig, AdmissionController};
use crate::ds::GhostCache;
use crate::engine::CacheEngine;
use crate::error::ConfigError;
use crate::policy::SegmentedEvictionQueue;
use crate::size_class::{SizeClassTable, SizeHistogram};
use crate::store::BoxStore;

/// 100 MiB.
pub const DEFAULT_MAX_BOX_SIZE: u64 = 104_857_600;
pub const DEFAULT_SIZE_CLASSES: usize = 4;
/// Bytes charged per ghost entry when sizing from a byte budget.
pub const DEFAULT_GHOST_SLOT_BYTES: u64 = 8;

#[derive(Debug, Clone)]
enum ClassSpec {
    EqualLog {
        classes: usize,
        max_object_size: Option<u64>,
    },
    Explicit(Vec<u64>),
}

#[derive(Debug, Clone, Copy)]
enum GhostSpec {
    /// `cache_size / 8` slots when the policy uses the ghost cache, else none.
    Auto,
    Slots(usize),
    ByteBudget { bytes: u64, slot_bytes: u64 },
}

/// Builder for [`CacheEngine`].
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    cache_size: u64,
    max_box_size: u64,
    classes: ClassSpec,
    admission: AdmissionConfig,
    ghost: GhostSpec,
    record_size_histogram: bool,
}

impl EngineBuilder {
    /// Starts a configuration for a cache of `cache_size` bytes, split evenly
    /// between the hot and cold segments.
    pub fn new(cache_size: u64) -> Self {
        Self {
            cache_size,
            max_box_size: DEFAULT_MAX_BOX_SIZE,
            classes: ClassSpec::EqualLog {
                classes: DEFAULT_SIZE_CLASSES,
                max_object_size: None,
            },
            admission: AdmissionConfig::default(),
            ghost: GhostSpec::Auto,
            record_size_histogram: false,
        }
    }

    pub fn max_box_size(mut self, bytes: u64) -> Self {
        self.max_box_size = bytes;
        self
    }

    /// Explicit ascending size-class upper bounds.
    pub fn size_classes(mut self, bounds: Vec<u64>) -> Self {
        self.classes = ClassSpec::Explicit(bounds);
        self
    }

    /// `classes` equal-logarithmic classes up to `max_object_size`.
    pub fn equal_log_classes(mut self, classes: usize, max_object_size: u64) -> Self {
        self.classes = ClassSpec::EqualLog {
            classes,
            max_object_size: Some(max_object_size),
        };
        self
    }

    pub fn admission(mut self, config: AdmissionConfig) -> Self {
        self.admission = config;
        self
    }

    pub fn ghost_capacity(mut self, slots: usize) -> Self {
        self.ghost = GhostSpec::Slots(slots);
        self
    }

    pub fn ghost_byte_budget(mut self, bytes: u64, slot_bytes: u64) -> Self {
        self.ghost = GhostSpec::ByteBudget { bytes, slot_bytes };
        self
    }

    /// Records every routable request size so classes can be rebalanced with
    /// [`CacheEngine::rebalance_size_classes`].
    pub fn record_size_histogram(mut self, enabled: bool) -> Self {
        self.record_size_histogram = enabled;
        self
    }

    fn size_class_table(&self) -> Result<SizeClassTable, ConfigError> {
        match &self.classes {
            ClassSpec::EqualLog {
                classes,
                max_object_size,
            } => SizeClassTable::equal_log(
                max_object_size.unwrap_or(self.max_box_size),
                *classes,
            ),
            ClassSpec::Explicit(bounds) => SizeClassTable::try_new(bounds.clone()),
        }
    }

    fn ghost_cache(&self) -> Result<GhostCache<String>, ConfigError> {
        match self.ghost {
            GhostSpec::Auto if self.admission.policy.uses_ghost_cache() => {
                GhostCache::with_byte_budget(self.cache_size, DEFAULT_GHOST_SLOT_BYTES)
            },
            GhostSpec::Auto => Ok(GhostCache::new(0)),
            GhostSpec::Slots(slots) => Ok(GhostCache::new(slots)),
            GhostSpec::ByteBudget { bytes, slot_bytes } => {
                GhostCache::with_byte_budget(bytes, slot_bytes)
            },
        }
    }

    /// Validates the configuration and builds the engine.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero cache or box size, a segment that
    /// cannot hold one box, invalid size classes, a size class larger than a
    /// box, or invalid admission parameters.
    pub fn try_build(self) -> Result<CacheEngine, ConfigError> {
        if self.cache_size == 0 {
            return Err(ConfigError::new("cache size must be greater than zero"));
        }
        if self.max_box_size == 0 {
            return Err(ConfigError::new("box size must be greater than zero"));
        }
        if self.cache_size / 2 < self.max_box_size {
            return Err(ConfigError::new(format!(
                "half the cache size ({}) cannot hold one {} byte box",
                self.cache_size / 2,
                self.max_box_size
            )));
        }

        let classes = self.size_class_table()?;
        if classes.max_object_size() > self.max_box_size {
            return Err(ConfigError::new(format!(
                "largest size class {} exceeds box size {}",
                classes.max_object_size(),
                self.max_box_size
            )));
        }

        let admission = AdmissionController::try_new(self.admission.clone())?;
        let ghost = self.ghost_cache()?;
        let histogram = self.record_size_histogram.then(SizeHistogram::new);

        Ok(CacheEngine::from_parts(
            BoxStore::new(classes, self.max_box_size),
            SegmentedEvictionQueue::new(self.cache_size, self.max_box_size),
            admission,
            ghost,
            histogram,
        ))
    }

    /// Builds the engine.
    ///
    /// # Panics
    ///
    /// Panics with the [`ConfigError`] message if the configuration is
    /// invalid. Use [`try_build`](Self::try_build) to handle it.
    pub fn build(self) -> CacheEngine {
        match self.try_build() {
            Ok(engine) => engine,
            Err(err) => panic!("{err}"),
        }
    }
}
