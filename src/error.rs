//! Error types for the flashbox simulator.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when engine configuration is rejected at
//!   startup (zero sizes, non-ascending size classes, unknown admission
//!   policy). The simulator refuses to start rather than fall back to a
//!   default.
//! - [`InvariantError`]: Returned by `check_invariants` methods when the
//!   box index, queue positions or ghost cache have desynchronized.
//!
//! ## Example Usage
//!
//! ```
//! use flashbox::admission::AdmissionPolicy;
//! use flashbox::error::ConfigError;
//!
//! let policy: Result<AdmissionPolicy, ConfigError> = "linear".parse();
//! assert!(policy.is_ok());
//!
//! let bad = "coin-flip".parse::<AdmissionPolicy>();
//! assert!(bad.unwrap_err().to_string().contains("coin-flip"));
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal bookkeeping invariants are violated.
///
/// Carries a human-readable description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvariantError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when simulator configuration parameters are invalid.
///
/// Produced by [`EngineBuilder::try_build`](crate::builder::EngineBuilder::try_build),
/// [`SizeClassTable::try_new`](crate::size_class::SizeClassTable::try_new) and
/// the admission policy parser.
///
/// # Example
///
/// ```
/// use flashbox::builder::EngineBuilder;
///
/// let err = EngineBuilder::new(0).try_build().unwrap_err();
/// assert!(err.to_string().contains("cache size"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
