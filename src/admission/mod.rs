//! Admission control for cache misses.
//!
//! A miss is only written to flash if the active [`AdmissionPolicy`] admits
//! it. Every budgeted policy measures admitted bytes per quantum of `epoch`
//! requests and folds the quantum into a carried balance at each rollover.
//!
//! ## Architecture
//!
//! ```text
//!   request n ──► QuantumClock::advance ──► Transition::{WarmUp, WarmUpFinished, Rollover}
//!                                                        │
//!                                                        ▼
//!                                  WriteBudget::fold + per-policy rollover
//!
//!   miss ──► AdmissionController::decide
//!              ├─ warm-up: admit, no accounting
//!              ├─ curve policies: p = f(E, quota, balance, K); admit iff u <= p
//!              ├─ fixed/growing: admit iff u <= p, p adjusted per quantum
//!              └─ frequency threshold: interval gate + GhostCache count
//! ```
//!
//! ## Example Usage
//!
//! ```
//! use flashbox::admission::{AdmissionConfig, AdmissionController, AdmissionPolicy};
//! use flashbox::ds::GhostCache;
//!
//! let config = AdmissionConfig::new(AdmissionPolicy::Linear, 1_000)
//!     .epoch(10)
//!     .warmup_quanta(0)
//!     .k(1);
//! let mut controller = AdmissionController::try_new(config).unwrap();
//! let mut ghost = GhostCache::new(0);
//!
//! controller.advance(1);
//! // p = 1 - 0 / 1000, always admitted
//! assert!(controller.decide("a", 400, &mut ghost));
//! assert_eq!(controller.budget().written(), 400);
//! ```

pub mod budget;
pub mod curves;
pub mod fixed;
pub mod frequency;

use std::fmt;
use std::str::FromStr;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::{debug, info};

use crate::ds::GhostCache;
use crate::error::ConfigError;

pub use budget::{QuantumClock, QuantumSummary, Transition, WriteBudget};
pub use fixed::{BudgetMode, FixedProbability};
pub use frequency::FrequencyThreshold;

/// Admission policy selector.
///
/// Parsed from kebab-case names; the historical nicknames are accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdmissionPolicy {
    /// Every miss is written.
    AdmitAll,
    /// `p = 1 - E/(K*quota)` ("lame-duck").
    Linear,
    /// `p = 1 - E/(K*balance)`.
    LinearBalance,
    /// `p = exp(-E/quota)` ("spicy-chicken").
    Exponential,
    /// `p = ln(K+1 - E/quota)/ln 5` ("angry-bird").
    Logarithmic,
    /// Logarithmic, closed while the balance is spent.
    LogarithmicBalance,
    /// `p = ln(balance - E)/ln(balance)` ("angry-bear").
    LogBudget,
    /// Constant p per quantum with halving feedback ("white-bear").
    FixedProbability,
    /// Fixed probability against a budget that grows each quantum ("smiling-turtle").
    GrowingBudget,
    /// Interval-tracked ghost-cache frequency threshold ("tire").
    FrequencyThreshold,
}

impl AdmissionPolicy {
    pub const ALL: [AdmissionPolicy; 10] = [
        AdmissionPolicy::AdmitAll,
        AdmissionPolicy::Linear,
        AdmissionPolicy::LinearBalance,
        AdmissionPolicy::Exponential,
        AdmissionPolicy::Logarithmic,
        AdmissionPolicy::LogarithmicBalance,
        AdmissionPolicy::LogBudget,
        AdmissionPolicy::FixedProbability,
        AdmissionPolicy::GrowingBudget,
        AdmissionPolicy::FrequencyThreshold,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AdmissionPolicy::AdmitAll => "admit-all",
            AdmissionPolicy::Linear => "linear",
            AdmissionPolicy::LinearBalance => "linear-balance",
            AdmissionPolicy::Exponential => "exponential",
            AdmissionPolicy::Logarithmic => "logarithmic",
            AdmissionPolicy::LogarithmicBalance => "logarithmic-balance",
            AdmissionPolicy::LogBudget => "log-budget",
            AdmissionPolicy::FixedProbability => "fixed-probability",
            AdmissionPolicy::GrowingBudget => "growing-budget",
            AdmissionPolicy::FrequencyThreshold => "frequency-threshold",
        }
    }

    /// Whether the policy charges admitted bytes against a quota.
    pub fn is_budgeted(self) -> bool {
        self != AdmissionPolicy::AdmitAll
    }

    /// Whether the policy consults the ghost cache.
    pub fn uses_ghost_cache(self) -> bool {
        self == AdmissionPolicy::FrequencyThreshold
    }
}

impl fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AdmissionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let policy = match s.trim().to_ascii_lowercase().as_str() {
            "admit-all" | "none" => AdmissionPolicy::AdmitAll,
            "linear" | "lame-duck" => AdmissionPolicy::Linear,
            "linear-balance" => AdmissionPolicy::LinearBalance,
            "exponential" | "spicy-chicken" => AdmissionPolicy::Exponential,
            "logarithmic" | "angry-bird" => AdmissionPolicy::Logarithmic,
            "logarithmic-balance" => AdmissionPolicy::LogarithmicBalance,
            "log-budget" | "angry-bear" => AdmissionPolicy::LogBudget,
            "fixed-probability" | "white-bear" => AdmissionPolicy::FixedProbability,
            "growing-budget" | "smiling-turtle" => AdmissionPolicy::GrowingBudget,
            "frequency-threshold" | "tire" => AdmissionPolicy::FrequencyThreshold,
            _ => {
                return Err(ConfigError::new(format!(
                    "unknown admission policy '{s}'"
                )));
            },
        };
        Ok(policy)
    }
}

/// Parameters for an [`AdmissionController`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionConfig {
    pub policy: AdmissionPolicy,
    /// Bytes allowed per quantum.
    pub quota: u64,
    /// Slack multiplier for the curves and the interval boundaries.
    pub k: u32,
    /// Number of frequency-threshold sub-intervals.
    pub interval: u32,
    /// Requests per quantum.
    pub epoch: u64,
    pub warmup_quanta: u64,
    /// Starting balance; `quota` when unset.
    pub initial_balance: Option<i64>,
    /// Starting probability for the fixed-probability policies.
    pub fixed_probability: f64,
    pub seed: u64,
}

impl AdmissionConfig {
    pub const DEFAULT_EPOCH: u64 = 1_000_000;

    pub fn new(policy: AdmissionPolicy, quota: u64) -> Self {
        Self {
            policy,
            quota,
            k: 2,
            interval: 1,
            epoch: Self::DEFAULT_EPOCH,
            warmup_quanta: 1,
            initial_balance: None,
            fixed_probability: 1.0,
            seed: 0,
        }
    }

    pub fn k(mut self, k: u32) -> Self {
        self.k = k;
        self
    }

    pub fn interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn warmup_quanta(mut self, quanta: u64) -> Self {
        self.warmup_quanta = quanta;
        self
    }

    pub fn initial_balance(mut self, balance: i64) -> Self {
        self.initial_balance = Some(balance);
        self
    }

    pub fn fixed_probability(mut self, p: f64) -> Self {
        self.fixed_probability = p;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epoch == 0 {
            return Err(ConfigError::new("epoch must be > 0"));
        }
        if !self.policy.is_budgeted() {
            return Ok(());
        }
        if self.quota == 0 {
            return Err(ConfigError::new(format!(
                "{} admission needs a quota > 0",
                self.policy
            )));
        }
        if self.k == 0 {
            return Err(ConfigError::new("K must be > 0"));
        }
        if matches!(
            self.policy,
            AdmissionPolicy::FixedProbability | AdmissionPolicy::GrowingBudget
        ) && !(self.fixed_probability > 0.0 && self.fixed_probability <= 1.0)
        {
            return Err(ConfigError::new(format!(
                "fixed probability must be in (0, 1], got {}",
                self.fixed_probability
            )));
        }
        Ok(())
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self::new(AdmissionPolicy::AdmitAll, 0)
    }
}

/// Per-policy state beyond the shared write budget.
#[derive(Debug, Clone)]
enum Strategy {
    Stateless,
    Fixed(FixedProbability),
    Frequency(FrequencyThreshold),
}

/// Counters over every admission decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionStats {
    pub candidates: u64,
    pub admitted: u64,
    pub rejected: u64,
    pub admitted_bytes: u64,
    pub warmup_admitted: u64,
}

/// Decides which misses are written, one policy per run.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    policy: AdmissionPolicy,
    k: u32,
    clock: QuantumClock,
    budget: WriteBudget,
    strategy: Strategy,
    rng: SmallRng,
    stats: AdmissionStats,
    quantum_candidates: u64,
    quantum_admitted: u64,
    acceptance: f64,
}

impl AdmissionController {
    pub fn try_new(config: AdmissionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let strategy = match config.policy {
            AdmissionPolicy::FixedProbability => Strategy::Fixed(FixedProbability::new(
                BudgetMode::PerQuantum,
                config.fixed_probability,
            )),
            AdmissionPolicy::GrowingBudget => Strategy::Fixed(FixedProbability::new(
                BudgetMode::Cumulative,
                config.fixed_probability,
            )),
            AdmissionPolicy::FrequencyThreshold => {
                Strategy::Frequency(FrequencyThreshold::try_new(config.k, config.interval)?)
            },
            _ => Strategy::Stateless,
        };
        let initial_balance = config.initial_balance.unwrap_or(config.quota as i64);
        Ok(Self {
            policy: config.policy,
            k: config.k,
            clock: QuantumClock::new(config.epoch, config.warmup_quanta),
            budget: WriteBudget::new(config.quota, initial_balance),
            strategy,
            rng: SmallRng::seed_from_u64(config.seed),
            stats: AdmissionStats::default(),
            quantum_candidates: 0,
            quantum_admitted: 0,
            acceptance: 1.0,
        })
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    pub fn budget(&self) -> &WriteBudget {
        &self.budget
    }

    pub fn stats(&self) -> AdmissionStats {
        self.stats
    }

    pub fn quantum(&self) -> u64 {
        self.clock.quantum()
    }

    pub fn in_warmup(&self) -> bool {
        self.clock.in_warmup()
    }

    /// Current frequency threshold, if the policy has one.
    pub fn threshold(&self) -> Option<i64> {
        match &self.strategy {
            Strategy::Frequency(freq) => Some(freq.threshold()),
            _ => None,
        }
    }

    /// Admission probability the next miss would be drawn against.
    pub fn probability(&self) -> Option<f64> {
        let written = self.budget.written();
        let quota = self.budget.quota();
        let balance = self.budget.balance();
        match (&self.strategy, self.policy) {
            (Strategy::Fixed(fixed), _) => Some(fixed.probability()),
            (Strategy::Frequency(_), _) => None,
            (_, AdmissionPolicy::AdmitAll) => Some(1.0),
            (_, AdmissionPolicy::Linear) => Some(curves::linear(written, quota, self.k)),
            (_, AdmissionPolicy::LinearBalance) => {
                Some(curves::linear_balance(written, balance, self.k))
            },
            (_, AdmissionPolicy::Exponential) => Some(curves::exponential(written, quota)),
            (_, AdmissionPolicy::Logarithmic) => Some(curves::logarithmic(written, quota, self.k)),
            (_, AdmissionPolicy::LogarithmicBalance) => Some(curves::logarithmic_balance(
                written, quota, balance, self.k,
            )),
            (_, AdmissionPolicy::LogBudget) => Some(curves::log_budget(written, balance)),
            _ => None,
        }
    }

    /// Admitted share of candidates over the last finished quantum.
    pub fn last_acceptance(&self) -> f64 {
        self.acceptance
    }

    /// Moves the quantum clock to the 1-based `request_number`, folding any
    /// finished quanta. Call once per request, hit or miss.
    pub fn advance(&mut self, request_number: u64) {
        let transitions: Vec<Transition> = self.clock.advance(request_number).collect();
        for transition in transitions {
            match transition {
                Transition::WarmUp => {},
                Transition::WarmUpFinished => {
                    info!(
                        policy = %self.policy,
                        quantum = self.clock.quantum(),
                        balance = self.budget.balance(),
                        "warm-up finished, admission accounting starts"
                    );
                },
                Transition::Rollover => self.rollover(),
            }
        }
    }

    fn rollover(&mut self) {
        let summary = self.budget.fold();
        if self.quantum_candidates > 0 {
            self.acceptance = self.quantum_admitted as f64 / self.quantum_candidates as f64;
        }
        self.quantum_candidates = 0;
        self.quantum_admitted = 0;

        let quota = self.budget.quota();
        match &mut self.strategy {
            Strategy::Stateless => {
                info!(
                    policy = %self.policy,
                    quantum = self.clock.quantum(),
                    written = summary.written,
                    balance = summary.balance,
                    acceptance = self.acceptance,
                    "quantum rollover"
                );
            },
            Strategy::Fixed(fixed) => {
                let erasure = fixed.erasure();
                let probability = fixed.rollover(quota);
                info!(
                    policy = %self.policy,
                    quantum = self.clock.quantum(),
                    written = summary.written,
                    erasure,
                    probability,
                    "quantum rollover"
                );
            },
            Strategy::Frequency(freq) => {
                let threshold = freq.rollover(summary.balance);
                info!(
                    policy = %self.policy,
                    quantum = self.clock.quantum(),
                    written = summary.written,
                    balance = summary.balance,
                    threshold,
                    "quantum rollover"
                );
            },
        }
    }

    /// Admit or reject a miss of `size` bytes for `id`.
    ///
    /// Only the frequency-threshold policy touches `ghost`.
    pub fn decide(&mut self, id: &str, size: u64, ghost: &mut GhostCache<String>) -> bool {
        self.stats.candidates += 1;
        if self.clock.in_warmup() {
            self.stats.admitted += 1;
            self.stats.warmup_admitted += 1;
            self.stats.admitted_bytes += size;
            return true;
        }
        self.quantum_candidates += 1;

        let admit = match &self.strategy {
            Strategy::Frequency(freq) => freq.admits(id, ghost),
            Strategy::Fixed(fixed) => curves::draw(fixed.probability(), &mut self.rng),
            Strategy::Stateless if self.policy == AdmissionPolicy::AdmitAll => true,
            Strategy::Stateless => match self.probability() {
                Some(p) => curves::draw(p, &mut self.rng),
                None => false,
            },
        };

        if admit {
            self.budget.charge(size);
            match &mut self.strategy {
                Strategy::Fixed(fixed) => fixed.record_admit(size),
                Strategy::Frequency(freq) => {
                    freq.record_admit(self.budget.written(), self.budget.quota())
                },
                Strategy::Stateless => {},
            }
            self.stats.admitted += 1;
            self.stats.admitted_bytes += size;
            self.quantum_admitted += 1;
        } else {
            self.stats.rejected += 1;
            debug!(id, size, written = self.budget.written(), "miss rejected");
        }
        admit
    }
}
