//! Quantum clock and write-budget accounting shared by every policy.

/// Maps request numbers to quanta and reports quantum transitions.
///
/// Quanta are `epoch` requests long and numbered from 0. The first
/// `warmup_quanta` quanta are warm-up: everything is admitted and nothing is
/// charged.
#[derive(Debug, Clone)]
pub struct QuantumClock {
    epoch: u64,
    warmup_quanta: u64,
    current: u64,
}

/// What crossing into a new quantum means for the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Still inside warm-up.
    WarmUp,
    /// First accounted quantum: start charging, nothing to fold yet.
    WarmUpFinished,
    /// A charged quantum ended and must be folded into the balance.
    Rollover,
}

impl QuantumClock {
    pub fn new(epoch: u64, warmup_quanta: u64) -> Self {
        debug_assert!(epoch > 0);
        Self {
            epoch,
            warmup_quanta,
            current: 0,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Index of the quantum the last advanced request fell into.
    pub fn quantum(&self) -> u64 {
        self.current
    }

    pub fn in_warmup(&self) -> bool {
        self.current < self.warmup_quanta
    }

    /// Advances to the quantum holding the 1-based `request_number` and
    /// returns the transitions crossed on the way, oldest first.
    pub fn advance(&mut self, request_number: u64) -> impl Iterator<Item = Transition> + use<> {
        let target = request_number.saturating_sub(1) / self.epoch;
        let from = self.current;
        let warmup = self.warmup_quanta;
        self.current = self.current.max(target);
        (from + 1..=target).map(move |quantum| match quantum {
            q if q < warmup => Transition::WarmUp,
            q if q == warmup => Transition::WarmUpFinished,
            _ => Transition::Rollover,
        })
    }
}

/// Per-quantum write budget with a balance carried across quanta.
#[derive(Debug, Clone)]
pub struct WriteBudget {
    quota: u64,
    balance: i64,
    written: u64,
    lifetime_written: u64,
    folds: u64,
}

/// Result of folding one finished quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantumSummary {
    pub written: u64,
    pub balance: i64,
}

impl WriteBudget {
    pub fn new(quota: u64, initial_balance: i64) -> Self {
        Self {
            quota,
            balance: initial_balance,
            written: 0,
            lifetime_written: 0,
            folds: 0,
        }
    }

    /// Bytes allowed per quantum.
    pub fn quota(&self) -> u64 {
        self.quota
    }

    /// Carried surplus (positive) or deficit (negative).
    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// Bytes admitted in the current quantum (`E`).
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn lifetime_written(&self) -> u64 {
        self.lifetime_written
    }

    /// Number of quanta folded since warm-up ended.
    pub fn folds(&self) -> u64 {
        self.folds
    }

    pub fn charge(&mut self, bytes: u64) {
        self.written += bytes;
        self.lifetime_written += bytes;
    }

    /// `balance += quota - written; written = 0`.
    pub fn fold(&mut self) -> QuantumSummary {
        let written = self.written;
        self.balance = self
            .balance
            .saturating_add(self.quota as i64)
            .saturating_sub(written as i64);
        self.written = 0;
        self.folds += 1;
        QuantumSummary {
            written,
            balance: self.balance,
        }
    }
}
