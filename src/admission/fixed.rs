//! Fixed-probability admission with per-quantum feedback.
//!
//! The probability stays constant within a quantum. At each rollover it
//! halves if the erased bytes exceeded the budget, otherwise it moves halfway
//! back toward the last probability that overshot.

/// How the erasure budget grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetMode {
    /// Budget is one quota per quantum and erasure resets every quantum.
    PerQuantum,
    /// Budget is `quanta * quota` and erasure accumulates for the whole run.
    Cumulative,
}

#[derive(Debug, Clone)]
pub struct FixedProbability {
    mode: BudgetMode,
    probability: f64,
    higher: f64,
    erasure: u64,
    quanta: u64,
}

impl FixedProbability {
    pub fn new(mode: BudgetMode, initial: f64) -> Self {
        Self {
            mode,
            probability: initial,
            higher: initial,
            erasure: 0,
            quanta: 0,
        }
    }

    pub fn mode(&self) -> BudgetMode {
        self.mode
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn erasure(&self) -> u64 {
        self.erasure
    }

    pub fn record_admit(&mut self, bytes: u64) {
        self.erasure += bytes;
    }

    /// Adjusts the probability after a finished quantum and returns it.
    pub fn rollover(&mut self, quota: u64) -> f64 {
        self.quanta += 1;
        let budget = match self.mode {
            BudgetMode::PerQuantum => quota,
            BudgetMode::Cumulative => quota.saturating_mul(self.quanta),
        };
        if self.erasure > budget {
            self.higher = self.probability;
            self.probability /= 2.0;
        } else {
            self.probability = (self.higher + self.probability) / 2.0;
        }
        if self.mode == BudgetMode::PerQuantum {
            self.erasure = 0;
        }
        self.probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overshoot_halves_probability() {
        let mut fixed = FixedProbability::new(BudgetMode::PerQuantum, 0.8);
        fixed.record_admit(150);
        assert_eq!(fixed.rollover(100), 0.4);
        assert_eq!(fixed.erasure(), 0);
    }

    #[test]
    fn undershoot_recovers_toward_last_overshoot() {
        let mut fixed = FixedProbability::new(BudgetMode::PerQuantum, 0.8);
        fixed.record_admit(150);
        fixed.rollover(100);
        fixed.record_admit(10);
        assert!((fixed.rollover(100) - 0.6).abs() < 1e-12);
        assert!((fixed.rollover(100) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn cumulative_budget_grows_with_quanta() {
        let mut fixed = FixedProbability::new(BudgetMode::Cumulative, 1.0);
        fixed.record_admit(150);
        // budget 100
        assert_eq!(fixed.rollover(100), 0.5);
        // erasure 150 stays, budget 200
        assert_eq!(fixed.rollover(100), 0.75);
        assert_eq!(fixed.erasure(), 150);
        fixed.record_admit(200);
        // erasure 350 > budget 300
        assert_eq!(fixed.rollover(100), 0.375);
    }
}
