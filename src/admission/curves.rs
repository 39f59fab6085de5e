//! Admission probability curves.
//!
//! Each curve maps the bytes admitted so far in the quantum (`E`) to an
//! admission probability. Callers treat a non-finite or non-positive result
//! as "reject".

use rand::Rng;

/// `1 - E / (K * quota)`
pub fn linear(written: u64, quota: u64, k: u32) -> f64 {
    1.0 - written as f64 / (f64::from(k) * quota as f64)
}

/// `1 - E / (K * balance)`, zero once the balance is spent.
pub fn linear_balance(written: u64, balance: i64, k: u32) -> f64 {
    if balance <= 0 {
        return 0.0;
    }
    1.0 - written as f64 / (f64::from(k) * balance as f64)
}

/// `exp(-E / quota)`
pub fn exponential(written: u64, quota: u64) -> f64 {
    (-(written as f64) / quota as f64).exp()
}

/// `ln(K + 1 - E / quota) / ln 5`
pub fn logarithmic(written: u64, quota: u64, k: u32) -> f64 {
    (f64::from(k) + 1.0 - written as f64 / quota as f64).ln() / 5f64.ln()
}

/// [`logarithmic`], zero once the balance is spent.
pub fn logarithmic_balance(written: u64, quota: u64, balance: i64, k: u32) -> f64 {
    if balance <= 0 {
        return 0.0;
    }
    logarithmic(written, quota, k)
}

/// `ln(balance - E) / ln(balance)`
///
/// The balance already carries every earlier quantum's surplus or deficit,
/// so the curve reaches zero when the remaining carried budget is one byte.
pub fn log_budget(written: u64, balance: i64) -> f64 {
    if balance <= 1 {
        return 0.0;
    }
    let remaining = balance as f64 - written as f64;
    remaining.ln() / (balance as f64).ln()
}

/// Draws against `p`; non-finite and non-positive probabilities never admit
/// and consume no randomness.
pub fn draw<R: Rng + ?Sized>(p: f64, rng: &mut R) -> bool {
    if !p.is_finite() || p <= 0.0 {
        return false;
    }
    rng.random::<f64>() <= p
}
