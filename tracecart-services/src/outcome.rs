//! The randomness seam for simulated business outcomes.
//!
//! Every probabilistic decision in the services (declined charges, fraud
//! flags, random amounts and picks) goes through an [`OutcomeSampler`] so
//! tests can swap in seeded or fixed implementations instead of relying on
//! real randomness.

use std::fmt;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of simulated business outcomes.
pub trait OutcomeSampler: Send + Sync + fmt::Debug {
    /// Returns `true` with the given probability.
    fn happens(&self, probability: f64) -> bool;

    /// A uniform index in `0..len`. `len` must be non-zero.
    fn index(&self, len: usize) -> usize;

    /// A uniform value in `lo..hi`.
    fn amount(&self, lo: f64, hi: f64) -> f64;
}

/// Pick a uniform element from a non-empty slice.
pub fn pick<'a, T>(sampler: &dyn OutcomeSampler, items: &'a [T]) -> &'a T {
    &items[sampler.index(items.len())]
}

/// A random identifier token, for order/transaction/tracking ids.
pub fn random_token() -> String {
    format!("{:032x}", rand::rng().random::<u128>())
}

/// Default sampler over the thread-local RNG.
#[derive(Clone, Debug, Default)]
pub struct RandomSampler {
    _private: (),
}

impl RandomSampler {
    /// Create a new `RandomSampler`.
    pub fn new() -> Self {
        RandomSampler::default()
    }
}

impl OutcomeSampler for RandomSampler {
    fn happens(&self, probability: f64) -> bool {
        rand::rng().random_bool(probability.clamp(0.0, 1.0))
    }

    fn index(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }

    fn amount(&self, lo: f64, hi: f64) -> f64 {
        rand::rng().random_range(lo..hi)
    }
}

/// Deterministic sampler over a seeded RNG, for reproducible runs and tests.
#[derive(Debug)]
pub struct SeededSampler {
    rng: Mutex<StdRng>,
}

impl SeededSampler {
    /// Create a sampler seeded with the given value.
    pub fn new(seed: u64) -> Self {
        SeededSampler {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = match self.rng.lock() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut rng)
    }
}

impl OutcomeSampler for SeededSampler {
    fn happens(&self, probability: f64) -> bool {
        self.with_rng(|rng| rng.random_bool(probability.clamp(0.0, 1.0)))
    }

    fn index(&self, len: usize) -> usize {
        self.with_rng(|rng| rng.random_range(0..len))
    }

    fn amount(&self, lo: f64, hi: f64) -> f64 {
        self.with_rng(|rng| rng.random_range(lo..hi))
    }
}

/// Sampler that forces every probabilistic branch one way, for tests.
#[derive(Clone, Copy, Debug)]
pub struct FixedSampler {
    outcome: bool,
}

impl FixedSampler {
    /// Every `happens` check fires.
    pub fn always() -> Self {
        FixedSampler { outcome: true }
    }

    /// No `happens` check ever fires.
    pub fn never() -> Self {
        FixedSampler { outcome: false }
    }
}

impl OutcomeSampler for FixedSampler {
    fn happens(&self, _probability: f64) -> bool {
        self.outcome
    }

    fn index(&self, _len: usize) -> usize {
        0
    }

    fn amount(&self, lo: f64, _hi: f64) -> f64 {
        lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_sampler_is_reproducible() {
        let a = SeededSampler::new(7);
        let b = SeededSampler::new(7);
        let picks_a: Vec<usize> = (0..32).map(|_| a.index(9)).collect();
        let picks_b: Vec<usize> = (0..32).map(|_| b.index(9)).collect();
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn failure_rate_converges() {
        // 1000 trials at 5%: the observed rate should land within two
        // percentage points, i.e. 30..=70 failures.
        let sampler = SeededSampler::new(42);
        let failures = (0..1000).filter(|_| sampler.happens(0.05)).count();
        assert!(
            (30..=70).contains(&failures),
            "observed {failures} failures in 1000 trials"
        );
    }

    #[test]
    fn fixed_sampler_pins_outcomes() {
        assert!(FixedSampler::always().happens(0.0));
        assert!(!FixedSampler::never().happens(1.0));
        assert_eq!(FixedSampler::never().index(5), 0);
        assert_eq!(FixedSampler::never().amount(2.5, 9.0), 2.5);
    }

    #[test]
    fn amount_stays_in_range() {
        let sampler = SeededSampler::new(1);
        for _ in 0..100 {
            let value = sampler.amount(10.0, 510.0);
            assert!((10.0..510.0).contains(&value));
        }
    }
}
