//! Seeded random number generation for evolution operators.
//!
//! Every stochastic operation in the engines flows through an [`EvoRng`]
//! seeded from the run seed, so a run replays identically from its
//! configuration.

use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::schema::{Architecture, Genome};

/// Random number generator wrapper for evolution operations.
pub struct EvoRng {
    rng: StdRng,
}

impl EvoRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create with random seed.
    pub fn random() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Derive an independent stream, used to hand each engine its own RNG.
    pub fn fork(&mut self) -> Self {
        Self::new(self.rng.r#gen())
    }

    /// Uniform in [low, high).
    pub fn uniform(&mut self, low: f32, high: f32) -> f32 {
        if low >= high {
            return low;
        }
        self.rng.gen_range(low..high)
    }

    /// Uniform index in [0, n).
    pub fn index(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    pub fn chance(&mut self, probability: f32) -> bool {
        if probability <= 0.0 {
            false
        } else if probability >= 1.0 {
            true
        } else {
            self.rng.gen_bool(probability as f64)
        }
    }

    /// Standard normal sample scaled by `sigma`.
    pub fn gaussian(&mut self, sigma: f32) -> f32 {
        let z: f32 = self.rng.sample(StandardNormal);
        z * sigma
    }

    pub fn seed(&mut self) -> u64 {
        self.rng.r#gen()
    }

    /// Random dense genome with weights uniform in [-1, 1].
    pub fn random_dense(&mut self, arch: Architecture) -> Genome {
        let weights = (0..arch.weight_count())
            .map(|_| self.uniform(-1.0, 1.0))
            .collect();
        Genome::Dense { arch, weights }
    }

    pub fn inner(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_reproducibility() {
        let mut a = EvoRng::new(7);
        let mut b = EvoRng::new(7);
        for _ in 0..10 {
            assert_eq!(a.uniform(-1.0, 1.0), b.uniform(-1.0, 1.0));
        }
    }

    #[test]
    fn test_chance_extremes() {
        let mut rng = EvoRng::new(1);
        assert!(!rng.chance(0.0));
        assert!(rng.chance(1.0));
    }

    #[test]
    fn test_random_dense_shape() {
        let mut rng = EvoRng::new(3);
        let arch = Architecture {
            inputs: 4,
            hidden: 8,
            outputs: 2,
        };
        let genome = rng.random_dense(arch);
        assert_eq!(genome.parameter_count(), arch.weight_count());
    }
}
