//! Differential-privacy guard for embedding release
//!
//! Every embedding is noised before it is compared or stored, and every
//! noise invocation spends epsilon from the session's budget. Exhaustion
//! fails closed: the caller must re-enroll, the guard never degrades to
//! releasing an un-noised or under-noised embedding.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::{Embedding, NoisedEmbedding};

/// Privacy guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Epsilon spent per noise invocation
    pub epsilon_per_query: f64,
    /// Fixed sensitivity bound of one embedding coordinate
    pub sensitivity: f64,
    /// Total epsilon budget granted to a fresh session
    pub session_budget: f64,
    /// Fixed noise seed; production leaves this unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            epsilon_per_query: 1.0,
            sensitivity: 2.0,
            session_budget: 10.0,
            rng_seed: None,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum PrivacyError {
    #[error("privacy budget exhausted: {remaining:.2} remaining, {required:.2} required")]
    BudgetExhausted { remaining: f64, required: f64 },
}

/// Calibrated-noise injector with per-session budget accounting.
pub struct PrivacyGuard {
    config: PrivacyConfig,
}

impl PrivacyGuard {
    pub fn new(config: PrivacyConfig) -> Self {
        Self { config }
    }

    pub fn session_budget(&self) -> f64 {
        self.config.session_budget
    }

    /// Add independent Laplace noise to every dimension and charge the
    /// session budget. The scale is `sensitivity / (epsilon * dim)`, so a
    /// higher-dimensional embedding spreads the same epsilon thinner.
    pub fn noise<R: Rng>(
        &self,
        embedding: &Embedding,
        budget_remaining: &mut f64,
        rng: &mut R,
    ) -> Result<NoisedEmbedding, PrivacyError> {
        let epsilon = self.config.epsilon_per_query;
        if *budget_remaining < epsilon {
            return Err(PrivacyError::BudgetExhausted {
                remaining: *budget_remaining,
                required: epsilon,
            });
        }

        let dim = embedding.dim().max(1);
        let scale = self.config.sensitivity / (epsilon * dim as f64);
        let noised: Vec<f32> = embedding
            .as_slice()
            .iter()
            .map(|v| (*v as f64 + sample_laplace(rng, scale)) as f32)
            .collect();

        *budget_remaining -= epsilon;
        log::debug!(
            "privacy: charged epsilon={:.2}, budget now {:.2}",
            epsilon,
            budget_remaining
        );

        Ok(NoisedEmbedding::new(noised))
    }
}

/// Inverse-CDF Laplace sample with the given scale.
fn sample_laplace<R: Rng>(rng: &mut R, scale: f64) -> f64 {
    let u: f64 = rng.gen_range(-0.5..0.5);
    // keep the log argument strictly positive at the interval edge
    let magnitude = (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE);
    -scale * u.signum() * magnitude.ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn unit_embedding(dim: usize) -> Embedding {
        let mut e = Embedding::from_vec(vec![1.0; dim]);
        e.normalize();
        e
    }

    #[test]
    fn noise_charges_the_budget() {
        let guard = PrivacyGuard::new(PrivacyConfig::default());
        let mut rng = SmallRng::seed_from_u64(1);
        let mut remaining = 10.0;
        guard
            .noise(&unit_embedding(64), &mut remaining, &mut rng)
            .unwrap();
        assert_eq!(remaining, 9.0);
        guard
            .noise(&unit_embedding(64), &mut remaining, &mut rng)
            .unwrap();
        assert_eq!(remaining, 8.0);
    }

    #[test]
    fn exhausted_budget_fails_closed() {
        let guard = PrivacyGuard::new(PrivacyConfig::default());
        let mut rng = SmallRng::seed_from_u64(1);
        let mut remaining = 0.5;
        let err = guard
            .noise(&unit_embedding(64), &mut remaining, &mut rng)
            .unwrap_err();
        assert!(matches!(err, PrivacyError::BudgetExhausted { .. }));
        // a failed charge must not touch the budget
        assert_eq!(remaining, 0.5);
    }

    #[test]
    fn budget_runs_dry_after_the_granted_queries() {
        let guard = PrivacyGuard::new(PrivacyConfig::default());
        let mut rng = SmallRng::seed_from_u64(2);
        let mut remaining = guard.session_budget();
        for _ in 0..10 {
            guard
                .noise(&unit_embedding(64), &mut remaining, &mut rng)
                .unwrap();
        }
        assert!(guard
            .noise(&unit_embedding(64), &mut remaining, &mut rng)
            .is_err());
    }

    #[test]
    fn noise_actually_perturbs_values() {
        let guard = PrivacyGuard::new(PrivacyConfig::default());
        let mut rng = SmallRng::seed_from_u64(3);
        let embedding = unit_embedding(64);
        let mut remaining = 10.0;
        let noised = guard.noise(&embedding, &mut remaining, &mut rng).unwrap();
        assert_ne!(noised.as_slice(), embedding.as_slice());
    }

    #[test]
    fn same_seed_reproduces_the_same_noise() {
        let guard = PrivacyGuard::new(PrivacyConfig::default());
        let embedding = unit_embedding(64);
        let mut a_budget = 10.0;
        let mut b_budget = 10.0;
        let a = guard
            .noise(
                &embedding,
                &mut a_budget,
                &mut SmallRng::seed_from_u64(42),
            )
            .unwrap();
        let b = guard
            .noise(
                &embedding,
                &mut b_budget,
                &mut SmallRng::seed_from_u64(42),
            )
            .unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn enormous_epsilon_means_negligible_noise() {
        let guard = PrivacyGuard::new(PrivacyConfig {
            epsilon_per_query: 1e9,
            ..PrivacyConfig::default()
        });
        let mut rng = SmallRng::seed_from_u64(4);
        let embedding = unit_embedding(64);
        let mut remaining = 1e12;
        let noised = guard.noise(&embedding, &mut remaining, &mut rng).unwrap();
        for (n, r) in noised.as_slice().iter().zip(embedding.as_slice()) {
            assert!((n - r).abs() < 1e-6);
        }
    }
}
