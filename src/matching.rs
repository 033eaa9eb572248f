//! Stateless comparison of noised embeddings
//!
//! Cosine distance, fixed for the system because the privacy noise is
//! calibrated against it. No per-call state; safe to invoke from any
//! number of requests at once.

use serde::{Deserialize, Serialize};

use crate::embedding::NoisedEmbedding;

/// Match engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Cosine distance at or below which two embeddings match
    pub threshold: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self { threshold: 0.35 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MatchOutcome {
    pub distance: f32,
    pub confidence: f32,
    pub matched: bool,
}

pub struct MatchEngine {
    config: MatchConfig,
}

impl MatchEngine {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    /// Compare two noised embeddings. Cosine distance spans [0, 2];
    /// confidence maps it back onto [0, 1].
    pub fn compare(&self, probe: &NoisedEmbedding, template: &NoisedEmbedding) -> MatchOutcome {
        let similarity = cosine_similarity(probe.as_slice(), template.as_slice());
        let distance = (1.0 - similarity).clamp(0.0, 2.0);
        let confidence = (1.0 - distance / 2.0).clamp(0.0, 1.0);
        let matched = distance <= self.config.threshold;

        log::debug!(
            "match: distance={:.4} confidence={:.3} threshold={:.2} -> {}",
            distance,
            confidence,
            self.config.threshold,
            if matched { "PASS" } else { "FAIL" }
        );

        MatchOutcome {
            distance,
            confidence,
            matched,
        }
    }
}

/// Cosine similarity; mismatched lengths and zero vectors score 0.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
