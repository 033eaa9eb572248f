//! Transaction risk scoring over verification outcomes
//!
//! Downstream of the pipeline: combines the biometric confidence with
//! transaction context into a 0-100 risk score and the set of
//! authentication factors the caller must collect before proceeding.

use serde::{Deserialize, Serialize};

/// Risk factor weights
pub const WEIGHT_AMOUNT: f64 = 0.4;
pub const WEIGHT_DEVICE: f64 = 0.2;
pub const WEIGHT_BIOMETRIC: f64 = 0.2;

/// Biometric confidence below which risk spikes
const LOW_BIO_CONFIDENCE: f32 = 0.85;

/// Transaction context supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionContext {
    pub amount: f64,
    #[serde(default)]
    pub device_fingerprint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthFactor {
    Face,
    Voice,
    Otp,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskDecision {
    pub risk_score: u32,
    pub level: RiskLevel,
    pub required_auth: Vec<AuthFactor>,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RiskEngine;

impl RiskEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score a transaction given the biometric confidence from its
    /// verification. Score is capped at 100.
    pub fn calculate(&self, txn: &TransactionContext, bio_confidence: f32) -> RiskDecision {
        let mut score = 0u32;
        let mut factors = Vec::new();

        // 1. Amount risk
        if txn.amount > 10_000.0 {
            score += (WEIGHT_AMOUNT * 100.0) as u32;
            factors.push("high_amount".to_string());
        } else if txn.amount > 1_000.0 {
            score += (WEIGHT_AMOUNT * 50.0) as u32;
        }

        // 2. Biometric confidence, the core trust layer
        if bio_confidence < LOW_BIO_CONFIDENCE {
            score += 50;
            factors.push("low_bio_confidence".to_string());
        }

        // 3. Device fingerprint
        if txn
            .device_fingerprint
            .as_deref()
            .map_or(true, |f| f.is_empty())
        {
            score += (WEIGHT_DEVICE * 100.0) as u32;
            factors.push("unknown_device".to_string());
        }

        let score = score.min(100);

        let (level, required_auth) = if score > 75 {
            (
                RiskLevel::High,
                vec![AuthFactor::Face, AuthFactor::Voice, AuthFactor::Otp],
            )
        } else if score > 40 {
            (RiskLevel::Medium, vec![AuthFactor::Face, AuthFactor::Voice])
        } else {
            (RiskLevel::Low, vec![AuthFactor::Face])
        };

        log::debug!(
            "risk: score={} level={:?} factors={:?}",
            score,
            level,
            factors
        );

        RiskDecision {
            risk_score: score,
            level,
            required_auth,
            factors,
        }
    }
}
