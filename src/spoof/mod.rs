//! Replay and presentation-attack detection
//!
//! Face and voice paths share the decision shape but inspect different
//! artifacts: print/screen signatures on frames, spectral signatures on
//! waveforms. A replay verdict short-circuits the pipeline before any
//! embedding work.

pub mod face;
pub mod voice;

use serde::{Deserialize, Serialize};

pub use face::FaceSpoofDetector;
pub use voice::{ReplayFingerprint, VoiceSpoofDetector};

/// Spoof detector configuration, shared by both modalities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoofConfig {
    /// Face replay score at or above which the frame counts as replayed
    pub face_replay_threshold: f32,
    /// Luma at or above which a pixel counts as specular
    pub specular_floor: f32,
    /// Saturated-pixel fraction that saturates the specular sub-score
    pub specular_norm: f32,
    /// Normalized spectral entropy below which a clip counts as synthetic
    pub min_spectral_entropy: f32,
    /// Rolloff frequency below which a clip counts as replayed playback
    pub min_rolloff_hz: f32,
    /// Fraction of spectral energy defining the rolloff point
    pub rolloff_fraction: f32,
    /// Band-signature distance at or below which a clip matches a known
    /// replay device
    pub fingerprint_distance_threshold: f32,
}

impl Default for SpoofConfig {
    fn default() -> Self {
        Self {
            face_replay_threshold: 0.6,
            specular_floor: 0.98,
            specular_norm: 0.05,
            min_spectral_entropy: 0.35,
            min_rolloff_hz: 2000.0,
            rolloff_fraction: 0.85,
            fingerprint_distance_threshold: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpoofReason {
    Clean,
    MoirePattern,
    SpecularHighlight,
    LowEntropy,
    LowRolloff,
    FingerprintMatch,
}

/// Outcome of one spoof evaluation; consumed within the request, never
/// persisted.
#[derive(Debug, Clone, Copy)]
pub struct SpoofDecision {
    pub is_replay: bool,
    pub score: f32,
    pub reason: SpoofReason,
}

impl SpoofDecision {
    pub fn clean(score: f32) -> Self {
        Self {
            is_replay: false,
            score,
            reason: SpoofReason::Clean,
        }
    }
}
