//! Face liveness analysis
//!
//! Scores a decoded frame sequence for signs of a live subject. Evaluation
//! walks a fixed state machine (Capturing -> FeatureScoring -> Decided)
//! within a single call; a failed check is a decision, not an error, and
//! there is no retry loop.

use serde::{Deserialize, Serialize};

use crate::codec::FaceSample;

/// Liveness analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Combined score at or above which the subject counts as live
    pub threshold: f32,
    /// Mean inter-frame luma delta that saturates the motion sub-score
    pub motion_norm: f32,
    /// Mean Laplacian response that saturates the texture sub-score
    pub texture_norm: f32,
    /// Disparity variance that saturates the depth sub-score
    pub depth_norm: f32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            motion_norm: 0.05,
            texture_norm: 0.1,
            depth_norm: 0.01,
        }
    }
}

/// Evaluation phases; terminal state is always reached within one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LivenessPhase {
    Capturing,
    FeatureScoring,
    Decided,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessReason {
    Live,
    BelowThreshold,
    NoFrames,
}

/// Outcome of one liveness evaluation; consumed within the request, never
/// persisted.
#[derive(Debug, Clone, Copy)]
pub struct LivenessDecision {
    pub passed: bool,
    pub score: f32,
    pub reason: LivenessReason,
}

/// Weighted-rule liveness analyzer over a short frame sequence.
pub struct LivenessAnalyzer {
    config: LivenessConfig,
}

const WEIGHT_MOTION: f32 = 0.4;
const WEIGHT_TEXTURE: f32 = 0.4;
const WEIGHT_DEPTH: f32 = 0.2;

impl LivenessAnalyzer {
    pub fn new(config: LivenessConfig) -> Self {
        Self { config }
    }

    /// Evaluate a decoded face sample. Sub-scores that lack input (single
    /// frame, no disparity map) drop out and the remaining weights are
    /// renormalized.
    pub fn evaluate(&self, face: &FaceSample) -> LivenessDecision {
        let mut phase = LivenessPhase::Capturing;
        log::trace!("liveness phase: {:?}", phase);

        let frames = face.frames();
        if frames.is_empty() {
            return LivenessDecision {
                passed: false,
                score: 0.0,
                reason: LivenessReason::NoFrames,
            };
        }
        phase = LivenessPhase::FeatureScoring;
        log::trace!("liveness phase: {:?}", phase);

        let texture = self.texture_score(frames);
        let motion = if frames.len() >= 2 {
            Some(self.motion_score(frames))
        } else {
            None
        };
        let depth = face.disparity().map(|d| self.depth_score(d));

        let mut weighted = WEIGHT_TEXTURE * texture;
        let mut weight_sum = WEIGHT_TEXTURE;
        if let Some(m) = motion {
            weighted += WEIGHT_MOTION * m;
            weight_sum += WEIGHT_MOTION;
        }
        if let Some(d) = depth {
            weighted += WEIGHT_DEPTH * d;
            weight_sum += WEIGHT_DEPTH;
        }
        let score = (weighted / weight_sum).clamp(0.0, 1.0);

        phase = LivenessPhase::Decided;
        log::trace!("liveness phase: {:?}", phase);

        let passed = score >= self.config.threshold;
        log::debug!(
            "liveness: score={:.3} (texture={:.3} motion={:?} depth={:?}) threshold={:.2} -> {}",
            score,
            texture,
            motion,
            depth,
            self.config.threshold,
            if passed { "live" } else { "not live" }
        );

        LivenessDecision {
            passed,
            score,
            reason: if passed {
                LivenessReason::Live
            } else {
                LivenessReason::BelowThreshold
            },
        }
    }

    /// Texture naturalness: mean absolute 4-neighbour Laplacian response
    /// over interior pixels, averaged across frames. Prints and flat
    /// renders score low.
    fn texture_score(&self, frames: &[crate::codec::FaceFrame]) -> f32 {
        let mut total = 0.0f64;
        let mut count = 0usize;
        for frame in frames {
            let (w, h) = (frame.width(), frame.height());
            for y in 1..h.saturating_sub(1) {
                for x in 1..w.saturating_sub(1) {
                    let c = frame.at(x, y);
                    let lap = 4.0 * c
                        - frame.at(x - 1, y)
                        - frame.at(x + 1, y)
                        - frame.at(x, y - 1)
                        - frame.at(x, y + 1);
                    total += (lap.abs() / 4.0) as f64;
                    count += 1;
                }
            }
        }
        if count == 0 {
            return 0.0;
        }
        let mean = (total / count as f64) as f32;
        (mean / self.config.texture_norm).clamp(0.0, 1.0)
    }

    /// Blink/motion consistency: mean absolute luma delta between
    /// consecutive frames over the upper face band, where blink motion
    /// concentrates.
    fn motion_score(&self, frames: &[crate::codec::FaceFrame]) -> f32 {
        let mut total = 0.0f64;
        let mut count = 0usize;
        for pair in frames.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let band_rows = (a.height() / 2).max(1);
            for y in 0..band_rows {
                for x in 0..a.width() {
                    total += (a.at(x, y) - b.at(x, y)).abs() as f64;
                    count += 1;
                }
            }
        }
        if count == 0 {
            return 0.0;
        }
        let mean = (total / count as f64) as f32;
        (mean / self.config.motion_norm).clamp(0.0, 1.0)
    }

    /// Depth consistency: variance of the disparity map. A flat map is
    /// what a screen or print produces.
    fn depth_score(&self, disparity: &[f32]) -> f32 {
        if disparity.is_empty() {
            return 0.0;
        }
        let mean = disparity.iter().sum::<f32>() / disparity.len() as f32;
        let var = disparity
            .iter()
            .map(|v| {
                let d = v - mean;
                d * d
            })
            .sum::<f32>()
            / disparity.len() as f32;
        (var / self.config.depth_norm).clamp(0.0, 1.0)
    }
}
