//! Face replay detection: print and screen artifacts
//!
//! Screens betray themselves with moiré interference (periodic luma
//! gradients from the pixel grid) and unnaturally saturated specular
//! highlights; both are cheap to measure on the decoded frame.

use super::{SpoofConfig, SpoofDecision, SpoofReason};
use crate::codec::{FaceFrame, FaceSample};

/// Gradient-autocorrelation lags probed for moiré periodicity
const MOIRE_LAGS: std::ops::RangeInclusive<usize> = 2..=16;

pub struct FaceSpoofDetector {
    config: SpoofConfig,
}

impl FaceSpoofDetector {
    pub fn new(config: SpoofConfig) -> Self {
        Self { config }
    }

    /// Evaluate every frame in the sample; any frame showing replay
    /// artifacts condemns the upload.
    pub fn evaluate(&self, face: &FaceSample) -> SpoofDecision {
        let mut worst = SpoofDecision::clean(0.0);

        for frame in face.frames() {
            let moire = self.moire_score(frame);
            let specular = self.specular_score(frame);

            let (score, reason) = if moire >= specular {
                (moire, SpoofReason::MoirePattern)
            } else {
                (specular, SpoofReason::SpecularHighlight)
            };

            if score > worst.score {
                worst = SpoofDecision {
                    is_replay: score >= self.config.face_replay_threshold,
                    score,
                    reason: if score >= self.config.face_replay_threshold {
                        reason
                    } else {
                        SpoofReason::Clean
                    },
                };
            }
        }

        if worst.is_replay {
            log::info!(
                "face spoof: replay artifacts detected (score={:.3}, {:?})",
                worst.score,
                worst.reason
            );
        }
        worst
    }

    /// Periodicity of the horizontal luma gradient, measured as the peak
    /// normalized autocorrelation over short lags. Screen pixel grids
    /// produce near-perfect periodicity; natural skin does not.
    fn moire_score(&self, frame: &FaceFrame) -> f32 {
        let (w, h) = (frame.width(), frame.height());
        if w < *MOIRE_LAGS.end() * 2 {
            return 0.0;
        }

        // Column-mean profile, then its first difference.
        let mut profile = vec![0.0f32; w];
        for (x, slot) in profile.iter_mut().enumerate() {
            let mut sum = 0.0f32;
            for y in 0..h {
                sum += frame.at(x, y);
            }
            *slot = sum / h as f32;
        }
        let gradient: Vec<f32> = profile.windows(2).map(|p| p[1] - p[0]).collect();

        let energy: f32 = gradient.iter().map(|g| g * g).sum();
        if energy < 1e-9 {
            return 0.0;
        }

        let mut peak = 0.0f32;
        for lag in MOIRE_LAGS {
            if gradient.len() <= lag {
                break;
            }
            let corr: f32 = gradient
                .iter()
                .zip(&gradient[lag..])
                .map(|(a, b)| a * b)
                .sum();
            peak = peak.max(corr / energy);
        }
        peak.clamp(0.0, 1.0)
    }

    /// Fraction of specularly saturated pixels, scaled so that
    /// `specular_norm` worth of blown-out highlights saturates the score.
    fn specular_score(&self, frame: &FaceFrame) -> f32 {
        let luma = frame.luma();
        if luma.is_empty() {
            return 0.0;
        }
        let saturated = luma
            .iter()
            .filter(|v| **v >= self.config.specular_floor)
            .count();
        let fraction = saturated as f32 / luma.len() as f32;
        (fraction / self.config.specular_norm).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure::SecureBuffer;

    fn frame_from(width: usize, height: usize, luma: Vec<f32>) -> FaceFrame {
        FaceFrame::new(width, height, SecureBuffer::from_vec(luma))
    }

    /// Vertical stripes with a 4-column period, the screen-grid signature.
    fn striped(width: usize, height: usize) -> Vec<f32> {
        (0..width * height)
            .map(|i| if (i % width) % 4 < 2 { 0.8 } else { 0.2 })
            .collect()
    }

    /// Deterministic aperiodic luma in [0, 0.9].
    fn noise(width: usize, height: usize, seed: u64) -> Vec<f32> {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        (0..width * height)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 40) as f32 / (1 << 24) as f32 * 0.9
            })
            .collect()
    }

    #[test]
    fn screen_stripes_are_flagged_as_moire() {
        let face = FaceSample::new(vec![frame_from(64, 64, striped(64, 64))]);
        let decision = FaceSpoofDetector::new(SpoofConfig::default()).evaluate(&face);
        assert!(decision.is_replay);
        assert_eq!(decision.reason, SpoofReason::MoirePattern);
        assert!(decision.score >= 0.6);
    }

    #[test]
    fn blown_out_highlights_are_flagged_as_specular() {
        let mut luma = noise(64, 64, 7);
        for v in luma.iter_mut().take(64 * 8) {
            *v = 1.0;
        }
        let face = FaceSample::new(vec![frame_from(64, 64, luma)]);
        let decision = FaceSpoofDetector::new(SpoofConfig::default()).evaluate(&face);
        assert!(decision.is_replay);
        assert_eq!(decision.reason, SpoofReason::SpecularHighlight);
    }

    #[test]
    fn natural_texture_passes() {
        let face = FaceSample::new(vec![
            frame_from(128, 64, noise(128, 64, 1)),
            frame_from(128, 64, noise(128, 64, 2)),
        ]);
        let decision = FaceSpoofDetector::new(SpoofConfig::default()).evaluate(&face);
        assert!(!decision.is_replay);
        assert_eq!(decision.reason, SpoofReason::Clean);
        assert!(decision.score < 0.6);
    }

    #[test]
    fn one_bad_frame_condemns_the_stack() {
        let face = FaceSample::new(vec![
            frame_from(128, 64, noise(128, 64, 3)),
            frame_from(64, 64, striped(64, 64)),
        ]);
        let decision = FaceSpoofDetector::new(SpoofConfig::default()).evaluate(&face);
        assert!(decision.is_replay);
    }
}
