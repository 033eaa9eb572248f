//! Voice replay detection: spectral signatures
//!
//! Replayed audio passes through a speaker and shows up three ways: low
//! spectral entropy (synthetic tones), early high-frequency rolloff
//! (playback lowpass), and band-energy signatures matching known replay
//! devices. The fingerprint library is supplied at construction from
//! clips captured off known devices.

use serde::{Deserialize, Serialize};

use super::{SpoofConfig, SpoofDecision, SpoofReason};
use crate::codec::VoiceSample;

/// Analysis window length in samples
const SPECTRUM_WINDOW: usize = 1024;

/// Bands in a replay-device signature
const FINGERPRINT_BANDS: usize = 16;

/// Band-energy signature of a known replay device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayFingerprint {
    pub label: String,
    pub bands: Vec<f32>,
}

pub struct VoiceSpoofDetector {
    config: SpoofConfig,
    fingerprints: Vec<ReplayFingerprint>,
}

impl VoiceSpoofDetector {
    pub fn new(config: SpoofConfig, fingerprints: Vec<ReplayFingerprint>) -> Self {
        Self {
            config,
            fingerprints,
        }
    }

    /// Evaluate a decoded clip. Checks run cheapest-signal-first; the
    /// strongest triggered artifact names the reason.
    pub fn evaluate(&self, voice: &VoiceSample) -> SpoofDecision {
        let spectrum = power_spectrum(voice.samples());

        let entropy = spectral_entropy(&spectrum);
        let rolloff = rolloff_hz(
            &spectrum,
            voice.sample_rate(),
            self.config.rolloff_fraction,
        );
        let bands = band_signature(&spectrum);

        let entropy_deficit = if entropy < self.config.min_spectral_entropy {
            ((self.config.min_spectral_entropy - entropy) / self.config.min_spectral_entropy)
                .clamp(0.0, 1.0)
        } else {
            0.0
        };
        let rolloff_deficit = if rolloff < self.config.min_rolloff_hz {
            ((self.config.min_rolloff_hz - rolloff) / self.config.min_rolloff_hz).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let nearest = self
            .fingerprints
            .iter()
            .map(|fp| (fp.label.as_str(), band_distance(&bands, &fp.bands)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let fingerprint_closeness = match nearest {
            Some((label, dist)) if dist <= self.config.fingerprint_distance_threshold => {
                log::info!(
                    "voice spoof: matched replay fingerprint '{}' (distance {:.4})",
                    label,
                    dist
                );
                (1.0 - dist / self.config.fingerprint_distance_threshold).clamp(0.0, 1.0)
            }
            _ => 0.0,
        };

        log::debug!(
            "voice spoof: entropy={:.3} rolloff={:.0}Hz fingerprint_closeness={:.3}",
            entropy,
            rolloff,
            fingerprint_closeness
        );

        // Strongest artifact wins; fingerprint match outranks heuristics
        // at equal strength.
        let (score, reason) = if fingerprint_closeness > 0.0
            && fingerprint_closeness >= entropy_deficit
            && fingerprint_closeness >= rolloff_deficit
        {
            (fingerprint_closeness, SpoofReason::FingerprintMatch)
        } else if entropy_deficit >= rolloff_deficit && entropy_deficit > 0.0 {
            (entropy_deficit, SpoofReason::LowEntropy)
        } else if rolloff_deficit > 0.0 {
            (rolloff_deficit, SpoofReason::LowRolloff)
        } else {
            (0.0, SpoofReason::Clean)
        };

        SpoofDecision {
            is_replay: reason != SpoofReason::Clean,
            score,
            reason,
        }
    }

    /// Band signature of a clip, for building the replay library from
    /// captures of known devices.
    pub fn fingerprint_of(voice: &VoiceSample, label: impl Into<String>) -> ReplayFingerprint {
        ReplayFingerprint {
            label: label.into(),
            bands: band_signature(&power_spectrum(voice.samples())),
        }
    }
}

/// Hann-windowed power spectrum over the leading analysis window.
fn power_spectrum(samples: &[f32]) -> Vec<f32> {
    let n = samples.len().min(SPECTRUM_WINDOW);
    if n < 2 {
        return Vec::new();
    }

    let mean = samples[..n].iter().sum::<f32>() / n as f32;
    let windowed: Vec<f32> = samples[..n]
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let hann =
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos());
            (s - mean) * hann
        })
        .collect();

    let bins = n / 2;
    let mut spectrum = vec![0.0f32; bins];
    for (k, slot) in spectrum.iter_mut().enumerate().skip(1) {
        let mut re = 0.0f64;
        let mut im = 0.0f64;
        for (i, w) in windowed.iter().enumerate() {
            let angle = -2.0 * std::f64::consts::PI * k as f64 * i as f64 / n as f64;
            re += *w as f64 * angle.cos();
            im += *w as f64 * angle.sin();
        }
        *slot = (re * re + im * im) as f32;
    }
    spectrum
}

/// Normalized spectral entropy in [0, 1]; silence and pure tones score
/// near zero, broadband speech well above.
fn spectral_entropy(spectrum: &[f32]) -> f32 {
    let total: f64 = spectrum.iter().map(|p| *p as f64).sum();
    if total <= 1e-12 || spectrum.len() < 2 {
        return 0.0;
    }
    let mut entropy = 0.0f64;
    for p in spectrum {
        let p = *p as f64 / total;
        if p > 0.0 {
            entropy -= p * p.ln();
        }
    }
    (entropy / (spectrum.len() as f64).ln()) as f32
}

/// Frequency below which `fraction` of the spectral energy lies.
fn rolloff_hz(spectrum: &[f32], sample_rate: u32, fraction: f32) -> f32 {
    let total: f64 = spectrum.iter().map(|p| *p as f64).sum();
    if total <= 1e-12 {
        return 0.0;
    }
    let target = total * fraction as f64;
    let mut cumulative = 0.0f64;
    for (k, p) in spectrum.iter().enumerate() {
        cumulative += *p as f64;
        if cumulative >= target {
            // bin k of an n-point DFT spans k * rate / n
            return k as f32 * sample_rate as f32 / (2.0 * spectrum.len() as f32);
        }
    }
    sample_rate as f32 / 2.0
}

/// Unit-norm vector of energies over evenly split spectrum bands.
fn band_signature(spectrum: &[f32]) -> Vec<f32> {
    if spectrum.is_empty() {
        return vec![0.0; FINGERPRINT_BANDS];
    }
    let band_width = (spectrum.len() / FINGERPRINT_BANDS).max(1);
    let mut bands = vec![0.0f32; FINGERPRINT_BANDS];
    for (k, p) in spectrum.iter().enumerate() {
        let band = (k / band_width).min(FINGERPRINT_BANDS - 1);
        bands[band] += p;
    }
    for b in bands.iter_mut() {
        *b = b.sqrt();
    }
    let norm = bands.iter().map(|b| b * b).sum::<f32>().sqrt();
    if norm > 0.0 {
        for b in bands.iter_mut() {
            *b /= norm;
        }
    }
    bands
}

fn band_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::MAX;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}
