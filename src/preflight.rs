//! Preflight checks for the verification core
//!
//! Verifies the wipe machinery, noise source, reference codecs, and
//! session clock before the service takes traffic. Returns a structured
//! report; a hard failure means the process must not serve requests.

use chrono::{Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::codec::gray::encode_frames;
use crate::codec::wav::encode_wav;
use crate::codec::{GrayFrameDecoder, SampleDecoder, WavDecoder, TARGET_SAMPLE_RATE};
use crate::secure::SecureBuffer;

/// Status of an individual preflight check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Individual preflight check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightItem {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

/// Complete preflight report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightReport {
    pub items: Vec<PreflightItem>,
    pub overall: CheckStatus,
    pub can_proceed: bool,
}

impl PreflightReport {
    /// Determine overall status from individual checks
    fn compute_overall(items: &[PreflightItem]) -> CheckStatus {
        if items.iter().any(|i| i.status == CheckStatus::Fail) {
            CheckStatus::Fail
        } else if items.iter().any(|i| i.status == CheckStatus::Warn) {
            CheckStatus::Warn
        } else {
            CheckStatus::Pass
        }
    }

    /// Can the service proceed despite warnings?
    fn can_proceed(items: &[PreflightItem]) -> bool {
        !items.iter().any(|i| i.status == CheckStatus::Fail)
    }
}

/// Run all preflight checks.
pub fn run_preflight() -> PreflightReport {
    log::info!("Starting preflight checks...");

    let items = vec![
        check_secure_wipe(),
        check_noise_source(),
        check_codecs(),
        check_session_clock(),
    ];

    for item in &items {
        log::info!("preflight [{}]: {:?} - {}", item.name, item.status, item.message);
    }

    let overall = PreflightReport::compute_overall(&items);
    let can_proceed = PreflightReport::can_proceed(&items);

    log::info!("Preflight complete: {:?}", overall);
    PreflightReport {
        items,
        overall,
        can_proceed,
    }
}

/// Exercise the wipe path end to end. `wipe` verifies the zeroing itself
/// and aborts on failure, so returning at all means the machinery works.
fn check_secure_wipe() -> PreflightItem {
    let mut buffer = SecureBuffer::<u8>::acquire(4096);
    if buffer.write(0, &[0xA5; 4096]).is_err() {
        return PreflightItem {
            name: "secure_wipe".to_string(),
            status: CheckStatus::Fail,
            message: "Could not fill probe buffer".to_string(),
        };
    }
    buffer.wipe();

    if buffer.is_wiped() {
        PreflightItem {
            name: "secure_wipe".to_string(),
            status: CheckStatus::Pass,
            message: "Wipe self-test passed (4096 bytes zeroed and verified)".to_string(),
        }
    } else {
        PreflightItem {
            name: "secure_wipe".to_string(),
            status: CheckStatus::Fail,
            message: "Probe buffer did not report wiped".to_string(),
        }
    }
}

/// The privacy guard is only as good as its randomness.
fn check_noise_source() -> PreflightItem {
    let mut rng = rand::thread_rng();
    let draws: Vec<f64> = (0..256).map(|_| rng.gen_range(-0.5..0.5)).collect();

    let mean = draws.iter().sum::<f64>() / draws.len() as f64;
    let variance =
        draws.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / draws.len() as f64;
    let mut distinct = draws.clone();
    distinct.sort_by(|a, b| a.total_cmp(b));
    distinct.dedup();

    if variance > 1e-4 && distinct.len() > 200 {
        PreflightItem {
            name: "noise_source".to_string(),
            status: CheckStatus::Pass,
            message: format!("RNG healthy ({} distinct draws)", distinct.len()),
        }
    } else {
        PreflightItem {
            name: "noise_source".to_string(),
            status: CheckStatus::Fail,
            message: format!(
                "RNG looks degenerate: variance={:.2e}, {} distinct draws",
                variance,
                distinct.len()
            ),
        }
    }
}

/// Decode synthetic fixtures through both reference decoders.
fn check_codecs() -> PreflightItem {
    let frame = encode_frames(8, 8, &[vec![0.5; 64]]);
    let face_ok = GrayFrameDecoder::new().decode(&frame).is_ok();

    let clip = encode_wav(TARGET_SAMPLE_RATE, &vec![0.1; 1600]);
    let voice_ok = WavDecoder::new().decode(&clip).is_ok();

    match (face_ok, voice_ok) {
        (true, true) => PreflightItem {
            name: "codecs".to_string(),
            status: CheckStatus::Pass,
            message: "Reference decoders operational".to_string(),
        },
        (face_ok, voice_ok) => PreflightItem {
            name: "codecs".to_string(),
            status: CheckStatus::Fail,
            message: format!("Decoder self-test failed (face={}, voice={})", face_ok, voice_ok),
        },
    }
}

/// Session expiry math must move forward.
fn check_session_clock() -> PreflightItem {
    let now = Utc::now();
    let later = now + Duration::seconds(900);

    if later > now {
        PreflightItem {
            name: "session_clock".to_string(),
            status: CheckStatus::Pass,
            message: "Session clock sane".to_string(),
        }
    } else {
        PreflightItem {
            name: "session_clock".to_string(),
            status: CheckStatus::Warn,
            message: "Clock arithmetic did not advance; expiry may misbehave".to_string(),
        }
    }
}
