//! Operational self-test binary
//!
//! Not a transport: initializes logging and config, runs preflight, then
//! pushes one synthetic enrollment-and-verify round through the full
//! pipeline with the stub extractor. Exits nonzero if the process is not
//! fit to serve.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use pulsegate::codec::gray::encode_frames;
use pulsegate::embedding::StubExtractor;
use pulsegate::preflight;
use pulsegate::session::{SessionStore, SweepWorker};
use pulsegate::{AppConfig, VerificationPipeline, VerificationService};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "pulsegate.toml".to_string());
    let config =
        AppConfig::load_or_create(Path::new(&config_path)).context("Failed to load config")?;

    let report = preflight::run_preflight();
    if !report.can_proceed {
        bail!("Preflight failed; refusing to serve");
    }

    let sessions = Arc::new(SessionStore::new(config.session.clone()));
    let sweeper = SweepWorker::start(Arc::clone(&sessions));

    let pipeline = Arc::new(VerificationPipeline::new(
        &config,
        Arc::new(StubExtractor::default()),
        Arc::clone(&sessions),
        Vec::new(),
    ));
    let service = VerificationService::new(pipeline);

    // One full enrollment-and-verify round against a synthetic subject.
    let upload = synthetic_face_upload();
    let enrolled = service
        .verify_face("selftest".to_string(), upload.clone())
        .await
        .map_err(|e| anyhow::anyhow!("smoke enrollment failed: {}", e))?;
    log::info!(
        "smoke enrollment: {}",
        serde_json::to_string(&enrolled).context("serialize result")?
    );

    let verified = service
        .verify_face("selftest".to_string(), upload)
        .await
        .map_err(|e| anyhow::anyhow!("smoke verification failed: {}", e))?;
    log::info!(
        "smoke verification: {}",
        serde_json::to_string(&verified).context("serialize result")?
    );

    if !verified.is_live || verified.replay_detected {
        bail!("smoke verification did not come back live");
    }

    sessions.close("selftest");
    sweeper.stop();

    println!(
        "{}",
        serde_json::to_string(&service.health()).context("serialize health")?
    );
    Ok(())
}

/// Two aperiodic textured frames, enough motion and texture to read as a
/// live subject to the heuristics.
fn synthetic_face_upload() -> Vec<u8> {
    let mut state = 0x5eed_u64;
    let mut frame = || -> Vec<f32> {
        (0..128 * 64)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 40) as f32 / (1 << 24) as f32 * 0.9
            })
            .collect()
    };
    let frames = [frame(), frame()];
    encode_frames(128, 64, &frames)
}
