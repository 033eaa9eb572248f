//! API facade consumed by the transport collaborator
//!
//! Matches the wire contract of the verification endpoints: a
//! `VerificationResult` body on success, a generic
//! `{"detail":"Processing error"}` with status 500 on any internal
//! failure, and a constant health probe. Full error detail is logged
//! here and nowhere the client can see, so the biometric pipeline
//! cannot be used as an oracle.

use std::sync::Arc;

use serde::Serialize;

use crate::error::PipelineError;
use crate::pipeline::{VerificationPipeline, VerificationResult};

/// Health probe body, constant while the process is up.
pub const HEALTH_STATUS: &str = "secure_memory_active";

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

/// Client-visible failure: always generic, always 500.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: u16,
    pub detail: String,
}

impl ApiError {
    pub fn processing() -> Self {
        Self {
            status: 500,
            detail: "Processing error".to_string(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.detail, self.status)
    }
}

/// Async wrapper over the pipeline. Verification is CPU-bound, so each
/// request runs on a blocking worker; requests for different sessions
/// proceed fully in parallel.
pub struct VerificationService {
    pipeline: Arc<VerificationPipeline>,
}

impl VerificationService {
    pub fn new(pipeline: Arc<VerificationPipeline>) -> Self {
        Self { pipeline }
    }

    pub async fn verify_face(
        &self,
        session_id: String,
        upload: Vec<u8>,
    ) -> Result<VerificationResult, ApiError> {
        let pipeline = Arc::clone(&self.pipeline);
        let outcome =
            tokio::task::spawn_blocking(move || pipeline.verify_face(&session_id, upload)).await;
        map_outcome(outcome, "Face")
    }

    pub async fn verify_voice(
        &self,
        session_id: String,
        upload: Vec<u8>,
        expected_phrase: String,
    ) -> Result<VerificationResult, ApiError> {
        let pipeline = Arc::clone(&self.pipeline);
        let outcome = tokio::task::spawn_blocking(move || {
            pipeline.verify_voice(&session_id, upload, &expected_phrase)
        })
        .await;
        map_outcome(outcome, "Voice")
    }

    /// Liveness probe of the service process itself, distinct from
    /// biometric liveness. Constant while the process is up.
    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: HEALTH_STATUS,
        }
    }
}

fn map_outcome(
    outcome: Result<Result<VerificationResult, PipelineError>, tokio::task::JoinError>,
    flow: &str,
) -> Result<VerificationResult, ApiError> {
    match outcome {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => {
            log::error!("{} verification failed: {}", flow, e);
            Err(ApiError::processing())
        }
        Err(e) => {
            log::error!("{} verification task failed: {}", flow, e);
            Err(ApiError::processing())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::gray::encode_frames;
    use crate::config::AppConfig;
    use crate::embedding::StubExtractor;
    use crate::session::{SessionConfig, SessionStore};

    fn service() -> VerificationService {
        let mut config = AppConfig::default();
        config.privacy.rng_seed = Some(3);
        config.session = SessionConfig::default();
        let sessions = Arc::new(SessionStore::new(config.session.clone()));
        let pipeline = Arc::new(VerificationPipeline::new(
            &config,
            Arc::new(StubExtractor::default()),
            sessions,
            Vec::new(),
        ));
        VerificationService::new(pipeline)
    }

    fn textured_upload() -> Vec<u8> {
        let mut state = 99u64;
        let frame: Vec<f32> = (0..128 * 64)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 40) as f32 / (1 << 24) as f32 * 0.9
            })
            .collect();
        encode_frames(128, 64, &[frame.clone(), frame.iter().rev().cloned().collect()])
    }

    #[tokio::test]
    async fn malformed_upload_maps_to_generic_error() {
        let service = service();
        let err = service
            .verify_face("kiosk-a".to_string(), b"not an image".to_vec())
            .await
            .unwrap_err();
        assert_eq!(err.status, 500);
        assert_eq!(err.detail, "Processing error");
        // the wire body never carries internal detail
        let body = serde_json::to_string(&err).unwrap();
        assert_eq!(body, r#"{"detail":"Processing error"}"#);
    }

    #[tokio::test]
    async fn successful_verification_returns_the_result_body() {
        let service = service();
        let result = service
            .verify_face("kiosk-b".to_string(), textured_upload())
            .await
            .unwrap();
        assert!(result.is_live);
        assert!(!result.replay_detected);

        let body: serde_json::Value = serde_json::to_value(&result).unwrap();
        assert!(body.get("is_live").is_some());
        assert!(body.get("confidence").is_some());
        assert!(body.get("replay_detected").is_some());
        assert!(body.get("error").is_some());
    }

    #[tokio::test]
    async fn health_is_constant_and_state_independent() {
        let service = service();
        let before = serde_json::to_string(&service.health()).unwrap();
        assert_eq!(before, r#"{"status":"secure_memory_active"}"#);

        let _ = service
            .verify_face("kiosk-c".to_string(), b"junk".to_vec())
            .await;
        let after = serde_json::to_string(&service.health()).unwrap();
        assert_eq!(after, before);
    }
}
