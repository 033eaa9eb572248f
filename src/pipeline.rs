//! Verification pipeline orchestration
//!
//! Drives the two flows end to end: decode into secure buffers, spoof
//! check (short-circuit on replay), liveness (face), embedding
//! extraction, privacy noise, and match-or-enroll against the session
//! store. Decision outcomes come back as values; only infrastructure
//! faults propagate as errors. Every buffer a request allocates is
//! tracked on a per-request ledger, and every exit path is audited
//! against it.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::codec::{GrayFrameDecoder, Sample, SampleDecoder, WavDecoder};
use crate::config::{AppConfig, LimitsConfig};
use crate::embedding::{Embedding, EmbeddingExtractor, NoisedEmbedding};
use crate::error::PipelineError;
use crate::liveness::LivenessAnalyzer;
use crate::matching::MatchEngine;
use crate::privacy::{PrivacyError, PrivacyGuard};
use crate::secure::{SecureBuffer, WipeLedger};
use crate::session::{SessionError, SessionStore};
use crate::spoof::{FaceSpoofDetector, ReplayFingerprint, VoiceSpoofDetector};
use crate::validation::{validate_expected_phrase, validate_session_id, validate_upload_size};

/// Outcome of one verification request, in the shape the transport
/// serializes to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub is_live: bool,
    pub confidence: f32,
    pub replay_detected: bool,
    pub error: Option<String>,
}

impl VerificationResult {
    fn live(confidence: f32) -> Self {
        Self {
            is_live: true,
            confidence: confidence.clamp(0.0, 1.0),
            replay_detected: false,
            error: None,
        }
    }

    fn not_live(confidence: f32) -> Self {
        Self {
            is_live: false,
            confidence: confidence.clamp(0.0, 1.0),
            replay_detected: false,
            error: None,
        }
    }

    fn replay() -> Self {
        Self {
            is_live: false,
            confidence: 0.0,
            replay_detected: true,
            error: None,
        }
    }

    fn budget_exhausted() -> Self {
        Self {
            is_live: false,
            confidence: 0.0,
            replay_detected: false,
            error: Some("privacy_budget_exhausted".to_string()),
        }
    }
}

/// Orchestrates both verification flows over shared, read-only components.
pub struct VerificationPipeline {
    face_decoder: Arc<dyn SampleDecoder>,
    voice_decoder: Arc<dyn SampleDecoder>,
    extractor: Arc<dyn EmbeddingExtractor>,
    liveness: LivenessAnalyzer,
    face_spoof: FaceSpoofDetector,
    voice_spoof: VoiceSpoofDetector,
    privacy: PrivacyGuard,
    matcher: MatchEngine,
    sessions: Arc<SessionStore>,
    limits: LimitsConfig,
    rng_seed: Option<u64>,
}

impl VerificationPipeline {
    /// Build a pipeline with the reference decoders. `fingerprints` is the
    /// replay-device library for the voice spoof detector.
    pub fn new(
        config: &AppConfig,
        extractor: Arc<dyn EmbeddingExtractor>,
        sessions: Arc<SessionStore>,
        fingerprints: Vec<ReplayFingerprint>,
    ) -> Self {
        Self {
            face_decoder: Arc::new(GrayFrameDecoder::new()),
            voice_decoder: Arc::new(WavDecoder::new()),
            extractor,
            liveness: LivenessAnalyzer::new(config.liveness.clone()),
            face_spoof: FaceSpoofDetector::new(config.spoof.clone()),
            voice_spoof: VoiceSpoofDetector::new(config.spoof.clone(), fingerprints),
            privacy: PrivacyGuard::new(config.privacy.clone()),
            matcher: MatchEngine::new(config.matching.clone()),
            sessions,
            limits: config.limits.clone(),
            rng_seed: config.privacy.rng_seed,
        }
    }

    /// Swap in collaborator decoders (e.g. a JPEG or Opus front end).
    pub fn with_decoders(
        mut self,
        face: Arc<dyn SampleDecoder>,
        voice: Arc<dyn SampleDecoder>,
    ) -> Self {
        self.face_decoder = face;
        self.voice_decoder = voice;
        self
    }

    /// Run the face flow for one upload.
    pub fn verify_face(
        &self,
        session_id: &str,
        upload: Vec<u8>,
    ) -> Result<VerificationResult, PipelineError> {
        let ledger = WipeLedger::new();
        let result = self.face_flow(session_id, upload, &ledger);
        self.audit_cleanup(&ledger, "face");
        result
    }

    /// Run the voice flow for one upload.
    pub fn verify_voice(
        &self,
        session_id: &str,
        upload: Vec<u8>,
        expected_phrase: &str,
    ) -> Result<VerificationResult, PipelineError> {
        let ledger = WipeLedger::new();
        let result = self.voice_flow(session_id, upload, expected_phrase, &ledger);
        self.audit_cleanup(&ledger, "voice");
        result
    }

    fn face_flow(
        &self,
        session_id: &str,
        upload: Vec<u8>,
        ledger: &WipeLedger,
    ) -> Result<VerificationResult, PipelineError> {
        validate_session_id(session_id)?;
        validate_upload_size(upload.len(), self.limits.max_upload_bytes)?;

        let mut raw = SecureBuffer::from_vec(upload);
        raw.track(ledger);
        let decoded = self.face_decoder.decode(raw.as_slice());
        // raw bytes are done once decode returns, whatever the outcome
        raw.wipe();

        let mut sample = decoded?;
        sample.track(ledger);
        let face = match &sample {
            Sample::Face(face) => face,
            Sample::Voice(_) => {
                return Err(PipelineError::Processing(
                    "face decoder produced a voice sample".to_string(),
                ))
            }
        };

        let spoof = self.face_spoof.evaluate(face);
        if spoof.is_replay {
            log::info!(
                "face verification for session '{}': replay detected ({:?})",
                session_id,
                spoof.reason
            );
            return Ok(VerificationResult::replay());
        }

        let live = self.liveness.evaluate(face);
        if !live.passed {
            log::info!(
                "face verification for session '{}': liveness failed (score={:.3})",
                session_id,
                live.score
            );
            return Ok(VerificationResult::not_live(live.score));
        }

        let mut embedding = self.extractor.extract(&sample)?;
        embedding.track(ledger);
        embedding.normalize();

        self.match_or_enroll(session_id, &embedding, live.score)
    }

    fn voice_flow(
        &self,
        session_id: &str,
        upload: Vec<u8>,
        expected_phrase: &str,
        ledger: &WipeLedger,
    ) -> Result<VerificationResult, PipelineError> {
        validate_session_id(session_id)?;
        let phrase = validate_expected_phrase(expected_phrase)?;
        validate_upload_size(upload.len(), self.limits.max_upload_bytes)?;

        let mut raw = SecureBuffer::from_vec(upload);
        raw.track(ledger);
        let decoded = self.voice_decoder.decode(raw.as_slice());
        raw.wipe();

        let mut sample = decoded?;
        sample.track(ledger);
        let voice = match &sample {
            Sample::Voice(voice) => voice,
            Sample::Face(_) => {
                return Err(PipelineError::Processing(
                    "voice decoder produced a face sample".to_string(),
                ))
            }
        };

        let spoof = self.voice_spoof.evaluate(voice);
        if spoof.is_replay {
            log::info!(
                "voice verification for session '{}': replay detected ({:?})",
                session_id,
                spoof.reason
            );
            return Ok(VerificationResult::replay());
        }

        // The clip must plausibly contain the expected phrase.
        let required_ms =
            self.limits.min_voice_ms + self.limits.ms_per_phrase_char * phrase.chars().count() as u64;
        if voice.duration_ms() < required_ms {
            log::info!(
                "voice verification for session '{}': utterance too short for phrase \
                 ({}ms < {}ms)",
                session_id,
                voice.duration_ms(),
                required_ms
            );
            return Ok(VerificationResult::not_live(0.0));
        }

        let mut embedding = self.extractor.extract(&sample)?;
        embedding.track(ledger);
        embedding.normalize();

        // Voice has no separate liveness stage; the spoof pass stands in.
        self.match_or_enroll(session_id, &embedding, 1.0)
    }

    /// Noise the fresh embedding and compare against the session template,
    /// or enroll the session if this is its first successful verification.
    fn match_or_enroll(
        &self,
        session_id: &str,
        embedding: &Embedding,
        liveness_score: f32,
    ) -> Result<VerificationResult, PipelineError> {
        match self.sessions.get(session_id) {
            Ok(entry) => {
                let mut session = entry.lock().unwrap();
                let noised = match self.noise(embedding, &mut session.privacy_budget_remaining) {
                    Ok(noised) => noised,
                    Err(PrivacyError::BudgetExhausted { remaining, .. }) => {
                        log::warn!(
                            "session '{}' privacy budget exhausted ({:.2} left); \
                             re-enrollment required",
                            session_id,
                            remaining
                        );
                        return Ok(VerificationResult::budget_exhausted());
                    }
                };

                let outcome = self.matcher.compare(&noised, &session.template);
                log::info!(
                    "verification for session '{}': distance={:.4} confidence={:.3} -> {}",
                    session_id,
                    outcome.distance,
                    outcome.confidence,
                    if outcome.matched { "PASS" } else { "FAIL" }
                );
                Ok(VerificationResult::live(outcome.confidence))
            }
            Err(SessionError::NotFound(_)) => {
                let mut remaining = self.privacy.session_budget();
                let noised = match self.noise(embedding, &mut remaining) {
                    Ok(noised) => noised,
                    Err(PrivacyError::BudgetExhausted { .. }) => {
                        // a zero-budget configuration cannot enroll anyone
                        return Ok(VerificationResult::budget_exhausted());
                    }
                };
                self.sessions.create(session_id, noised, remaining);
                log::info!(
                    "session '{}' enrolled from first successful verification",
                    session_id
                );
                Ok(VerificationResult::live(liveness_score))
            }
        }
    }

    fn noise(
        &self,
        embedding: &Embedding,
        budget_remaining: &mut f64,
    ) -> Result<NoisedEmbedding, PrivacyError> {
        match self.rng_seed {
            Some(seed) => self.privacy.noise(
                embedding,
                budget_remaining,
                &mut SmallRng::seed_from_u64(seed),
            ),
            None => self
                .privacy
                .noise(embedding, budget_remaining, &mut rand::thread_rng()),
        }
    }

    /// Single cleanup audit every exit path funnels through: by the time a
    /// flow returns, each buffer it tracked must have been wiped.
    fn audit_cleanup(&self, ledger: &WipeLedger, flow: &str) {
        let live = ledger.live();
        if live != 0 {
            log::error!(
                "cleanup audit: {} unwiped buffers survived the {} flow",
                live,
                flow
            );
            debug_assert_eq!(live, 0, "unwiped buffers survived the {} flow", flow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::gray::encode_frames;
    use crate::codec::wav::encode_wav;
    use crate::codec::TARGET_SAMPLE_RATE;
    use crate::embedding::{ExtractError, StubExtractor};
    use crate::session::SessionConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic aperiodic values for synthetic frames and clips.
    fn lcg(seed: u64, len: usize) -> Vec<f32> {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 40) as f32 / (1 << 24) as f32
            })
            .collect()
    }

    fn good_face_upload() -> Vec<u8> {
        let a: Vec<f32> = lcg(1, 128 * 64).iter().map(|v| v * 0.9).collect();
        let b: Vec<f32> = lcg(2, 128 * 64).iter().map(|v| v * 0.9).collect();
        encode_frames(128, 64, &[a, b])
    }

    fn striped_face_upload() -> Vec<u8> {
        let stripes: Vec<f32> = (0..64 * 64)
            .map(|i| if (i % 64) % 4 < 2 { 0.8 } else { 0.2 })
            .collect();
        encode_frames(64, 64, &[stripes])
    }

    fn flat_face_upload() -> Vec<u8> {
        encode_frames(64, 64, &[vec![0.5; 64 * 64], vec![0.5; 64 * 64]])
    }

    fn good_voice_upload(seed: u64) -> Vec<u8> {
        let samples: Vec<f32> = lcg(seed, TARGET_SAMPLE_RATE as usize)
            .iter()
            .map(|v| (v - 0.5) * 0.9)
            .collect();
        encode_wav(TARGET_SAMPLE_RATE, &samples)
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        // fixed noise makes enroll-then-verify deterministic
        config.privacy.rng_seed = Some(7);
        config
    }

    struct CountingExtractor {
        inner: StubExtractor,
        calls: Arc<AtomicUsize>,
    }

    impl EmbeddingExtractor for CountingExtractor {
        fn dim(&self) -> usize {
            self.inner.dim()
        }

        fn extract(&self, sample: &Sample) -> Result<Embedding, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.extract(sample)
        }
    }

    fn build_pipeline(
        config: AppConfig,
        fingerprints: Vec<ReplayFingerprint>,
    ) -> (VerificationPipeline, Arc<SessionStore>, Arc<AtomicUsize>) {
        let sessions = Arc::new(SessionStore::new(config.session.clone()));
        let calls = Arc::new(AtomicUsize::new(0));
        let extractor = Arc::new(CountingExtractor {
            inner: StubExtractor::default(),
            calls: Arc::clone(&calls),
        });
        let pipeline =
            VerificationPipeline::new(&config, extractor, Arc::clone(&sessions), fingerprints);
        (pipeline, sessions, calls)
    }

    #[test]
    fn good_face_enrolls_then_verifies_with_high_confidence() {
        let (pipeline, sessions, _) = build_pipeline(test_config(), Vec::new());

        let enrolled = pipeline
            .verify_face("kiosk-1", good_face_upload())
            .unwrap();
        assert!(enrolled.is_live);
        assert!(!enrolled.replay_detected);
        assert!(enrolled.error.is_none());
        assert_eq!(sessions.len(), 1);

        let verified = pipeline
            .verify_face("kiosk-1", good_face_upload())
            .unwrap();
        assert!(verified.is_live);
        assert!(!verified.replay_detected);
        assert!(
            verified.confidence >= 0.8,
            "confidence {:.3}",
            verified.confidence
        );
    }

    #[test]
    fn replay_face_short_circuits_before_extraction() {
        let (pipeline, sessions, calls) = build_pipeline(test_config(), Vec::new());

        let result = pipeline
            .verify_face("kiosk-2", striped_face_upload())
            .unwrap();
        assert!(!result.is_live);
        assert!(result.replay_detected);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(sessions.is_empty());
    }

    #[test]
    fn failed_liveness_is_a_decision_not_an_error() {
        let (pipeline, sessions, calls) = build_pipeline(test_config(), Vec::new());

        let result = pipeline.verify_face("kiosk-3", flat_face_upload()).unwrap();
        assert!(!result.is_live);
        assert!(!result.replay_detected);
        assert!(result.confidence < 0.8);
        assert!(result.error.is_none());
        // a subject that is not live never reaches the extractor
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(sessions.is_empty());
    }

    #[test]
    fn malformed_upload_is_a_decode_error() {
        let (pipeline, _, _) = build_pipeline(test_config(), Vec::new());

        let mut truncated = good_face_upload();
        truncated.truncate(100);
        let err = pipeline.verify_face("kiosk-4", truncated).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn invalid_session_id_is_rejected_before_decode() {
        let (pipeline, _, calls) = build_pipeline(test_config(), Vec::new());
        let err = pipeline
            .verify_face("bad id!", good_face_upload())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn every_exit_path_returns_buffers_to_zero() {
        let (pipeline, _, _) = build_pipeline(test_config(), Vec::new());

        // success path
        let ledger = WipeLedger::new();
        pipeline
            .face_flow("kiosk-5", good_face_upload(), &ledger)
            .unwrap();
        assert_eq!(ledger.live(), 0);

        // replay short-circuit
        let ledger = WipeLedger::new();
        pipeline
            .face_flow("kiosk-5", striped_face_upload(), &ledger)
            .unwrap();
        assert_eq!(ledger.live(), 0);

        // decode failure partway through
        let ledger = WipeLedger::new();
        let mut truncated = good_face_upload();
        truncated.truncate(100);
        assert!(pipeline
            .face_flow("kiosk-5", truncated, &ledger)
            .is_err());
        assert_eq!(ledger.live(), 0);

        // voice success path
        let ledger = WipeLedger::new();
        pipeline
            .voice_flow("kiosk-5", good_voice_upload(9), "hello", &ledger)
            .unwrap();
        assert_eq!(ledger.live(), 0);
    }

    #[test]
    fn budget_charge_decreases_and_exhaustion_is_a_decision() {
        let (pipeline, sessions, _) = build_pipeline(test_config(), Vec::new());

        pipeline.verify_face("kiosk-6", good_face_upload()).unwrap();
        let after_enroll = {
            let entry = sessions.get("kiosk-6").unwrap();
            let locked = entry.lock().unwrap();
            locked.privacy_budget_remaining
        };
        assert_eq!(after_enroll, 9.0);

        pipeline.verify_face("kiosk-6", good_face_upload()).unwrap();
        let after_verify = {
            let entry = sessions.get("kiosk-6").unwrap();
            let locked = entry.lock().unwrap();
            locked.privacy_budget_remaining
        };
        assert_eq!(after_verify, 8.0);

        {
            let entry = sessions.get("kiosk-6").unwrap();
            entry.lock().unwrap().privacy_budget_remaining = 0.0;
        }
        let result = pipeline.verify_face("kiosk-6", good_face_upload()).unwrap();
        assert!(!result.is_live);
        assert!(!result.replay_detected);
        assert_eq!(result.error.as_deref(), Some("privacy_budget_exhausted"));

        // the budget never goes negative and the session stays rejected
        let result = pipeline.verify_face("kiosk-6", good_face_upload()).unwrap();
        assert_eq!(result.error.as_deref(), Some("privacy_budget_exhausted"));
    }

    #[test]
    fn good_voice_enrolls_then_verifies() {
        let (pipeline, _, _) = build_pipeline(test_config(), Vec::new());

        let enrolled = pipeline
            .verify_voice("caller-1", good_voice_upload(21), "hello")
            .unwrap();
        assert!(enrolled.is_live);
        assert!(!enrolled.replay_detected);

        let verified = pipeline
            .verify_voice("caller-1", good_voice_upload(21), "hello")
            .unwrap();
        assert!(verified.is_live);
        assert!(verified.confidence >= 0.8);
    }

    #[test]
    fn fingerprinted_clip_is_replay_with_zero_confidence() {
        let upload = good_voice_upload(33);
        let clip = match WavDecoder::new().decode(&upload).unwrap() {
            Sample::Voice(voice) => voice,
            Sample::Face(_) => unreachable!(),
        };
        let library = vec![VoiceSpoofDetector::fingerprint_of(&clip, "replay-box")];

        let (pipeline, sessions, calls) = build_pipeline(test_config(), library);
        let result = pipeline
            .verify_voice("caller-2", upload, "hello")
            .unwrap();
        assert!(!result.is_live);
        assert!(result.replay_detected);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(sessions.is_empty());
    }

    #[test]
    fn clip_too_short_for_phrase_fails_as_decision() {
        let (pipeline, _, _) = build_pipeline(test_config(), Vec::new());

        // half a second cannot contain a pangram-length phrase
        let samples: Vec<f32> = lcg(5, 8000)
            .iter()
            .map(|v| (v - 0.5) * 0.9)
            .collect();
        let upload = encode_wav(TARGET_SAMPLE_RATE, &samples);
        let phrase = "the quick brown fox jumps over the lazy dog";
        let result = pipeline
            .verify_voice("caller-3", upload, phrase)
            .unwrap();
        assert!(!result.is_live);
        assert!(!result.replay_detected);
        assert_eq!(result.confidence, 0.0);
        assert!(result.error.is_none());
    }

    #[test]
    fn expired_session_re_enrolls_transparently() {
        let mut config = test_config();
        config.session = SessionConfig {
            ttl_secs: 0,
            sweep_interval_secs: 60,
        };
        let (pipeline, sessions, _) = build_pipeline(config, Vec::new());

        pipeline.verify_face("kiosk-7", good_face_upload()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));

        let result = pipeline.verify_face("kiosk-7", good_face_upload()).unwrap();
        assert!(result.is_live);
        assert_eq!(sessions.len(), 1);
        // a fresh enrollment starts from a fresh budget
        let entry = sessions.get("kiosk-7");
        if let Ok(entry) = entry {
            assert_eq!(entry.lock().unwrap().privacy_budget_remaining, 9.0);
        }
    }

    #[test]
    fn wav_bytes_through_the_face_endpoint_fail_to_decode() {
        let (pipeline, _, _) = build_pipeline(test_config(), Vec::new());
        let err = pipeline
            .verify_face("kiosk-8", good_voice_upload(3))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }
}
