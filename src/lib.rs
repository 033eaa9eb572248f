//! Pulsegate - in-memory biometric liveness verification core
//!
//! Face and voice verification without persistence: every sensitive
//! buffer is wiped before its memory is reclaimed, embeddings are only
//! ever compared in differentially-private noised form, and session
//! state is ephemeral by construction. Transport, trained models, and
//! storage are external collaborators; the seams are
//! [`codec::SampleDecoder`] and [`embedding::EmbeddingExtractor`].

pub mod codec;
pub mod config;
pub mod embedding;
pub mod error;
pub mod liveness;
pub mod matching;
pub mod pipeline;
pub mod preflight;
pub mod privacy;
pub mod risk;
pub mod secure;
pub mod service;
pub mod session;
pub mod spoof;
pub mod validation;

pub use config::AppConfig;
pub use error::PipelineError;
pub use pipeline::{VerificationPipeline, VerificationResult};
pub use service::{ApiError, HealthStatus, VerificationService};
pub use session::{SessionStore, SweepWorker};
