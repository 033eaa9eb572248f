//! Error taxonomy for the verification pipeline
//!
//! Decision outcomes (spoof detected, liveness failed, budget exhausted)
//! are not errors; they come back as ordinary `VerificationResult`s. Only
//! infrastructure faults land here, and only the service facade decides
//! what a client may see of them. An unverifiable wipe is not represented
//! at all: it aborts the process.

use thiserror::Error;

use crate::codec::DecodeError;
use crate::embedding::ExtractError;
use crate::session::SessionError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed upload; safe to report to the uploader in principle,
    /// though the service facade stays generic anyway.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("invalid request input: {0}")]
    Validation(#[from] ValidationError),

    #[error("embedding extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// Unexpected internal fault; full detail is logged, the client only
    /// ever sees a generic message.
    #[error("internal processing error: {0}")]
    Processing(String),
}
