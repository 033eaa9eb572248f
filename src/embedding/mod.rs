//! Embedding types and the extraction collaborator seam
//!
//! Raw embeddings are biometric templates: they live in secure buffers,
//! never leave the pipeline, and are never compared directly. Only their
//! noised form ([`NoisedEmbedding`]) may be stored or compared.

pub mod stub;

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec::Sample;
use crate::secure::{SecureBuffer, WipeLedger};

pub use stub::StubExtractor;

/// Default embedding dimensionality of the built-in stub extractor
pub const STUB_EMBEDDING_DIM: usize = 64;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("extractor does not support this sample modality")]
    Unsupported,

    #[error("extraction failed: {0}")]
    Failed(String),
}

/// Raw fixed-length embedding, secure-buffer backed.
pub struct Embedding {
    values: SecureBuffer<f32>,
}

impl Embedding {
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self {
            values: SecureBuffer::from_vec(values),
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        self.values.as_slice()
    }

    /// Scale to unit length in place; zero vectors stay zero.
    pub fn normalize(&mut self) {
        let values = self.values.as_mut_slice();
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in values.iter_mut() {
                *x /= norm;
            }
        }
    }

    pub(crate) fn track(&mut self, ledger: &WipeLedger) {
        self.values.track(ledger);
    }
}

/// Noise-protected embedding: the only form ever compared or stored.
/// Zeroes itself when dropped, so an expiring session template cannot
/// linger in freed memory.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct NoisedEmbedding {
    values: Vec<f32>,
}

impl NoisedEmbedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }
}

impl std::fmt::Debug for NoisedEmbedding {
    // Values are never printed, only the shape.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoisedEmbedding")
            .field("dim", &self.values.len())
            .finish()
    }
}

/// External ML capability: maps a decoded sample to a fresh embedding the
/// pipeline takes ownership of (and wipes).
pub trait EmbeddingExtractor: Send + Sync {
    fn dim(&self) -> usize;

    fn extract(&self, sample: &Sample) -> Result<Embedding, ExtractError>;
}
