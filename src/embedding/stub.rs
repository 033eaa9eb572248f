//! Stub embedding extractor for development and tests
//!
//! Produces a deterministic statistical profile of the sample instead of
//! a learned representation: block means for frames, chunk RMS for
//! waveforms. Identical inputs map to identical embeddings, which is all
//! the pipeline and its tests need without a model runtime.

use super::{Embedding, EmbeddingExtractor, ExtractError, STUB_EMBEDDING_DIM};
use crate::codec::Sample;

pub struct StubExtractor {
    dim: usize,
}

impl StubExtractor {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for StubExtractor {
    fn default() -> Self {
        Self::new(STUB_EMBEDDING_DIM)
    }
}

impl EmbeddingExtractor for StubExtractor {
    fn dim(&self) -> usize {
        self.dim
    }

    fn extract(&self, sample: &Sample) -> Result<Embedding, ExtractError> {
        let values = match sample {
            Sample::Face(face) => {
                let frame = face
                    .frames()
                    .first()
                    .ok_or_else(|| ExtractError::Failed("no frames to extract".to_string()))?;
                chunk_profile(frame.luma(), self.dim, ChunkStat::Mean)
            }
            Sample::Voice(voice) => chunk_profile(voice.samples(), self.dim, ChunkStat::Rms),
        };
        Ok(Embedding::from_vec(values))
    }
}

enum ChunkStat {
    Mean,
    Rms,
}

/// Fold `values` into `dim` contiguous chunks, one statistic per chunk.
fn chunk_profile(values: &[f32], dim: usize, stat: ChunkStat) -> Vec<f32> {
    let chunk_size = (values.len() / dim).max(1);
    let mut out = Vec::with_capacity(dim);
    for chunk in values.chunks(chunk_size).take(dim) {
        let v = match stat {
            ChunkStat::Mean => chunk.iter().sum::<f32>() / chunk.len() as f32,
            ChunkStat::Rms => {
                (chunk.iter().map(|s| (*s as f64).powi(2)).sum::<f64>() / chunk.len() as f64)
                    .sqrt() as f32
            }
        };
        out.push(v);
    }
    out.resize(dim, 0.0);
    out
}
