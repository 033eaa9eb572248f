//! Decoded sample types and the decode collaborator seam
//!
//! Uploads arrive as opaque bytes. A [`SampleDecoder`] turns them into a
//! [`Sample`] whose pixel and waveform data live in secure buffers. The
//! crate ships two reference decoders (grayscale frame stacks, WAV); a
//! transport collaborator may plug in its own.

pub mod gray;
pub mod wav;

use crate::secure::{SecureBuffer, WipeLedger};
use thiserror::Error;

pub use gray::GrayFrameDecoder;
pub use wav::WavDecoder;

/// Target sample rate for voice processing (16 kHz)
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Shortest voice clip the pipeline will analyze
pub const MIN_VOICE_SAMPLES: usize = 512;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("unsupported format: {0}")]
    Unsupported(String),
}

/// Single decoded luma frame, values in [0, 1].
pub struct FaceFrame {
    width: usize,
    height: usize,
    luma: SecureBuffer<f32>,
}

impl FaceFrame {
    pub fn new(width: usize, height: usize, luma: SecureBuffer<f32>) -> Self {
        debug_assert_eq!(width * height, luma.len());
        Self {
            width,
            height,
            luma,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn luma(&self) -> &[f32] {
        self.luma.as_slice()
    }

    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.luma.as_slice()[y * self.width + x]
    }

    pub(crate) fn track(&mut self, ledger: &WipeLedger) {
        self.luma.track(ledger);
    }
}

/// Short frame sequence for the face path, optionally with a stereo
/// disparity map supplied by a depth-capable collaborator.
pub struct FaceSample {
    frames: Vec<FaceFrame>,
    disparity: Option<SecureBuffer<f32>>,
}

impl FaceSample {
    pub fn new(frames: Vec<FaceFrame>) -> Self {
        Self {
            frames,
            disparity: None,
        }
    }

    pub fn with_disparity(frames: Vec<FaceFrame>, disparity: SecureBuffer<f32>) -> Self {
        Self {
            frames,
            disparity: Some(disparity),
        }
    }

    pub fn frames(&self) -> &[FaceFrame] {
        &self.frames
    }

    pub fn disparity(&self) -> Option<&[f32]> {
        self.disparity.as_ref().map(|d| d.as_slice())
    }

    pub(crate) fn track(&mut self, ledger: &WipeLedger) {
        for frame in &mut self.frames {
            frame.track(ledger);
        }
        if let Some(d) = &mut self.disparity {
            d.track(ledger);
        }
    }
}

/// Mono waveform for the voice path, values in [-1, 1].
pub struct VoiceSample {
    sample_rate: u32,
    samples: SecureBuffer<f32>,
}

impl VoiceSample {
    pub fn new(sample_rate: u32, samples: SecureBuffer<f32>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        self.samples.as_slice()
    }

    pub fn duration_ms(&self) -> u64 {
        (self.samples.len() as f64 / self.sample_rate as f64 * 1000.0) as u64
    }

    pub(crate) fn track(&mut self, ledger: &WipeLedger) {
        self.samples.track(ledger);
    }
}

/// Decoded sample, immutable once produced.
pub enum Sample {
    Face(FaceSample),
    Voice(VoiceSample),
}

impl std::fmt::Debug for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sample::Face(_) => f.write_str("Sample::Face"),
            Sample::Voice(_) => f.write_str("Sample::Voice"),
        }
    }
}

impl Sample {
    pub(crate) fn track(&mut self, ledger: &WipeLedger) {
        match self {
            Sample::Face(f) => f.track(ledger),
            Sample::Voice(v) => v.track(ledger),
        }
    }
}

/// Format-specific decode collaborator: bytes in, owned fresh sample out.
/// The pipeline takes over the returned memory and wipes it.
pub trait SampleDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Sample, DecodeError>;
}
