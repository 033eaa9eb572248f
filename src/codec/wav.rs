//! WAV decoder for the voice path
//!
//! Accepts 16-bit PCM or 32-bit float WAV, any rate, downmixing to mono
//! the way the capture path would.

use std::io::Cursor;

use super::{DecodeError, MIN_VOICE_SAMPLES, Sample, SampleDecoder, VoiceSample};
use crate::secure::SecureBuffer;

#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl WavDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl SampleDecoder for WavDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Sample, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mut reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 {
            return Err(DecodeError::Malformed("zero channels".to_string()));
        }

        let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 16) => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
                .collect::<Result<_, _>>()
                .map_err(|e| DecodeError::Malformed(e.to_string()))?,
            (hound::SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| DecodeError::Malformed(e.to_string()))?,
            (format, bits) => {
                return Err(DecodeError::Unsupported(format!(
                    "{:?} {}-bit WAV",
                    format, bits
                )))
            }
        };

        // Downmix to mono by averaging channels.
        let mono: Vec<f32> = interleaved
            .chunks(channels)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
            .collect();

        if mono.len() < MIN_VOICE_SAMPLES {
            return Err(DecodeError::Malformed(format!(
                "audio clip too short: {} samples (minimum {})",
                mono.len(),
                MIN_VOICE_SAMPLES
            )));
        }

        Ok(Sample::Voice(VoiceSample::new(
            spec.sample_rate,
            SecureBuffer::from_vec(mono),
        )))
    }
}

/// Encode a mono f32 waveform as 16-bit PCM WAV bytes.
/// Used by the self-test binary and the test suite to synthesize uploads.
pub fn encode_wav(sample_rate: u32, samples: &[f32]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("in-memory WAV writer");
        for s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .expect("in-memory WAV write");
        }
        writer.finalize().expect("in-memory WAV finalize");
    }
    cursor.into_inner()
}
