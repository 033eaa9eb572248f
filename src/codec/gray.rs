//! Grayscale frame-stack decoder for the face path
//!
//! Accepts one or more concatenated binary PGM (`P5`) images with equal
//! dimensions; multi-frame uploads give the liveness analyzer a short
//! sequence to score motion over.

use super::{DecodeError, FaceFrame, FaceSample, Sample, SampleDecoder};
use crate::secure::SecureBuffer;

/// Upper bound on frames per upload
const MAX_FRAMES: usize = 8;

/// Upper bound on either frame dimension
const MAX_DIM: usize = 4096;

#[derive(Debug, Clone, Copy, Default)]
pub struct GrayFrameDecoder;

impl GrayFrameDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl SampleDecoder for GrayFrameDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Sample, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mut frames = Vec::new();
        let mut cursor = 0usize;
        let mut dims: Option<(usize, usize)> = None;

        while cursor < bytes.len() {
            if frames.len() == MAX_FRAMES {
                return Err(DecodeError::Malformed(format!(
                    "more than {} frames in upload",
                    MAX_FRAMES
                )));
            }

            let (frame, consumed) = parse_pgm(&bytes[cursor..])?;
            match dims {
                None => dims = Some((frame.width(), frame.height())),
                Some((w, h)) if (frame.width(), frame.height()) != (w, h) => {
                    return Err(DecodeError::Malformed(
                        "frame dimensions differ within upload".to_string(),
                    ));
                }
                Some(_) => {}
            }
            frames.push(frame);
            cursor += consumed;
        }

        Ok(Sample::Face(FaceSample::new(frames)))
    }
}

/// Parse a single binary PGM starting at the head of `bytes`, returning the
/// frame and the number of bytes consumed.
fn parse_pgm(bytes: &[u8]) -> Result<(FaceFrame, usize), DecodeError> {
    let mut pos = 0usize;

    if bytes.len() < 2 || &bytes[..2] != b"P5" {
        return Err(DecodeError::Unsupported(
            "expected binary PGM (P5) frame".to_string(),
        ));
    }
    pos += 2;

    let width = read_header_value(bytes, &mut pos)?;
    let height = read_header_value(bytes, &mut pos)?;
    let maxval = read_header_value(bytes, &mut pos)?;

    if width == 0 || height == 0 || width > MAX_DIM || height > MAX_DIM {
        return Err(DecodeError::Malformed(format!(
            "implausible frame dimensions {}x{}",
            width, height
        )));
    }
    if maxval == 0 || maxval > 255 {
        return Err(DecodeError::Unsupported(format!(
            "PGM maxval {} (only 8-bit supported)",
            maxval
        )));
    }

    // Exactly one whitespace byte separates the header from pixel data.
    match bytes.get(pos) {
        Some(b) if b.is_ascii_whitespace() => pos += 1,
        _ => {
            return Err(DecodeError::Malformed(
                "missing separator before pixel data".to_string(),
            ))
        }
    }

    let pixel_count = width * height;
    let end = pos
        .checked_add(pixel_count)
        .ok_or_else(|| DecodeError::Malformed("frame size overflow".to_string()))?;
    if end > bytes.len() {
        return Err(DecodeError::Malformed(format!(
            "truncated frame: expected {} pixel bytes, found {}",
            pixel_count,
            bytes.len() - pos
        )));
    }

    let scale = 1.0 / maxval as f32;
    let mut luma = SecureBuffer::<f32>::acquire(pixel_count);
    {
        let out = luma.as_mut_slice();
        for (dst, src) in out.iter_mut().zip(&bytes[pos..end]) {
            *dst = *src as f32 * scale;
        }
    }

    Ok((FaceFrame::new(width, height, luma), end))
}

/// Read the next unsigned header field, skipping whitespace and `#` comments.
fn read_header_value(bytes: &[u8], pos: &mut usize) -> Result<usize, DecodeError> {
    loop {
        match bytes.get(*pos) {
            Some(b) if b.is_ascii_whitespace() => *pos += 1,
            Some(b'#') => {
                while let Some(b) = bytes.get(*pos) {
                    *pos += 1;
                    if *b == b'\n' {
                        break;
                    }
                }
            }
            Some(b) if b.is_ascii_digit() => break,
            _ => {
                return Err(DecodeError::Malformed(
                    "truncated or non-numeric PGM header".to_string(),
                ))
            }
        }
    }

    let mut value = 0usize;
    while let Some(b) = bytes.get(*pos) {
        if !b.is_ascii_digit() {
            break;
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as usize))
            .ok_or_else(|| DecodeError::Malformed("header value overflow".to_string()))?;
        *pos += 1;
    }
    Ok(value)
}

/// Encode luma frames (values in [0, 1]) as a concatenated P5 stack.
/// Used by the self-test binary and the test suite to synthesize uploads.
pub fn encode_frames(width: usize, height: usize, frames: &[Vec<f32>]) -> Vec<u8> {
    let mut out = Vec::new();
    for frame in frames {
        out.extend_from_slice(format!("P5\n{} {}\n255\n", width, height).as_bytes());
        for v in frame {
            out.push((v.clamp(0.0, 1.0) * 255.0).round() as u8);
        }
    }
    out
}
