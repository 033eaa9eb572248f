//! Secure memory lifecycle for raw samples and derived embeddings
//!
//! Everything sensitive the pipeline touches lives in a [`SecureBuffer`],
//! which guarantees the region is zeroed before its memory is reclaimed.

pub mod buffer;

pub use buffer::{BufferError, SecureBuffer, WipeLedger};
