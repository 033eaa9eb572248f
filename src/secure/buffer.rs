//! Owned, fixed-lifetime memory regions with guaranteed zeroing on release
//!
//! A `SecureBuffer` is acquired zero-initialized, written under bounds
//! checks, and wiped exactly once. Dropping an unwiped buffer wipes it, so
//! early returns, `?` propagation, and panics cannot leak a live region.
//! A wipe that cannot be verified aborts the process: terminating beats
//! letting a sensitive buffer survive.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use zeroize::{DefaultIsZeroes, Zeroize};

/// Process-wide count of buffers that are allocated but not yet wiped.
static LIVE_UNWIPED: AtomicUsize = AtomicUsize::new(0);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BufferError {
    #[error("write out of bounds: offset {offset} + {len} exceeds capacity {capacity}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
}

/// Per-request audit counter for the pipeline's cleanup stage.
///
/// Every buffer a request allocates is tracked here; the count returns to
/// zero once each one has been wiped. The pipeline checks this on every
/// exit path.
#[derive(Debug, Clone, Default)]
pub struct WipeLedger {
    live: Arc<AtomicUsize>,
}

impl WipeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers tracked by this ledger that have not been wiped yet.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Fixed-size region holding sensitive bytes or floats.
///
/// Invariant: once `wiped` is set, no read is permitted; `as_slice` treats
/// a read-after-wipe as a programming error and panics.
pub struct SecureBuffer<T>
where
    T: DefaultIsZeroes + PartialEq,
{
    data: Vec<T>,
    wiped: bool,
    ledger: Option<Arc<AtomicUsize>>,
}

impl<T> SecureBuffer<T>
where
    T: DefaultIsZeroes + PartialEq,
{
    /// Allocate a zero-initialized region of `len` elements.
    pub fn acquire(len: usize) -> Self {
        LIVE_UNWIPED.fetch_add(1, Ordering::SeqCst);
        Self {
            data: vec![T::default(); len],
            wiped: false,
            ledger: None,
        }
    }

    /// Take ownership of fresh memory handed over by a collaborator
    /// (decoder, extractor). The buffer wipes it like its own.
    pub fn from_vec(data: Vec<T>) -> Self {
        LIVE_UNWIPED.fetch_add(1, Ordering::SeqCst);
        Self {
            data,
            wiped: false,
            ledger: None,
        }
    }

    /// Register this buffer with a request ledger. Idempotent.
    pub fn track(&mut self, ledger: &WipeLedger) {
        if self.ledger.is_some() {
            return;
        }
        ledger.live.fetch_add(1, Ordering::SeqCst);
        self.ledger = Some(Arc::clone(&ledger.live));
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_wiped(&self) -> bool {
        self.wiped
    }

    /// Write `src` into the region starting at `offset`.
    pub fn write(&mut self, offset: usize, src: &[T]) -> Result<(), BufferError> {
        assert!(!self.wiped, "write into wiped SecureBuffer");
        let end = offset.checked_add(src.len());
        match end {
            Some(end) if end <= self.data.len() => {
                self.data[offset..end].copy_from_slice(src);
                Ok(())
            }
            _ => Err(BufferError::OutOfBounds {
                offset,
                len: src.len(),
                capacity: self.data.len(),
            }),
        }
    }

    /// Read access to the region. Panics if the buffer has been wiped.
    pub fn as_slice(&self) -> &[T] {
        assert!(!self.wiped, "read from wiped SecureBuffer");
        &self.data
    }

    /// Mutable access for in-place derivation (e.g. normalization).
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        assert!(!self.wiped, "write into wiped SecureBuffer");
        &mut self.data
    }

    /// Overwrite the entire region with zeroes and mark it wiped.
    /// Idempotent. Aborts the process if the zeroing cannot be verified.
    pub fn wipe(&mut self) {
        if self.wiped {
            return;
        }
        self.data.as_mut_slice().zeroize();
        // A wiped region must scan as all zeroes; anything else is fatal.
        if self.data.iter().any(|v| *v != T::default()) {
            log::error!(
                "secure wipe verification failed over {} elements; aborting",
                self.data.len()
            );
            std::process::abort();
        }
        self.wiped = true;
        LIVE_UNWIPED.fetch_sub(1, Ordering::SeqCst);
        if let Some(ledger) = &self.ledger {
            ledger.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Process-wide count of live, not-yet-wiped buffers.
    pub fn live_unwiped() -> usize {
        LIVE_UNWIPED.load(Ordering::SeqCst)
    }
}

impl<T> Drop for SecureBuffer<T>
where
    T: DefaultIsZeroes + PartialEq,
{
    fn drop(&mut self) {
        self.wipe();
    }
}

impl<T> std::fmt::Debug for SecureBuffer<T>
where
    T: DefaultIsZeroes + PartialEq,
{
    // Contents are never printed, only shape and state.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureBuffer")
            .field("len", &self.data.len())
            .field("wiped", &self.wiped)
            .finish()
    }
}
