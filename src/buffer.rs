//! Growable append-only output buffer with logical offsets.
//!
//! Offsets handed out by [`OutputBuffer::position`] are logical positions
//! into the byte sequence, not addresses, so they stay valid across
//! reallocation. The encoder keeps two of these: the live output and a
//! scratch buffer the compression post-processor writes into before an O(1)
//! [`OutputBuffer::swap_with`] replaces the body without copying.
//!
//! Growth goes through `try_reserve`, so allocation failure surfaces as
//! [`EncoderError::OutOfMemory`] instead of aborting the process.

use crate::error::{EncoderError, Result};

/// Default initial capacity of a fresh output buffer.
///
/// A pure tuning knob (the original keeps it at 64 bytes, 1 in
/// memory-debug builds); configurable through the encoder builder.
pub const INITIAL_CAPACITY: usize = 64;

/// An append-only byte sink with position tracking.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    data: Vec<u8>,
}

impl OutputBuffer {
    /// Creates a buffer with the given initial capacity.
    ///
    /// Falls back to an unallocated buffer if the reservation fails; the
    /// first append will retry and report the failure properly.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut data = Vec::new();
        let _ = data.try_reserve(capacity);
        Self { data }
    }

    /// Guarantees room for at least `additional` more bytes.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        self.data.try_reserve(additional)?;
        Ok(())
    }

    /// Current logical write position; usable as a backreference target.
    pub fn position(&self) -> u64 {
        self.data.len() as u64
    }

    /// Appends raw bytes.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Appends a single byte.
    pub fn push_byte(&mut self, byte: u8) -> Result<()> {
        self.reserve(1)?;
        self.data.push(byte);
        Ok(())
    }

    /// Appends an unsigned LEB128 varint.
    ///
    /// At most 10 bytes for a full 64-bit value.
    pub fn push_varint(&mut self, mut n: u64) -> Result<()> {
        self.reserve(10)?;
        while n >= 0x80 {
            self.data.push((n as u8) | 0x80);
            n >>= 7;
        }
        self.data.push(n as u8);
        Ok(())
    }

    /// Overwrites a single already-written byte in place.
    ///
    /// Used to patch the compression descriptor nibble and to set the track
    /// flag on backreference targets. The header and every emitted tag are
    /// fixed in position, so patching never shifts recorded offsets.
    pub fn patch_byte(&mut self, position: u64, f: impl FnOnce(u8) -> u8) -> Result<()> {
        let idx = position as usize;
        match self.data.get_mut(idx) {
            Some(byte) => {
                *byte = f(*byte);
                Ok(())
            }
            None => Err(EncoderError::Internal(format!(
                "patch at {idx} beyond buffer end {}",
                self.data.len()
            ))),
        }
    }

    /// Read access to everything written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Logical length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drops all content but keeps the backing allocation, amortizing
    /// allocation cost across repeated encodes on a reused instance.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Exchanges contents with another buffer in O(1).
    ///
    /// The compression post-processor builds the rewritten document in the
    /// scratch buffer and swaps it in, replacing the body without a copy.
    pub fn swap_with(&mut self, other: &mut OutputBuffer) {
        std::mem::swap(&mut self.data, &mut other.data);
    }
}
