//! Bounded byte buffer shared by the relay, the aggregator and the
//! peripheral-mode formatter.
//!
//! One byte of [`DATA_BUFFER_LEN`] stays reserved for a terminator, so at
//! most [`DataBuffer::USABLE`] bytes are ever stored.  Writes are
//! overwrite-in-place: the previous content is discarded first.

use crate::config::DATA_BUFFER_LEN;
use heapless::Vec;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataBuffer {
    bytes: Vec<u8, DATA_BUFFER_LEN>,
}

impl DataBuffer {
    /// Bytes that can actually be stored.
    pub const USABLE: usize = DATA_BUFFER_LEN - 1;

    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Total capacity including the reserved terminator byte.
    pub const fn capacity(&self) -> usize {
        DATA_BUFFER_LEN
    }

    /// Replace the content with `data`, truncated to [`Self::USABLE`].
    /// Returns the number of bytes kept.
    pub fn overwrite(&mut self, data: &[u8]) -> usize {
        self.bytes.clear();
        let n = data.len().min(Self::USABLE);
        // Cannot fail: n < capacity.
        let _ = self.bytes.extend_from_slice(&data[..n]);
        n
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Fixed-size, zero-padded image of the buffer (content + terminator).
    pub fn to_array(&self) -> [u8; DATA_BUFFER_LEN] {
        let mut out = [0u8; DATA_BUFFER_LEN];
        out[..self.bytes.len()].copy_from_slice(&self.bytes);
        out
    }
}

/// Appends formatted text, silently dropping what does not fit.
impl core::fmt::Write for DataBuffer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let room = Self::USABLE - self.bytes.len();
        let n = s.len().min(room);
        let _ = self.bytes.extend_from_slice(&s.as_bytes()[..n]);
        Ok(())
    }
}
