//! Partial-block carry between streaming calls.

use crate::crypto::aes_ctr::AES_BLOCK_SIZE;
use crate::error::TeeError;

/// Ciphertext bytes of a block the previous call did not finish.
///
/// The counter is not advanced past an unfinished block, so the next call
/// re-submits these bytes in front of its chunk and the TA decrypts the
/// whole block again under the same counter; the carried prefix of the
/// output is then discarded.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct CarryState {
    offset: usize,
    bytes: [u8; AES_BLOCK_SIZE],
}

impl CarryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the `(ecount_buf, num)` pair of the conventional CTR API.
    pub fn from_parts(bytes: [u8; AES_BLOCK_SIZE], offset: u32) -> Result<Self, TeeError> {
        if offset as usize >= AES_BLOCK_SIZE {
            return Err(TeeError::InvalidCarryOffset { offset });
        }
        Ok(Self {
            offset: offset as usize,
            bytes,
        })
    }

    /// Number of bytes already consumed from the current block.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The carried bytes (`offset` of them).
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.offset]
    }

    /// Raw 16-byte carry buffer, valid up to `offset`.
    pub fn raw(&self) -> &[u8; AES_BLOCK_SIZE] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.offset == 0
    }

    /// Replace the carry with `tail`, which must be shorter than one block.
    pub(crate) fn set(&mut self, tail: &[u8]) {
        debug_assert!(tail.len() < AES_BLOCK_SIZE);
        self.bytes = [0u8; AES_BLOCK_SIZE];
        self.bytes[..tail.len()].copy_from_slice(tail);
        self.offset = tail.len();
    }
}

impl std::fmt::Debug for CarryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarryState")
            .field("offset", &self.offset)
            .field("bytes", &hex::encode(self.bytes()))
            .finish()
    }
}
