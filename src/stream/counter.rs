//! 128-bit big-endian CTR counter block.

use std::fmt;

use crate::crypto::aes_ctr::AES_CTR_IV_SIZE;

/// How many low-order bits of the counter block take part in increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterWidth {
    /// Whole block is one big-endian integer, wrapping at 2^128. Matches the
    /// TA's own increment inside a single call.
    #[default]
    Full128,
    /// Only bytes 14..16 are incremented, wrapping at 2^16 with no carry
    /// into byte 13. Matches legacy TA client builds that incremented only
    /// the low half-word; diverges from real CTR once a stream crosses a 2^16-block
    /// boundary of the counter.
    Low16,
}

/// Counter block handed to the TA as the IV of the next call.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Counter([u8; AES_CTR_IV_SIZE]);

impl Counter {
    pub fn new(block: [u8; AES_CTR_IV_SIZE]) -> Self {
        Counter(block)
    }

    pub fn as_bytes(&self) -> &[u8; AES_CTR_IV_SIZE] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; AES_CTR_IV_SIZE] {
        self.0
    }

    /// Advance by `blocks` cipher blocks under `width`.
    pub fn advance(&mut self, blocks: u64, width: CounterWidth) {
        match width {
            CounterWidth::Full128 => {
                let value = u128::from_be_bytes(self.0).wrapping_add(u128::from(blocks));
                self.0 = value.to_be_bytes();
            }
            CounterWidth::Low16 => {
                let low = u16::from_be_bytes([self.0[14], self.0[15]]);
                // Truncation is the 2^16 wraparound.
                let low = low.wrapping_add(blocks as u16);
                self.0[14..].copy_from_slice(&low.to_be_bytes());
            }
        }
    }
}

impl From<[u8; AES_CTR_IV_SIZE]> for Counter {
    fn from(block: [u8; AES_CTR_IV_SIZE]) -> Self {
        Counter(block)
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Counter({})", hex::encode(self.0))
    }
}
