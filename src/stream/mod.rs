//! Stateful AES-CTR streaming over the shared buffers.
//!
//! A stream is decrypted in chunks no larger than the shared input buffer.
//! Between chunks the caller keeps a [`StreamState`]: the counter block for
//! the next call and the ciphertext of the block left unfinished by the
//! previous one. Each chunk costs exactly one TA invocation; concatenating
//! the outputs gives the same bytes as decrypting the whole stream at once.
//!
//! ```text
//! staged input:  [ carry (offset bytes) | chunk (len bytes) ]
//!                  \___ block k under counter c ___/ ...
//! output:        [ discarded            | returned to caller ]
//! next state:    counter += total / 16, carry = staged[16 * (total / 16)..]
//! ```

mod carry;
mod counter;


pub use carry::CarryState;
pub use counter::{Counter, CounterWidth};

use crate::crypto::aes_ctr::{AES_128_KEY_SIZE, AES_BLOCK_SIZE};
use crate::error::TeeError;
use crate::gateway::Gateway;
use crate::pool::SharedBufferPool;
use crate::tee::SecureChannel;

/// Position of a caller's stream between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamState {
    pub counter: Counter,
    pub carry: CarryState,
}

impl StreamState {
    /// Fresh stream starting at counter block `iv`.
    pub fn new(iv: [u8; 16]) -> Self {
        Self {
            counter: Counter::new(iv),
            carry: CarryState::new(),
        }
    }
}

/// Reject a chunk that cannot be processed, before anything is written.
///
/// Zero-length chunks pass; they are a no-op for the caller to short-circuit.
pub(crate) fn check_chunk(
    key: &[u8],
    state: &StreamState,
    len: usize,
    out_len: usize,
    capacity: usize,
) -> Result<(), TeeError> {
    if key.len() != AES_128_KEY_SIZE {
        return Err(TeeError::KeyOrIvLengthMismatch {
            field: "key",
            expected: AES_128_KEY_SIZE,
            actual: key.len(),
        });
    }
    if out_len < len {
        return Err(TeeError::OutputTooSmall {
            needed: len,
            available: out_len,
        });
    }
    let total = state.carry.offset() + len;
    if total > capacity {
        return Err(TeeError::SizeLimitExceeded {
            requested: total,
            capacity,
        });
    }
    Ok(())
}

/// Borrowed view of an open session for the duration of one chunk.
pub struct CtrStream<'a, C: SecureChannel> {
    channel: &'a mut C,
    pool: &'a mut SharedBufferPool<C::Memory>,
    gateway: Gateway,
    width: CounterWidth,
}

impl<'a, C: SecureChannel> CtrStream<'a, C> {
    pub fn new(
        channel: &'a mut C,
        pool: &'a mut SharedBufferPool<C::Memory>,
        gateway: Gateway,
        width: CounterWidth,
    ) -> Self {
        Self {
            channel,
            pool,
            gateway,
            width,
        }
    }

    /// Decrypt one chunk into `out`, returning the number of bytes written
    /// (always `ciphertext.len()`).
    ///
    /// Validation failures leave `state` and the shared buffers untouched.
    /// `state` is only advanced after the TA call succeeded.
    pub fn decrypt_chunk(
        &mut self,
        ciphertext: &[u8],
        key: &[u8],
        state: &mut StreamState,
        out: &mut [u8],
    ) -> Result<usize, TeeError> {
        let len = ciphertext.len();
        check_chunk(key, state, len, out.len(), self.pool.capacity())?;
        if len == 0 {
            return Ok(0);
        }

        let offset = state.carry.offset();
        let total = self.pool.stage(state.carry.bytes(), ciphertext)?;
        self.pool.write_key(key)?;
        self.pool.write_iv(state.counter.as_bytes())?;

        let plaintext = self
            .gateway
            .invoke_decrypt(&mut *self.channel, &mut *self.pool, total)?;
        out[..len].copy_from_slice(&plaintext[offset..total]);

        let whole = total / AES_BLOCK_SIZE;
        let consumed = whole * AES_BLOCK_SIZE;
        state.counter.advance(whole as u64, self.width);
        state.carry.set(&self.pool.staged(total)[consumed..]);

        log::debug!(
            "CTR chunk: {} bytes (+{} carried), {} blocks consumed, carry now {}",
            len,
            offset,
            whole,
            state.carry.offset()
        );
        Ok(len)
    }
}
