//! Shared buffer pool.
//!
//! Four blocks of shared memory are allocated once per session and reused for
//! every chunk: ciphertext in, plaintext out, the counter block and the key.
//! Shared memory is a scarce resource on the TEE side, so nothing here
//! allocates per call.

use zeroize::Zeroize;

use crate::crypto::aes_ctr::{AES_128_KEY_SIZE, AES_CTR_IV_SIZE};
use crate::error::TeeError;
use crate::tee::{MemFlags, SecureChannel, SharedMemory};

pub struct SharedBufferPool<M> {
    input: M,
    output: M,
    iv: M,
    key: M,
    capacity: usize,
}

fn allocate_block<C: SecureChannel>(
    channel: &mut C,
    buffer: &'static str,
    size: usize,
    flags: MemFlags,
) -> Result<C::Memory, TeeError> {
    channel.allocate_shared(size, flags).map_err(|failure| {
        log::error!("Shared memory allocation for {} buffer ({} bytes) failed: {}", buffer, size, failure);
        TeeError::Allocation { buffer, failure }
    })
}

impl<M: SharedMemory> SharedBufferPool<M> {
    /// Allocate the four blocks, data blocks sized `capacity` bytes each.
    ///
    /// If any allocation fails, the blocks already obtained are released
    /// before the error is returned.
    pub fn allocate<C>(channel: &mut C, capacity: usize) -> Result<Self, TeeError>
    where
        C: SecureChannel<Memory = M>,
    {
        let input = allocate_block(channel, "input", capacity, MemFlags::INPUT)?;
        let output = match allocate_block(channel, "output", capacity, MemFlags::OUTPUT) {
            Ok(block) => block,
            Err(e) => {
                channel.release_shared(input);
                return Err(e);
            }
        };
        let iv = match allocate_block(channel, "IV", AES_CTR_IV_SIZE, MemFlags::INPUT) {
            Ok(block) => block,
            Err(e) => {
                channel.release_shared(input);
                channel.release_shared(output);
                return Err(e);
            }
        };
        let key = match allocate_block(channel, "key", AES_128_KEY_SIZE, MemFlags::INPUT) {
            Ok(block) => block,
            Err(e) => {
                channel.release_shared(input);
                channel.release_shared(output);
                channel.release_shared(iv);
                return Err(e);
            }
        };

        Ok(Self {
            input,
            output,
            iv,
            key,
            capacity,
        })
    }

    /// Wipe key material and hand every block back to the channel.
    pub fn release<C>(mut self, channel: &mut C)
    where
        C: SecureChannel<Memory = M>,
    {
        self.key.as_mut_slice().zeroize();
        self.iv.as_mut_slice().zeroize();
        channel.release_shared(self.input);
        channel.release_shared(self.output);
        channel.release_shared(self.iv);
        channel.release_shared(self.key);
    }

    /// Size of the ciphertext-in (and plaintext-out) block in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn write_key(&mut self, key: &[u8]) -> Result<(), TeeError> {
        Self::write_block(&mut self.key, "key", key)
    }

    pub fn write_iv(&mut self, iv: &[u8]) -> Result<(), TeeError> {
        Self::write_block(&mut self.iv, "IV", iv)
    }

    fn write_block(block: &mut M, field: &'static str, bytes: &[u8]) -> Result<(), TeeError> {
        if bytes.len() != block.len() {
            return Err(TeeError::KeyOrIvLengthMismatch {
                field,
                expected: block.len(),
                actual: bytes.len(),
            });
        }
        block.as_mut_slice().copy_from_slice(bytes);
        Ok(())
    }

    /// Place `carry` followed by `chunk` at the front of the input block.
    ///
    /// Returns the number of staged bytes. Nothing is written when the total
    /// does not fit.
    pub fn stage(&mut self, carry: &[u8], chunk: &[u8]) -> Result<usize, TeeError> {
        let total = carry.len() + chunk.len();
        if total > self.capacity {
            return Err(TeeError::SizeLimitExceeded {
                requested: total,
                capacity: self.capacity,
            });
        }

        let input = self.input.as_mut_slice();
        input[..carry.len()].copy_from_slice(carry);
        input[carry.len()..total].copy_from_slice(chunk);
        Ok(total)
    }

    /// The first `len` staged ciphertext bytes.
    pub fn staged(&self, len: usize) -> &[u8] {
        &self.input.as_slice()[..len]
    }

    /// The first `len` bytes of the plaintext-out block.
    pub fn plaintext(&self, len: usize) -> &[u8] {
        &self.output.as_slice()[..len]
    }

    /// Mutable views of (input, output, IV, key) for building an operation.
    pub(crate) fn blocks_mut(&mut self) -> (&mut M, &mut M, &mut M, &mut M) {
        (&mut self.input, &mut self.output, &mut self.iv, &mut self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ta::TA_AES_DECRYPTOR_UUID;
    use crate::tee::SoftTee;

    fn open_tee() -> SoftTee {
        let mut tee = SoftTee::new();
        tee.open_session(&TA_AES_DECRYPTOR_UUID).unwrap();
        tee
    }

    #[test]
    fn test_allocate_and_release() {
        let mut tee = open_tee();
        let pool = SharedBufferPool::allocate(&mut tee, 64).unwrap();
        assert_eq!(pool.capacity(), 64);
        assert_eq!(tee.live_allocations(), 4);

        pool.release(&mut tee);
        assert_eq!(tee.live_allocations(), 0);
        assert_eq!(tee.stats().releases, 4);
    }

    #[test]
    fn test_partial_allocation_failure_releases_acquired() {
        let mut tee = SoftTee::new().fail_allocation(2);
        tee.open_session(&TA_AES_DECRYPTOR_UUID).unwrap();

        let err = SharedBufferPool::allocate(&mut tee, 64).err().unwrap();
        assert!(matches!(err, TeeError::Allocation { buffer: "IV", .. }));
        assert_eq!(tee.live_allocations(), 0);
        assert_eq!(tee.stats().releases, 2);
    }

    #[test]
    fn test_write_key_rejects_wrong_length() {
        let mut tee = open_tee();
        let mut pool = SharedBufferPool::allocate(&mut tee, 64).unwrap();

        let err = pool.write_key(&[1u8; 32]).unwrap_err();
        assert!(matches!(
            err,
            TeeError::KeyOrIvLengthMismatch {
                field: "key",
                expected: 16,
                actual: 32
            }
        ));
        assert!(pool.write_iv(&[0u8; 15]).is_err());
        assert!(pool.write_key(&[1u8; 16]).is_ok());
        pool.release(&mut tee);
    }

    #[test]
    fn test_stage_places_carry_first() {
        let mut tee = open_tee();
        let mut pool = SharedBufferPool::allocate(&mut tee, 8).unwrap();

        let staged = pool.stage(&[1, 2], &[3, 4, 5]).unwrap();
        assert_eq!(staged, 5);
        assert_eq!(pool.staged(5), &[1, 2, 3, 4, 5]);
        pool.release(&mut tee);
    }

    #[test]
    fn test_stage_rejects_oversize_without_writing() {
        let mut tee = open_tee();
        let mut pool = SharedBufferPool::allocate(&mut tee, 8).unwrap();
        pool.stage(&[], &[9u8; 8]).unwrap();

        let err = pool.stage(&[1], &[2u8; 8]).unwrap_err();
        assert!(matches!(
            err,
            TeeError::SizeLimitExceeded {
                requested: 9,
                capacity: 8
            }
        ));
        assert_eq!(pool.staged(8), &[9u8; 8]);
        pool.release(&mut tee);
    }
}
