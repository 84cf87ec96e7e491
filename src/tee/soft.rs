//! In-process software stand-in for the AES decryptor TA.
//!
//! Implements [`SecureChannel`] on plain heap buffers and runs AES-128-CTR
//! with the `aes`/`ctr` crates. It enforces the same parameter contract the
//! TA checks (types, flags, sizes, command id) and keeps counters of what the
//! host did, which makes it the test double for the whole adapter. Faults can
//! be injected for the open, allocate and invoke paths.

use std::collections::HashSet;

use zeroize::{Zeroize, Zeroizing};

use super::operation::{Operation, Param};
use super::types::{
    MemFlags, ReturnOrigin, TaUuid, TeecFailure, TEEC_ERROR_BAD_PARAMETERS, TEEC_ERROR_BAD_STATE,
    TEEC_ERROR_ITEM_NOT_FOUND, TEEC_ERROR_NOT_SUPPORTED, TEEC_ERROR_OUT_OF_MEMORY,
    TEEC_ERROR_SHORT_BUFFER,
};
use super::{SecureChannel, SharedMemory};
use crate::crypto::aes_ctr::{self, AES_128_KEY_SIZE, AES_CTR_IV_SIZE};
use crate::ta::{
    AES_CTR_PARAM_TYPES, PARAM_AES_DECRYPTED_BUFFER_IDX, PARAM_AES_ENCRYPTED_BUFFER_IDX,
    PARAM_AES_IV_IDX, PARAM_AES_KEY_IDX, TA_AES_CTR128_ENCRYPT, TA_AES_DECRYPTOR_UUID,
};

/// Heap-backed shared block handed out by [`SoftTee`].
pub struct SoftMemory {
    id: u32,
    buf: Vec<u8>,
    flags: MemFlags,
}

impl SoftMemory {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl SharedMemory for SoftMemory {
    fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn flags(&self) -> MemFlags {
        self.flags
    }
}

/// Counters of everything the host asked the backend to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoftTeeStats {
    pub sessions_opened: u32,
    pub sessions_closed: u32,
    pub allocations: u32,
    pub releases: u32,
    pub invocations: u32,
    /// Input size of every successful invocation, in call order.
    pub submitted: Vec<usize>,
}

#[derive(Debug, Default)]
struct Faults {
    open: Option<u32>,
    /// (zero-based allocation index, result code)
    allocation: Option<(u32, u32)>,
    invoke: Option<u32>,
}

pub struct SoftTee {
    ta_uuid: TaUuid,
    command: u32,
    session_open: bool,
    next_id: u32,
    live: HashSet<u32>,
    stats: SoftTeeStats,
    faults: Faults,
}

impl SoftTee {
    pub fn new() -> Self {
        Self::with_identity(TA_AES_DECRYPTOR_UUID, TA_AES_CTR128_ENCRYPT)
    }

    /// Backend answering to a specific TA UUID and command selector.
    pub fn with_identity(ta_uuid: TaUuid, command: u32) -> Self {
        Self {
            ta_uuid,
            command,
            session_open: false,
            next_id: 1,
            live: HashSet::new(),
            stats: SoftTeeStats::default(),
            faults: Faults::default(),
        }
    }

    /// Make the next `open_session` fail with `code` (origin: comms).
    pub fn fail_open(mut self, code: u32) -> Self {
        self.faults.open = Some(code);
        self
    }

    /// Make the `nth` allocation (zero-based, counted over the backend's
    /// lifetime) fail with `TEEC_ERROR_OUT_OF_MEMORY`.
    pub fn fail_allocation(mut self, nth: u32) -> Self {
        self.faults.allocation = Some((nth, TEEC_ERROR_OUT_OF_MEMORY));
        self
    }

    /// Make the next `invoke_command` fail with `code` (origin: trusted app).
    pub fn fail_next_invoke(&mut self, code: u32) {
        self.faults.invoke = Some(code);
    }

    pub fn stats(&self) -> &SoftTeeStats {
        &self.stats
    }

    /// Number of shared blocks allocated and not yet released.
    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    pub fn is_session_open(&self) -> bool {
        self.session_open
    }

    fn ensure_open(&self) -> Result<(), TeecFailure> {
        if self.session_open {
            Ok(())
        } else {
            Err(TeecFailure::api(TEEC_ERROR_BAD_STATE))
        }
    }

    /// Copy a whole key/IV block out of a parameter slot.
    fn whole_block(param: &Param<'_, SoftMemory>) -> Result<Zeroizing<[u8; 16]>, TeecFailure> {
        match param {
            Param::MemrefWhole { parent } if parent.flags().contains(MemFlags::INPUT) => {
                let block = <[u8; 16]>::try_from(parent.as_slice())
                    .map_err(|_| TeecFailure::trusted_app(TEEC_ERROR_BAD_PARAMETERS))?;
                Ok(Zeroizing::new(block))
            }
            _ => Err(TeecFailure::trusted_app(TEEC_ERROR_BAD_PARAMETERS)),
        }
    }

    /// Body of `TA_AES_CTR128_ENCRYPT`. Returns the number of bytes processed.
    fn aes_ctr128(operation: &mut Operation<'_, SoftMemory>) -> Result<usize, TeecFailure> {
        if operation.param_types() != AES_CTR_PARAM_TYPES {
            return Err(TeecFailure::trusted_app(TEEC_ERROR_BAD_PARAMETERS));
        }

        let key = Self::whole_block(&operation.params[PARAM_AES_KEY_IDX])?;
        let iv = Self::whole_block(&operation.params[PARAM_AES_IV_IDX])?;
        debug_assert_eq!(key.len(), AES_128_KEY_SIZE);
        debug_assert_eq!(iv.len(), AES_CTR_IV_SIZE);

        let (head, tail) = operation.params.split_at_mut(PARAM_AES_DECRYPTED_BUFFER_IDX);
        let input = match &head[PARAM_AES_ENCRYPTED_BUFFER_IDX] {
            Param::MemrefPartialInput {
                parent,
                offset,
                size,
            } if parent.flags().contains(MemFlags::INPUT) => parent
                .as_slice()
                .get(*offset..offset.saturating_add(*size))
                .ok_or(TeecFailure::trusted_app(TEEC_ERROR_BAD_PARAMETERS))?,
            _ => return Err(TeecFailure::trusted_app(TEEC_ERROR_BAD_PARAMETERS)),
        };
        let output = match &mut tail[0] {
            Param::MemrefWhole { parent } if parent.flags().contains(MemFlags::OUTPUT) => {
                parent.as_mut_slice()
            }
            _ => return Err(TeecFailure::trusted_app(TEEC_ERROR_BAD_PARAMETERS)),
        };
        if output.len() < input.len() {
            return Err(TeecFailure::trusted_app(TEEC_ERROR_SHORT_BUFFER));
        }

        let out = &mut output[..input.len()];
        out.copy_from_slice(input);
        aes_ctr::apply_keystream(&key, &iv, out);
        Ok(input.len())
    }
}

impl Default for SoftTee {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureChannel for SoftTee {
    type Memory = SoftMemory;

    fn open_session(&mut self, uuid: &TaUuid) -> Result<(), TeecFailure> {
        if let Some(code) = self.faults.open.take() {
            return Err(TeecFailure::new(code, ReturnOrigin::Comms));
        }
        if self.session_open {
            return Err(TeecFailure::api(TEEC_ERROR_BAD_STATE));
        }
        if *uuid != self.ta_uuid {
            return Err(TeecFailure::new(TEEC_ERROR_ITEM_NOT_FOUND, ReturnOrigin::Tee));
        }

        self.session_open = true;
        self.stats.sessions_opened += 1;
        log::debug!("soft TEE: session opened with {}", uuid);
        Ok(())
    }

    fn close_session(&mut self) -> Result<(), TeecFailure> {
        self.ensure_open()?;
        if !self.live.is_empty() {
            log::warn!(
                "soft TEE: closing session with {} shared blocks still allocated",
                self.live.len()
            );
        }
        self.session_open = false;
        self.stats.sessions_closed += 1;
        Ok(())
    }

    fn allocate_shared(&mut self, size: usize, flags: MemFlags) -> Result<SoftMemory, TeecFailure> {
        self.ensure_open()?;
        if let Some((nth, code)) = self.faults.allocation {
            if nth == self.stats.allocations {
                self.faults.allocation = None;
                return Err(TeecFailure::api(code));
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id);
        self.stats.allocations += 1;
        Ok(SoftMemory {
            id,
            buf: vec![0u8; size],
            flags,
        })
    }

    fn release_shared(&mut self, mut memory: SoftMemory) {
        if !self.live.remove(&memory.id) {
            log::error!("soft TEE: release of unknown shared block {}", memory.id);
            return;
        }
        memory.buf.zeroize();
        self.stats.releases += 1;
    }

    fn invoke_command(
        &mut self,
        command: u32,
        operation: &mut Operation<'_, SoftMemory>,
    ) -> Result<(), TeecFailure> {
        self.ensure_open()?;
        self.stats.invocations += 1;

        if let Some(code) = self.faults.invoke.take() {
            return Err(TeecFailure::trusted_app(code));
        }
        if command != self.command {
            return Err(TeecFailure::trusted_app(TEEC_ERROR_NOT_SUPPORTED));
        }

        let processed = Self::aes_ctr128(operation)?;
        self.stats.submitted.push(processed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tee::types::TEEC_ERROR_GENERIC;

    fn open_tee() -> SoftTee {
        let mut tee = SoftTee::new();
        tee.open_session(&TA_AES_DECRYPTOR_UUID).unwrap();
        tee
    }

    #[test]
    fn test_open_wrong_uuid() {
        let mut tee = SoftTee::new();
        let other: TaUuid = "00000000-0000-0000-0000-000000000001".parse().unwrap();
        let err = tee.open_session(&other).unwrap_err();
        assert_eq!(err.code, TEEC_ERROR_ITEM_NOT_FOUND);
        assert_eq!(err.origin, ReturnOrigin::Tee);
        assert!(!tee.is_session_open());
    }

    #[test]
    fn test_open_fault_is_consumed() {
        let mut tee = SoftTee::new().fail_open(TEEC_ERROR_GENERIC);
        assert!(tee.open_session(&TA_AES_DECRYPTOR_UUID).is_err());
        assert!(tee.open_session(&TA_AES_DECRYPTOR_UUID).is_ok());
    }

    #[test]
    fn test_allocate_requires_session() {
        let mut tee = SoftTee::new();
        let err = tee.allocate_shared(16, MemFlags::INPUT).err().unwrap();
        assert_eq!(err.code, TEEC_ERROR_BAD_STATE);
    }

    #[test]
    fn test_allocate_and_release_tracking() {
        let mut tee = open_tee();
        let a = tee.allocate_shared(32, MemFlags::INPUT).unwrap();
        let b = tee.allocate_shared(32, MemFlags::OUTPUT).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(tee.live_allocations(), 2);

        tee.release_shared(a);
        tee.release_shared(b);
        assert_eq!(tee.live_allocations(), 0);
        assert_eq!(tee.stats().releases, 2);
    }

    #[test]
    fn test_invoke_decrypts_partial_input() {
        let mut tee = open_tee();
        let key = [7u8; 16];
        let iv = [1u8; 16];
        let plaintext = b"streamed through the soft TA";
        let ciphertext = aes_ctr::encrypt_aes_ctr(plaintext, &key, &iv);

        let mut input = tee.allocate_shared(64, MemFlags::INPUT).unwrap();
        let mut output = tee.allocate_shared(64, MemFlags::OUTPUT).unwrap();
        let mut iv_mem = tee.allocate_shared(16, MemFlags::INPUT).unwrap();
        let mut key_mem = tee.allocate_shared(16, MemFlags::INPUT).unwrap();
        input.as_mut_slice()[..ciphertext.len()].copy_from_slice(&ciphertext);
        iv_mem.as_mut_slice().copy_from_slice(&iv);
        key_mem.as_mut_slice().copy_from_slice(&key);

        let mut op = Operation::new([
            Param::MemrefPartialInput {
                parent: &mut input,
                offset: 0,
                size: ciphertext.len(),
            },
            Param::MemrefWhole {
                parent: &mut output,
            },
            Param::MemrefWhole {
                parent: &mut iv_mem,
            },
            Param::MemrefWhole {
                parent: &mut key_mem,
            },
        ]);
        tee.invoke_command(TA_AES_CTR128_ENCRYPT, &mut op).unwrap();
        drop(op);

        assert_eq!(&output.as_slice()[..plaintext.len()], plaintext);
        assert_eq!(tee.stats().submitted, vec![plaintext.len()]);
    }

    #[test]
    fn test_invoke_rejects_wrong_param_types() {
        let mut tee = open_tee();
        let mut input = tee.allocate_shared(16, MemFlags::INPUT).unwrap();
        let mut op = Operation::new([
            Param::MemrefWhole { parent: &mut input },
            Param::None,
            Param::None,
            Param::None,
        ]);
        let err = tee.invoke_command(TA_AES_CTR128_ENCRYPT, &mut op).unwrap_err();
        assert_eq!(err, TeecFailure::trusted_app(TEEC_ERROR_BAD_PARAMETERS));
    }

    #[test]
    fn test_invoke_unknown_command() {
        let mut tee = open_tee();
        let mut input = tee.allocate_shared(16, MemFlags::INPUT).unwrap();
        let mut op = Operation::new([
            Param::MemrefWhole { parent: &mut input },
            Param::None,
            Param::None,
            Param::None,
        ]);
        let err = tee.invoke_command(0x42, &mut op).unwrap_err();
        assert_eq!(err.code, TEEC_ERROR_NOT_SUPPORTED);
    }

    #[test]
    fn test_close_without_open() {
        let mut tee = SoftTee::new();
        assert!(tee.close_session().is_err());
    }
}
