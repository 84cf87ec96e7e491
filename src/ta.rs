//! Command protocol of the AES decryptor trusted application.

use crate::tee::types::{param_types, TEEC_MEMREF_PARTIAL_INPUT, TEEC_MEMREF_WHOLE};
use crate::tee::TaUuid;

/// Default identity of the AES decryptor TA. Override with `TEE_AES_TA_UUID`.
pub const TA_AES_DECRYPTOR_UUID: TaUuid = TaUuid::new(
    0x5dba_c793,
    0xf574,
    0x4871,
    [0x8a, 0xd3, 0x04, 0x33, 0x1e, 0xc1, 0x7f, 0x24],
);

/// Command selector for AES-128-CTR over the staged buffers.
///
/// Named after encryption because CTR encrypt and decrypt are the same
/// operation; the TA uses it for both.
pub const TA_AES_CTR128_ENCRYPT: u32 = 0;

/// Parameter slots of `TA_AES_CTR128_ENCRYPT`.
pub const PARAM_AES_ENCRYPTED_BUFFER_IDX: usize = 0;
pub const PARAM_AES_DECRYPTED_BUFFER_IDX: usize = 1;
pub const PARAM_AES_IV_IDX: usize = 2;
pub const PARAM_AES_KEY_IDX: usize = 3;

/// Packed parameter types the TA accepts for `TA_AES_CTR128_ENCRYPT`.
pub const AES_CTR_PARAM_TYPES: u32 = param_types(
    TEEC_MEMREF_PARTIAL_INPUT,
    TEEC_MEMREF_WHOLE,
    TEEC_MEMREF_WHOLE,
    TEEC_MEMREF_WHOLE,
);

/// Cipher blocks per shared data buffer.
pub const DEFAULT_BUFFER_BLOCKS: usize = 24 * 1024;
