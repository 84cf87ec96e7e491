//! Software AES-CTR and key material helpers.
//!
//! Produces byte-identical output to the AES trusted application so it can
//! stand in for it in tests and serve as the reference implementation.

pub mod aes_ctr;
pub mod utils;

pub use aes_ctr::{apply_keystream, encrypt_aes_ctr, AES_128_KEY_SIZE, AES_BLOCK_SIZE, AES_CTR_IV_SIZE};
pub use utils::{hex_to_block, UtilError};
