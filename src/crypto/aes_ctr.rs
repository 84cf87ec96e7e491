//! AES-128-CTR in software.
//!
//! Same primitive the AES trusted application runs: AES-128 with a full
//! 128-bit big-endian counter block (`Ctr128BE`). Used by the software TEE
//! backend, by the self-test and as the reference the streaming adapter is
//! checked against.
//!
//! SECURITY NOTE: AES-CTR does NOT provide authentication.

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// AES-CTR IV size in bytes (128-bit counter block).
pub const AES_CTR_IV_SIZE: usize = 16;

/// AES-128 key size in bytes.
pub const AES_128_KEY_SIZE: usize = 16;

/// AES-128-CTR with a 128-bit big-endian counter.
type Aes128Ctr128BE = ctr::Ctr128BE<Aes128>;

/// XOR the keystream starting at counter block `iv` into `data` in place.
pub fn apply_keystream(key: &[u8; AES_128_KEY_SIZE], iv: &[u8; AES_CTR_IV_SIZE], data: &mut [u8]) {
    let mut cipher = Aes128Ctr128BE::new(key.into(), iv.into());
    cipher.apply_keystream(data);
}

/// Encrypt (or, identically, decrypt) `data` with AES-128-CTR starting at
/// counter block `iv`.
pub fn encrypt_aes_ctr(data: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
    let mut output = data.to_vec();
    apply_keystream(key, iv, &mut output);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    // NIST SP 800-38A F.5.1 CTR-AES128.Encrypt
    const KEY: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f, 0x3c,
    ];
    const IV: [u8; 16] = [
        0xf0, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8, 0xf9, 0xfa, 0xfb, 0xfc, 0xfd, 0xfe, 0xff,
    ];

    #[test]
    fn test_nist_vector_first_two_blocks() {
        let plaintext = hex::decode(
            "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51",
        )
        .unwrap();
        let expected = hex::decode(
            "874d6191b620e3261bef6864990db6ce9806f66b7970fdff8617187bb9fffdff",
        )
        .unwrap();

        assert_eq!(encrypt_aes_ctr(&plaintext, &KEY, &IV), expected);
        assert_eq!(encrypt_aes_ctr(&expected, &KEY, &IV), plaintext);
    }

    #[test]
    fn test_second_block_uses_next_counter() {
        // IV ends in 0xff, so the second block's counter carries into byte 14.
        let data = [0u8; 32];
        let whole = encrypt_aes_ctr(&data, &KEY, &IV);

        let next = (u128::from_be_bytes(IV).wrapping_add(1)).to_be_bytes();
        let second = encrypt_aes_ctr(&data[16..], &KEY, &next);
        assert_eq!(&whole[16..], &second[..]);
    }

    #[test]
    fn test_empty_input() {
        assert!(encrypt_aes_ctr(&[], &KEY, &IV).is_empty());
    }
}
