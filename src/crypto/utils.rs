//! Hex decoding of key material given on the command line.

use thiserror::Error;
use zeroize::Zeroize;

use super::aes_ctr::AES_BLOCK_SIZE;

#[derive(Debug, Error)]
pub enum UtilError {
    #[error("Invalid hex string")]
    InvalidHex,
    #[error("Expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Convert a hex string to bytes.
fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, UtilError> {
    hex::decode(hex.trim()).map_err(|_| UtilError::InvalidHex)
}

/// Decode a hex string that must be exactly 16 bytes (a key or a counter block).
pub fn hex_to_block(hex: &str) -> Result<[u8; AES_BLOCK_SIZE], UtilError> {
    let mut bytes = hex_to_bytes(hex)?;
    let block = <[u8; AES_BLOCK_SIZE]>::try_from(bytes.as_slice()).map_err(|_| UtilError::InvalidLength {
        expected: AES_BLOCK_SIZE,
        actual: bytes.len(),
    });
    bytes.zeroize();
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_block() {
        let block = hex_to_block("000102030405060708090a0b0c0d0e0f").unwrap();
        let expected: [u8; 16] = std::array::from_fn(|i| i as u8);
        assert_eq!(block, expected);
    }

    #[test]
    fn test_hex_to_block_wrong_length() {
        let err = hex_to_block("0011").unwrap_err();
        assert!(matches!(err, UtilError::InvalidLength { expected: 16, actual: 2 }));
    }

    #[test]
    fn test_hex_to_bytes_invalid() {
        assert!(matches!(hex_to_bytes("zz"), Err(UtilError::InvalidHex)));
    }
}
