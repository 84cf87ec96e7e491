//! Client configuration.
//!
//! Defaults describe the stock AES decryptor TA. Every field can be
//! overridden from the environment (the binary also loads `.env`):
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `TEE_AES_TA_UUID` | TA identity | [`TA_AES_DECRYPTOR_UUID`] |
//! | `TEE_AES_COMMAND_ID` | command selector, decimal or `0x` hex | `0` |
//! | `TEE_AES_BUFFER_BLOCKS` | shared buffer size in 16-byte blocks, at most [`MAX_BUFFER_BLOCKS`] | `24576` |
//! | `TEE_AES_COUNTER_WIDTH` | `128` or `16` | `128` |

use thiserror::Error;

use crate::crypto::aes_ctr::AES_BLOCK_SIZE;
use crate::stream::CounterWidth;
use crate::ta::{DEFAULT_BUFFER_BLOCKS, TA_AES_CTR128_ENCRYPT, TA_AES_DECRYPTOR_UUID};
use crate::tee::TaUuid;

pub const ENV_TA_UUID: &str = "TEE_AES_TA_UUID";
pub const ENV_COMMAND_ID: &str = "TEE_AES_COMMAND_ID";
pub const ENV_BUFFER_BLOCKS: &str = "TEE_AES_BUFFER_BLOCKS";
pub const ENV_COUNTER_WIDTH: &str = "TEE_AES_COUNTER_WIDTH";

/// Upper bound on each data buffer: 64 MiB.
pub const MAX_BUFFER_BLOCKS: usize = 4 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub ta_uuid: TaUuid,
    pub command_id: u32,
    /// Capacity of each data buffer, in cipher blocks.
    pub buffer_blocks: usize,
    pub counter_width: CounterWidth,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ta_uuid: TA_AES_DECRYPTOR_UUID,
            command_id: TA_AES_CTR128_ENCRYPT,
            buffer_blocks: DEFAULT_BUFFER_BLOCKS,
            counter_width: CounterWidth::Full128,
        }
    }
}

impl ClientConfig {
    /// Shared buffer capacity in bytes.
    ///
    /// Saturates on overflow; `from_lookup` bounds the block count.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_blocks.saturating_mul(AES_BLOCK_SIZE)
    }

    /// Defaults overridden by process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_TA_UUID) {
            config.ta_uuid = raw
                .parse::<TaUuid>()
                .map_err(|e| ConfigError::invalid(ENV_TA_UUID, e.to_string()))?;
        }

        if let Some(raw) = lookup(ENV_COMMAND_ID) {
            config.command_id = parse_u32(raw.trim())
                .ok_or_else(|| ConfigError::invalid(ENV_COMMAND_ID, format!("not a number: {}", raw)))?;
        }

        if let Some(raw) = lookup(ENV_BUFFER_BLOCKS) {
            let blocks: usize = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(ENV_BUFFER_BLOCKS, format!("not a number: {}", raw)))?;
            if blocks == 0 {
                return Err(ConfigError::invalid(ENV_BUFFER_BLOCKS, "must be at least 1"));
            }
            if blocks > MAX_BUFFER_BLOCKS {
                return Err(ConfigError::invalid(
                    ENV_BUFFER_BLOCKS,
                    format!("{} exceeds the maximum of {}", blocks, MAX_BUFFER_BLOCKS),
                ));
            }
            config.buffer_blocks = blocks;
        }

        if let Some(raw) = lookup(ENV_COUNTER_WIDTH) {
            config.counter_width = match raw.trim() {
                "128" => CounterWidth::Full128,
                "16" => CounterWidth::Low16,
                other => {
                    return Err(ConfigError::invalid(
                        ENV_COUNTER_WIDTH,
                        format!("expected 16 or 128, got {}", other),
                    ))
                }
            };
        }

        Ok(config)
    }
}

fn parse_u32(s: &str) -> Option<u32> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}
