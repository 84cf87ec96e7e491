//! Secure invocation gateway: one synchronous call into the AES TA.

use crate::error::TeeError;
use crate::pool::SharedBufferPool;
use crate::ta::{
    PARAM_AES_DECRYPTED_BUFFER_IDX, PARAM_AES_ENCRYPTED_BUFFER_IDX, PARAM_AES_IV_IDX,
    PARAM_AES_KEY_IDX, TA_AES_CTR128_ENCRYPT,
};
use crate::tee::{Operation, Param, SecureChannel};

/// Issues `TA_AES_CTR128_ENCRYPT` over the staged shared buffers.
#[derive(Debug, Clone, Copy)]
pub struct Gateway {
    command: u32,
}

impl Gateway {
    pub fn new(command: u32) -> Self {
        Self { command }
    }

    pub fn command(&self) -> u32 {
        self.command
    }

    /// Run the TA over the first `len` staged bytes.
    ///
    /// Key, counter block and ciphertext must already be in `pool`. Returns
    /// the `len` plaintext bytes now in the output block. Any non-success
    /// result is surfaced as [`TeeError::Invocation`]; nothing is retried.
    pub fn invoke_decrypt<'p, C>(
        &self,
        channel: &mut C,
        pool: &'p mut SharedBufferPool<C::Memory>,
        len: usize,
    ) -> Result<&'p [u8], TeeError>
    where
        C: SecureChannel,
    {
        {
            let (input, output, iv, key) = pool.blocks_mut();
            let mut params = [Param::None, Param::None, Param::None, Param::None];
            params[PARAM_AES_ENCRYPTED_BUFFER_IDX] = Param::MemrefPartialInput {
                parent: input,
                offset: 0,
                size: len,
            };
            params[PARAM_AES_DECRYPTED_BUFFER_IDX] = Param::MemrefWhole { parent: output };
            params[PARAM_AES_IV_IDX] = Param::MemrefWhole { parent: iv };
            params[PARAM_AES_KEY_IDX] = Param::MemrefWhole { parent: key };
            let mut operation = Operation::new(params);

            channel
                .invoke_command(self.command, &mut operation)
                .map_err(|failure| {
                    log::error!("TEEC_InvokeCommand failed with {}", failure);
                    TeeError::Invocation(failure)
                })?;
        }

        Ok(pool.plaintext(len))
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new(TA_AES_CTR128_ENCRYPT)
    }
}
