//! Session lifecycle and the streaming decrypt API.
//!
//! A [`Session`] owns the secure channel and, while open, the shared buffer
//! pool. Opening and closing are idempotent, and the first decrypt opens the
//! session on demand. Every call that touches the shared buffers takes
//! `&mut self`, so one session serves one caller at a time; wrap it with
//! [`Session::into_shared`] to use it from several threads, or give each
//! concurrent stream its own session.

use std::sync::{Arc, Mutex};

use crate::config::ClientConfig;
use crate::error::TeeError;
use crate::gateway::Gateway;
use crate::pool::SharedBufferPool;
use crate::stream::{check_chunk, CarryState, Counter, CtrStream, StreamState};
use crate::tee::types::TEEC_ERROR_BAD_STATE;
use crate::tee::{SecureChannel, TeecFailure};

/// A session shared between threads. The lock is held for the whole
/// stage, invoke, copy-out sequence of a chunk.
pub type SharedSession<C> = Arc<Mutex<Session<C>>>;

pub struct Session<C: SecureChannel> {
    channel: C,
    config: ClientConfig,
    gateway: Gateway,
    /// `Some` exactly while the session is open.
    pool: Option<SharedBufferPool<C::Memory>>,
}

impl<C: SecureChannel> Session<C> {
    /// Create a closed session over `channel`.
    pub fn new(channel: C, config: ClientConfig) -> Self {
        let gateway = Gateway::new(config.command_id);
        Self {
            channel,
            config,
            gateway,
            pool: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.pool.is_some()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Largest number of bytes (carry included) one call can submit.
    pub fn capacity(&self) -> usize {
        self.config.buffer_capacity()
    }

    /// Open the channel and allocate the shared buffers. No-op when open.
    ///
    /// If allocation fails the channel is closed again, so a failed open
    /// leaves nothing behind.
    pub fn open(&mut self) -> Result<(), TeeError> {
        if self.pool.is_some() {
            return Ok(());
        }

        self.channel
            .open_session(&self.config.ta_uuid)
            .map_err(|failure| {
                log::error!("TEEC_OpenSession with {} failed: {}", self.config.ta_uuid, failure);
                TeeError::Channel {
                    operation: "OpenSession",
                    failure,
                }
            })?;

        match SharedBufferPool::allocate(&mut self.channel, self.config.buffer_capacity()) {
            Ok(pool) => {
                log::info!(
                    "TEE session open with TA {} ({} byte shared buffers)",
                    self.config.ta_uuid,
                    pool.capacity()
                );
                self.pool = Some(pool);
                Ok(())
            }
            Err(e) => {
                if let Err(failure) = self.channel.close_session() {
                    log::warn!("Closing session after failed allocation: {}", failure);
                }
                Err(e)
            }
        }
    }

    /// Release the shared buffers, then close the channel. No-op when closed.
    pub fn close(&mut self) -> Result<(), TeeError> {
        let Some(pool) = self.pool.take() else {
            return Ok(());
        };

        log::info!("Releasing shared memory...");
        pool.release(&mut self.channel);

        self.channel.close_session().map_err(|failure| {
            log::error!("TEEC_CloseSession failed: {}", failure);
            TeeError::Channel {
                operation: "CloseSession",
                failure,
            }
        })?;
        log::info!("TEE session closed");
        Ok(())
    }

    /// Decrypt the next chunk of a stream.
    ///
    /// `state` carries the stream position between calls; start each stream
    /// with [`StreamState::new`]. Concatenated results equal a single-call
    /// decryption of the concatenated chunks.
    pub fn decrypt(
        &mut self,
        ciphertext: &[u8],
        key: &[u8],
        state: &mut StreamState,
    ) -> Result<Vec<u8>, TeeError> {
        let mut out = vec![0u8; ciphertext.len()];
        let n = self.decrypt_into(ciphertext, key, state, &mut out)?;
        out.truncate(n);
        Ok(out)
    }

    /// Like [`Session::decrypt`], writing into a caller buffer.
    pub fn decrypt_into(
        &mut self,
        ciphertext: &[u8],
        key: &[u8],
        state: &mut StreamState,
        out: &mut [u8],
    ) -> Result<usize, TeeError> {
        check_chunk(key, state, ciphertext.len(), out.len(), self.capacity())?;
        if ciphertext.is_empty() {
            return Ok(0);
        }

        self.open()?;
        match self.pool.as_mut() {
            Some(pool) => CtrStream::new(&mut self.channel, pool, self.gateway, self.config.counter_width)
                .decrypt_chunk(ciphertext, key, state, out),
            None => Err(TeeError::Channel {
                operation: "OpenSession",
                failure: TeecFailure::api(TEEC_ERROR_BAD_STATE),
            }),
        }
    }

    /// Conventional CTR streaming signature
    /// (`AES_ctr128_encrypt(in, out, len, key, ivec, ecount_buf, num)`).
    ///
    /// `iv` is the running counter block, `carry`/`num` the partial block
    /// state; all three are updated in place on success and untouched on
    /// error. Unlike the software API, `carry` holds the carried ciphertext
    /// bytes, not keystream, so it must only ever be fed back to this call.
    pub fn ctr128_decrypt(
        &mut self,
        ciphertext: &[u8],
        key: &[u8],
        iv: &mut [u8; 16],
        carry: &mut [u8; 16],
        num: &mut u32,
    ) -> Result<Vec<u8>, TeeError> {
        let mut state = StreamState {
            counter: Counter::new(*iv),
            carry: CarryState::from_parts(*carry, *num)?,
        };
        let out = self.decrypt(ciphertext, key, &mut state)?;

        *iv = state.counter.into_bytes();
        *carry = *state.carry.raw();
        *num = state.carry.offset() as u32;
        Ok(out)
    }

    /// Move the session behind a mutex for use from several threads.
    pub fn into_shared(self) -> SharedSession<C> {
        Arc::new(Mutex::new(self))
    }
}

impl<C: SecureChannel> Drop for Session<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to close TEE session on drop: {}", e);
        }
    }
}
