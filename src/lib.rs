//! Host-side AES-CTR streaming through a TEE trusted application.
//!
//! The trusted application decrypts one buffer per invocation and knows
//! nothing about streams. This crate keeps the stream position on the host
//! (counter block plus partial-block carry) so a caller can feed ciphertext
//! in arbitrary chunks and get the same plaintext as a one-shot decryption.
//!
//! ```no_run
//! use tee_aes_ctr::{ClientConfig, Session, SoftTee, StreamState};
//!
//! # fn main() -> Result<(), tee_aes_ctr::TeeError> {
//! let mut session = Session::new(SoftTee::new(), ClientConfig::default());
//! let key = [0u8; 16];
//! let mut state = StreamState::new([0u8; 16]);
//! let part1 = session.decrypt(b"first chunk", &key, &mut state)?;
//! let part2 = session.decrypt(b"second", &key, &mut state)?;
//! # let _ = (part1, part2);
//! session.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod pool;
pub mod session;
pub mod stream;
pub mod ta;
pub mod tee;

pub use config::{ClientConfig, ConfigError};
pub use error::TeeError;
pub use session::{Session, SharedSession};
pub use stream::{CarryState, Counter, CounterWidth, StreamState};
pub use tee::{SecureChannel, SharedMemory, SoftTee, TaUuid, TeecFailure};
