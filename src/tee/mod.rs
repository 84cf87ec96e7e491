//! Secure channel to the TEE.
//!
//! The streaming adapter only needs five primitives from the TEE client
//! stack: open/close a session with one trusted application, allocate and
//! release shared memory, and invoke a command. [`SecureChannel`] captures
//! exactly those, so the adapter runs unchanged over `libteec`
//! ([`optee::OpteeChannel`], feature `optee`) or the in-process software
//! backend ([`soft::SoftTee`]).

pub mod operation;
pub mod soft;
pub mod types;

#[cfg(feature = "optee")]
pub mod optee;

pub use operation::{Operation, Param};
pub use soft::SoftTee;
pub use types::{MemFlags, ReturnOrigin, TaUuid, TeecFailure};

/// A block of memory visible to both the host and the TEE.
pub trait SharedMemory {
    fn as_slice(&self) -> &[u8];
    fn as_mut_slice(&mut self) -> &mut [u8];
    fn flags(&self) -> MemFlags;

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Session-oriented transport to a trusted application.
///
/// Calls are synchronous round-trips. Implementations are not required to be
/// reentrant; callers serialize access through `&mut self`.
pub trait SecureChannel {
    type Memory: SharedMemory;

    /// Connect to the trusted application identified by `uuid`.
    fn open_session(&mut self, uuid: &TaUuid) -> Result<(), TeecFailure>;

    /// Tear down the session and the underlying context.
    fn close_session(&mut self) -> Result<(), TeecFailure>;

    /// Allocate a shared block of `size` bytes.
    fn allocate_shared(&mut self, size: usize, flags: MemFlags) -> Result<Self::Memory, TeecFailure>;

    /// Give a block back. Consumes it so it cannot be released twice.
    fn release_shared(&mut self, memory: Self::Memory);

    /// Run `command` in the trusted application.
    fn invoke_command(
        &mut self,
        command: u32,
        operation: &mut Operation<'_, Self::Memory>,
    ) -> Result<(), TeecFailure>;
}

/// Lets a session borrow a channel the caller keeps owning.
impl<C: SecureChannel + ?Sized> SecureChannel for &mut C {
    type Memory = C::Memory;

    fn open_session(&mut self, uuid: &TaUuid) -> Result<(), TeecFailure> {
        (**self).open_session(uuid)
    }

    fn close_session(&mut self) -> Result<(), TeecFailure> {
        (**self).close_session()
    }

    fn allocate_shared(&mut self, size: usize, flags: MemFlags) -> Result<Self::Memory, TeecFailure> {
        (**self).allocate_shared(size, flags)
    }

    fn release_shared(&mut self, memory: Self::Memory) {
        (**self).release_shared(memory)
    }

    fn invoke_command(
        &mut self,
        command: u32,
        operation: &mut Operation<'_, Self::Memory>,
    ) -> Result<(), TeecFailure> {
        (**self).invoke_command(command, operation)
    }
}
