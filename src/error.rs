//! Error type of the streaming client.

use thiserror::Error;

use crate::tee::TeecFailure;

#[derive(Debug, Error)]
pub enum TeeError {
    /// Opening or closing the channel to the TA failed. The session is unusable.
    #[error("TEEC {operation} failed with {failure}")]
    Channel {
        operation: &'static str,
        failure: TeecFailure,
    },

    /// A shared buffer could not be allocated. The session stays closed.
    #[error("TEEC_AllocateSharedMemory for {buffer} buffer failed with {failure}")]
    Allocation {
        buffer: &'static str,
        failure: TeecFailure,
    },

    /// The chunk (plus carried bytes) does not fit the shared input buffer.
    #[error("Chunk of {requested} bytes exceeds shared buffer capacity of {capacity} bytes")]
    SizeLimitExceeded { requested: usize, capacity: usize },

    #[error("Invalid {field} length: expected {expected} bytes, got {actual}")]
    KeyOrIvLengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Carry offset must address a byte inside one block.
    #[error("Invalid carry offset {offset}: must be below 16")]
    InvalidCarryOffset { offset: u32 },

    #[error("Output buffer of {available} bytes cannot hold {needed} bytes of plaintext")]
    OutputTooSmall { needed: usize, available: usize },

    /// The TA rejected or failed the command. Stream state is indeterminate.
    #[error("TEEC_InvokeCommand failed with {0}")]
    Invocation(TeecFailure),
}

impl TeeError {
    /// Whether the caller can retry with corrected input on the same stream.
    ///
    /// Channel, allocation and invocation failures are not recoverable: the
    /// session (or, for invocations, the stream) must be abandoned.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TeeError::SizeLimitExceeded { .. }
                | TeeError::KeyOrIvLengthMismatch { .. }
                | TeeError::InvalidCarryOffset { .. }
                | TeeError::OutputTooSmall { .. }
        )
    }

    /// Result code and origin reported by the TEE stack, if any.
    pub fn failure(&self) -> Option<TeecFailure> {
        match self {
            TeeError::Channel { failure, .. } | TeeError::Allocation { failure, .. } => Some(*failure),
            TeeError::Invocation(failure) => Some(*failure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tee::types::TEEC_ERROR_OUT_OF_MEMORY;

    #[test]
    fn test_recoverable_kinds() {
        let size = TeeError::SizeLimitExceeded {
            requested: 17,
            capacity: 16,
        };
        assert!(size.is_recoverable());
        assert!(size.failure().is_none());

        let invoke = TeeError::Invocation(TeecFailure::trusted_app(TEEC_ERROR_OUT_OF_MEMORY));
        assert!(!invoke.is_recoverable());
        assert_eq!(invoke.failure().unwrap().code, TEEC_ERROR_OUT_OF_MEMORY);
    }

    #[test]
    fn test_invocation_message_carries_codes() {
        let err = TeeError::Invocation(TeecFailure::trusted_app(TEEC_ERROR_OUT_OF_MEMORY));
        assert_eq!(
            err.to_string(),
            "TEEC_InvokeCommand failed with code 0xffff000c origin 0x4"
        );
    }
}
