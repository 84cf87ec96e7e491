//! Parameter block handed to `invoke_command`, shaped like `TEEC_Operation`.

use super::types::{param_types, TEEC_MEMREF_PARTIAL_INPUT, TEEC_MEMREF_WHOLE, TEEC_NONE};

/// One of the four operation parameters.
///
/// Memory references borrow the shared block mutably for the duration of
/// the call, so a block cannot be staged and invoked on at the same time.
pub enum Param<'a, M> {
    None,
    /// `[offset, offset + size)` of `parent`, read by the TA.
    MemrefPartialInput {
        parent: &'a mut M,
        offset: usize,
        size: usize,
    },
    /// The whole of `parent`; direction comes from the block's flags.
    MemrefWhole { parent: &'a mut M },
}

impl<M> Param<'_, M> {
    pub fn type_nibble(&self) -> u32 {
        match self {
            Param::None => TEEC_NONE,
            Param::MemrefPartialInput { .. } => TEEC_MEMREF_PARTIAL_INPUT,
            Param::MemrefWhole { .. } => TEEC_MEMREF_WHOLE,
        }
    }
}

pub struct Operation<'a, M> {
    pub params: [Param<'a, M>; 4],
}

impl<'a, M> Operation<'a, M> {
    pub fn new(params: [Param<'a, M>; 4]) -> Self {
        Self { params }
    }

    /// Packed parameter types, identical to `TEEC_PARAM_TYPES(p0, p1, p2, p3)`.
    pub fn param_types(&self) -> u32 {
        let [p0, p1, p2, p3] = &self.params;
        param_types(
            p0.type_nibble(),
            p1.type_nibble(),
            p2.type_nibble(),
            p3.type_nibble(),
        )
    }
}
