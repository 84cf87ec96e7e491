//! OP-TEE backend over the GlobalPlatform client library (`libteec`).
//!
//! Only the parts of `TEEC_Context`, `TEEC_Session` and `TEEC_SharedMemory`
//! that the host reads are spelled out; the implementation-defined tails are
//! opaque storage sized to cover every optee_client release. All structs are
//! boxed so their addresses stay put while `libteec` holds pointers to them.

#![allow(non_camel_case_types, non_snake_case, dead_code)]

use libc::{c_char, c_void, size_t};

use super::operation::{Operation, Param};
use super::types::{MemFlags, ReturnOrigin, TaUuid, TeecFailure, TEEC_ERROR_BAD_STATE, TEEC_SUCCESS};
use super::{SecureChannel, SharedMemory};

const TEEC_LOGIN_PUBLIC: u32 = 0x0000_0000;

#[repr(C)]
struct TEEC_Context {
    imp: [u64; 4],
}

#[repr(C)]
struct TEEC_Session {
    imp: [u64; 4],
}

#[repr(C)]
struct TEEC_UUID {
    timeLow: u32,
    timeMid: u16,
    timeHiAndVersion: u16,
    clockSeqAndNode: [u8; 8],
}

#[repr(C)]
struct TEEC_SharedMemory {
    buffer: *mut c_void,
    size: size_t,
    flags: u32,
    imp: [u64; 8],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct TEEC_TempMemoryReference {
    buffer: *mut c_void,
    size: size_t,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct TEEC_RegisteredMemoryReference {
    parent: *mut TEEC_SharedMemory,
    size: size_t,
    offset: size_t,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct TEEC_Value {
    a: u32,
    b: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
union TEEC_Parameter {
    tmpref: TEEC_TempMemoryReference,
    memref: TEEC_RegisteredMemoryReference,
    value: TEEC_Value,
}

#[repr(C)]
struct TEEC_Operation {
    started: u32,
    paramTypes: u32,
    params: [TEEC_Parameter; 4],
    imp: [u64; 2],
}

#[link(name = "teec")]
extern "C" {
    fn TEEC_InitializeContext(name: *const c_char, context: *mut TEEC_Context) -> u32;
    fn TEEC_FinalizeContext(context: *mut TEEC_Context);
    fn TEEC_OpenSession(
        context: *mut TEEC_Context,
        session: *mut TEEC_Session,
        destination: *const TEEC_UUID,
        connectionMethod: u32,
        connectionData: *const c_void,
        operation: *mut TEEC_Operation,
        returnOrigin: *mut u32,
    ) -> u32;
    fn TEEC_CloseSession(session: *mut TEEC_Session);
    fn TEEC_InvokeCommand(
        session: *mut TEEC_Session,
        commandID: u32,
        operation: *mut TEEC_Operation,
        returnOrigin: *mut u32,
    ) -> u32;
    fn TEEC_AllocateSharedMemory(context: *mut TEEC_Context, sharedMem: *mut TEEC_SharedMemory) -> u32;
    fn TEEC_ReleaseSharedMemory(sharedMemory: *mut TEEC_SharedMemory);
}

/// Shared block allocated by `TEEC_AllocateSharedMemory`. Released on drop,
/// so it must not outlive the channel's context.
pub struct OpteeMemory {
    raw: Box<TEEC_SharedMemory>,
}

impl SharedMemory for OpteeMemory {
    fn as_slice(&self) -> &[u8] {
        if self.raw.buffer.is_null() {
            return &[];
        }
        // SAFETY: libteec mapped `size` bytes at `buffer` for the block's lifetime.
        unsafe { std::slice::from_raw_parts(self.raw.buffer as *const u8, self.raw.size) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.raw.buffer.is_null() {
            return &mut [];
        }
        // SAFETY: as above; `&mut self` guarantees exclusive host access.
        unsafe { std::slice::from_raw_parts_mut(self.raw.buffer as *mut u8, self.raw.size) }
    }

    fn flags(&self) -> MemFlags {
        if self.raw.flags & MemFlags::OUTPUT.bits() != 0 {
            MemFlags::OUTPUT
        } else {
            MemFlags::INPUT
        }
    }
}

impl Drop for OpteeMemory {
    /// Every block goes back to `libteec` exactly once, whether it is handed
    /// to `release_shared` or dropped on an early-return or unwind path.
    fn drop(&mut self) {
        // SAFETY: the block came from a successful `TEEC_AllocateSharedMemory`
        // and this is its only release.
        unsafe { TEEC_ReleaseSharedMemory(&mut *self.raw) };
    }
}

/// Channel to a TA through the OP-TEE client library.
#[derive(Default)]
pub struct OpteeChannel {
    context: Option<Box<TEEC_Context>>,
    session: Option<Box<TEEC_Session>>,
}

impl OpteeChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureChannel for OpteeChannel {
    type Memory = OpteeMemory;

    fn open_session(&mut self, uuid: &TaUuid) -> Result<(), TeecFailure> {
        if self.session.is_some() {
            return Err(TeecFailure::api(TEEC_ERROR_BAD_STATE));
        }

        let mut context = Box::new(TEEC_Context { imp: [0; 4] });
        // SAFETY: `context` is a valid, writable TEEC_Context.
        let res = unsafe { TEEC_InitializeContext(std::ptr::null(), &mut *context) };
        if res != TEEC_SUCCESS {
            return Err(TeecFailure::api(res));
        }

        let destination = TEEC_UUID {
            timeLow: uuid.time_low,
            timeMid: uuid.time_mid,
            timeHiAndVersion: uuid.time_hi_and_version,
            clockSeqAndNode: uuid.clock_seq_and_node,
        };
        let mut session = Box::new(TEEC_Session { imp: [0; 4] });
        let mut origin = 0u32;
        // SAFETY: all pointers are valid for the duration of the call; no
        // operation is passed.
        let res = unsafe {
            TEEC_OpenSession(
                &mut *context,
                &mut *session,
                &destination,
                TEEC_LOGIN_PUBLIC,
                std::ptr::null(),
                std::ptr::null_mut(),
                &mut origin,
            )
        };
        if res != TEEC_SUCCESS {
            // SAFETY: the context was initialized above.
            unsafe { TEEC_FinalizeContext(&mut *context) };
            return Err(TeecFailure::new(res, ReturnOrigin::from_raw(origin)));
        }

        self.context = Some(context);
        self.session = Some(session);
        Ok(())
    }

    fn close_session(&mut self) -> Result<(), TeecFailure> {
        let (Some(mut session), Some(mut context)) = (self.session.take(), self.context.take()) else {
            return Err(TeecFailure::api(TEEC_ERROR_BAD_STATE));
        };
        // SAFETY: both were opened by `open_session` and are closed exactly once.
        unsafe {
            TEEC_CloseSession(&mut *session);
            TEEC_FinalizeContext(&mut *context);
        }
        Ok(())
    }

    fn allocate_shared(&mut self, size: usize, flags: MemFlags) -> Result<OpteeMemory, TeecFailure> {
        let context = self
            .context
            .as_mut()
            .ok_or(TeecFailure::api(TEEC_ERROR_BAD_STATE))?;

        let mut raw = Box::new(TEEC_SharedMemory {
            buffer: std::ptr::null_mut(),
            size,
            flags: flags.bits(),
            imp: [0; 8],
        });
        // SAFETY: `raw` describes the requested block; libteec fills `buffer`.
        let res = unsafe { TEEC_AllocateSharedMemory(&mut **context, &mut *raw) };
        if res != TEEC_SUCCESS {
            return Err(TeecFailure::api(res));
        }
        Ok(OpteeMemory { raw })
    }

    fn release_shared(&mut self, memory: OpteeMemory) {
        drop(memory);
    }

    fn invoke_command(
        &mut self,
        command: u32,
        operation: &mut Operation<'_, OpteeMemory>,
    ) -> Result<(), TeecFailure> {
        let session = self
            .session
            .as_mut()
            .ok_or(TeecFailure::api(TEEC_ERROR_BAD_STATE))?;

        // SAFETY: TEEC_Operation is plain data; all-zero is its initial state.
        let mut raw: TEEC_Operation = unsafe { std::mem::zeroed() };
        raw.paramTypes = operation.param_types();
        for (slot, param) in raw.params.iter_mut().zip(operation.params.iter_mut()) {
            match param {
                Param::None => {}
                Param::MemrefPartialInput {
                    parent,
                    offset,
                    size,
                } => {
                    slot.memref = TEEC_RegisteredMemoryReference {
                        parent: &mut *parent.raw,
                        size: *size,
                        offset: *offset,
                    };
                }
                Param::MemrefWhole { parent } => {
                    let size = parent.len();
                    slot.memref = TEEC_RegisteredMemoryReference {
                        parent: &mut *parent.raw,
                        size,
                        offset: 0,
                    };
                }
            }
        }

        let mut origin = 0u32;
        // SAFETY: every memref points at a live boxed block borrowed by `operation`.
        let res = unsafe { TEEC_InvokeCommand(&mut **session, command, &mut raw, &mut origin) };
        if res != TEEC_SUCCESS {
            return Err(TeecFailure::new(res, ReturnOrigin::from_raw(origin)));
        }
        Ok(())
    }
}
