//! GlobalPlatform TEE Client API constants and value types.
//!
//! Numeric values follow the TEE Client API specification so that codes
//! reported by `libteec` and by the software backend read the same in logs.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

pub const TEEC_SUCCESS: u32 = 0x0000_0000;
pub const TEEC_ERROR_GENERIC: u32 = 0xFFFF_0000;
pub const TEEC_ERROR_BAD_PARAMETERS: u32 = 0xFFFF_0006;
pub const TEEC_ERROR_BAD_STATE: u32 = 0xFFFF_0007;
pub const TEEC_ERROR_ITEM_NOT_FOUND: u32 = 0xFFFF_0008;
pub const TEEC_ERROR_NOT_SUPPORTED: u32 = 0xFFFF_000A;
pub const TEEC_ERROR_OUT_OF_MEMORY: u32 = 0xFFFF_000C;
pub const TEEC_ERROR_COMMUNICATION: u32 = 0xFFFF_000E;
pub const TEEC_ERROR_SHORT_BUFFER: u32 = 0xFFFF_0010;
pub const TEEC_ERROR_TARGET_DEAD: u32 = 0xFFFF_3024;

/// Parameter type nibbles used in `TEEC_Operation.paramTypes`.
pub const TEEC_NONE: u32 = 0x0;
pub const TEEC_MEMREF_WHOLE: u32 = 0xC;
pub const TEEC_MEMREF_PARTIAL_INPUT: u32 = 0xD;

/// Pack four parameter type nibbles, as the `TEEC_PARAM_TYPES` macro does.
pub const fn param_types(t0: u32, t1: u32, t2: u32, t3: u32) -> u32 {
    t0 | (t1 << 4) | (t2 << 8) | (t3 << 12)
}

/// Which layer produced a failure code (`TEEC_ORIGIN_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnOrigin {
    /// Client library on the host side.
    Api,
    /// Communication stack between host and TEE.
    Comms,
    /// TEE core.
    Tee,
    /// The trusted application itself.
    TrustedApp,
    /// Origin value not defined by the client API.
    Unknown(u32),
}

impl ReturnOrigin {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => ReturnOrigin::Api,
            2 => ReturnOrigin::Comms,
            3 => ReturnOrigin::Tee,
            4 => ReturnOrigin::TrustedApp,
            other => ReturnOrigin::Unknown(other),
        }
    }

    pub fn as_raw(&self) -> u32 {
        match self {
            ReturnOrigin::Api => 1,
            ReturnOrigin::Comms => 2,
            ReturnOrigin::Tee => 3,
            ReturnOrigin::TrustedApp => 4,
            ReturnOrigin::Unknown(raw) => *raw,
        }
    }
}

/// Non-success result of a channel call: result code plus origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeecFailure {
    pub code: u32,
    pub origin: ReturnOrigin,
}

impl TeecFailure {
    pub fn new(code: u32, origin: ReturnOrigin) -> Self {
        Self { code, origin }
    }

    /// Failure raised by the host-side client library.
    pub fn api(code: u32) -> Self {
        Self::new(code, ReturnOrigin::Api)
    }

    /// Failure raised by the trusted application.
    pub fn trusted_app(code: u32) -> Self {
        Self::new(code, ReturnOrigin::TrustedApp)
    }
}

impl fmt::Display for TeecFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {:#x} origin {:#x}", self.code, self.origin.as_raw())
    }
}

/// Direction flags of a shared memory block (`TEEC_MEM_INPUT`/`TEEC_MEM_OUTPUT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemFlags(u32);

impl MemFlags {
    pub const INPUT: MemFlags = MemFlags(0x1);
    pub const OUTPUT: MemFlags = MemFlags(0x2);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: MemFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid TA UUID: {0}")]
pub struct UuidParseError(#[from] uuid::Error);

/// Trusted application identity, laid out like `TEEC_UUID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaUuid {
    pub time_low: u32,
    pub time_mid: u16,
    pub time_hi_and_version: u16,
    pub clock_seq_and_node: [u8; 8],
}

impl TaUuid {
    pub const fn new(
        time_low: u32,
        time_mid: u16,
        time_hi_and_version: u16,
        clock_seq_and_node: [u8; 8],
    ) -> Self {
        Self {
            time_low,
            time_mid,
            time_hi_and_version,
            clock_seq_and_node,
        }
    }
}

impl From<Uuid> for TaUuid {
    fn from(uuid: Uuid) -> Self {
        let (time_low, time_mid, time_hi_and_version, clock_seq_and_node) = uuid.as_fields();
        TaUuid::new(time_low, time_mid, time_hi_and_version, *clock_seq_and_node)
    }
}

impl From<TaUuid> for Uuid {
    fn from(ta: TaUuid) -> Self {
        Uuid::from_fields(
            ta.time_low,
            ta.time_mid,
            ta.time_hi_and_version,
            &ta.clock_seq_and_node,
        )
    }
}

impl FromStr for TaUuid {
    type Err = UuidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Uuid::parse_str(s.trim())?.into())
    }
}

impl fmt::Display for TaUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Uuid::from(*self).hyphenated(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_types_packing() {
        let packed = param_types(
            TEEC_MEMREF_PARTIAL_INPUT,
            TEEC_MEMREF_WHOLE,
            TEEC_MEMREF_WHOLE,
            TEEC_MEMREF_WHOLE,
        );
        assert_eq!(packed, 0xCCCD);
    }

    #[test]
    fn test_uuid_roundtrip_text() {
        let text = "5dbac793-f574-4871-8ad3-04331ec17f24";
        let uuid: TaUuid = text.parse().unwrap();
        assert_eq!(uuid.time_low, 0x5dbac793);
        assert_eq!(uuid.time_mid, 0xf574);
        assert_eq!(uuid.time_hi_and_version, 0x4871);
        assert_eq!(uuid.clock_seq_and_node, [0x8a, 0xd3, 0x04, 0x33, 0x1e, 0xc1, 0x7f, 0x24]);
        assert_eq!(uuid.to_string(), text);
    }

    #[test]
    fn test_uuid_rejects_malformed() {
        assert!("5dbac793-f574-4871-8ad3".parse::<TaUuid>().is_err());
        assert!("zdbac793-f574-4871-8ad3-04331ec17f24".parse::<TaUuid>().is_err());
        assert!("".parse::<TaUuid>().is_err());
    }

    #[test]
    fn test_uuid_accepts_simple_and_upper_case() {
        let canonical: TaUuid = "5dbac793-f574-4871-8ad3-04331ec17f24".parse().unwrap();
        let simple: TaUuid = "5DBAC793F57448718AD304331EC17F24".parse().unwrap();
        assert_eq!(simple, canonical);
        assert_eq!(simple.to_string(), "5dbac793-f574-4871-8ad3-04331ec17f24");
    }

    #[test]
    fn test_uuid_fields_map_onto_teec_layout() {
        let uuid = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        let ta = TaUuid::from(uuid);
        assert_eq!(ta.time_low, 0x0011_2233);
        assert_eq!(ta.time_mid, 0x4455);
        assert_eq!(ta.time_hi_and_version, 0x6677);
        assert_eq!(ta.clock_seq_and_node, [0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(Uuid::from(ta), uuid);
    }

    #[test]
    fn test_origin_raw_values() {
        assert_eq!(ReturnOrigin::from_raw(4), ReturnOrigin::TrustedApp);
        assert_eq!(ReturnOrigin::from_raw(9), ReturnOrigin::Unknown(9));
        assert_eq!(ReturnOrigin::Comms.as_raw(), 2);
    }

    #[test]
    fn test_failure_display() {
        let failure = TeecFailure::trusted_app(TEEC_ERROR_BAD_PARAMETERS);
        assert_eq!(failure.to_string(), "code 0xffff0006 origin 0x4");
    }

    #[test]
    fn test_mem_flags() {
        assert!(MemFlags::OUTPUT.contains(MemFlags::OUTPUT));
        assert!(!MemFlags::INPUT.contains(MemFlags::OUTPUT));
    }
}
