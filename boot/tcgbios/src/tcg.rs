//! TPM 1.2 and TCG PC Client protocol constants
//!
//! Command ordinals, tags, return codes and event types used by the
//! conventional BIOS measured-boot interface. Multi-byte values that travel
//! to the TPM are big-endian; everything exchanged with BIOS callers or
//! written to the event log is little-endian.

use bitflags::bitflags;
use static_assertions::const_assert;

// =============================================================================
// LIMITS
// =============================================================================

/// Number of PCRs on a TPM 1.2 PC client
pub const NUM_PCRS: u32 = 24;

/// SHA-1 digest size
pub const SHA1_DIGEST_SIZE: usize = 20;

/// SHA-1 digest
pub type Sha1Digest = [u8; SHA1_DIGEST_SIZE];

/// TPM request/response header size (tag, length, ordinal/return code)
pub const TPM_HEADER_SIZE: usize = 10;

/// Largest ordinal-specific payload `send_command` will append
pub const MAX_COMMAND_APPEND: usize = 20;

/// Largest response `send_command` will accept
pub const MAX_COMMAND_RESPONSE: usize = 64;

/// Extend request: header, PCR index, digest
pub const EXTEND_REQUEST_SIZE: usize = TPM_HEADER_SIZE + 4 + SHA1_DIGEST_SIZE;

/// Extend response: header, new PCR value
pub const EXTEND_RESPONSE_SIZE: usize = TPM_HEADER_SIZE + SHA1_DIGEST_SIZE;

const_assert!(MAX_COMMAND_APPEND + TPM_HEADER_SIZE <= MAX_COMMAND_RESPONSE);
const_assert!(EXTEND_RESPONSE_SIZE <= MAX_COMMAND_RESPONSE);

// =============================================================================
// TPM 1.2 COMMANDS
// =============================================================================

/// TPM command tags
pub mod tag {
    /// Request without authorization
    pub const TPM_TAG_RQU_CMD: u16 = 0x00C1;
    /// Response without authorization
    pub const TPM_TAG_RSP_CMD: u16 = 0x00C4;
}

/// TPM command ordinals
pub mod ordinal {
    pub const TPM_ORD_EXTEND: u32 = 0x0000_0014;
    pub const TPM_ORD_SELF_TEST_FULL: u32 = 0x0000_0050;
    pub const TPM_ORD_GET_CAPABILITY: u32 = 0x0000_0065;
    pub const TPM_ORD_SET_TEMP_DEACTIVATED: u32 = 0x0000_0073;
    pub const TPM_ORD_STARTUP: u32 = 0x0000_0099;
    pub const TPM_ORD_PHYSICAL_PRESENCE: u32 = 0x4000_000A;
    pub const TSC_ORD_RESET_ESTABLISHMENT_BIT: u32 = 0x4000_000B;
}

/// Return codes found in TPM response headers
pub mod tpm_rc {
    pub const TPM_SUCCESS: u32 = 0x00;
    /// TPM_Startup was already issued since the last reset
    pub const TPM_INVALID_POSTINIT: u32 = 0x26;
    /// Command is not allowed from the requesting locality
    pub const TPM_BAD_LOCALITY: u32 = 0x3D;
}

/// TPM_Startup types
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupType {
    /// Cold boot: clear all volatile state
    Clear = 0x0001,
    /// S3 resume: restore saved state
    State = 0x0002,
}

impl StartupType {
    /// Command payload
    pub const fn to_be_bytes(self) -> [u8; 2] {
        (self as u16).to_be_bytes()
    }
}

/// TPM_GetCapability areas and sub-capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// TPM_PERMANENT_FLAGS
    PermanentFlags,
    /// Whether an owner is installed
    OwnerAuth,
    /// TIS interface timeouts A-D
    Timeouts,
    /// Short/medium/long command durations
    Durations,
}

impl Capability {
    const TPM_CAP_FLAG: u32 = 0x04;
    const TPM_CAP_PROPERTY: u32 = 0x05;

    /// (capability area, sub-capability)
    pub const fn area(&self) -> (u32, u32) {
        match self {
            Capability::PermanentFlags => (Self::TPM_CAP_FLAG, 0x108),
            Capability::OwnerAuth => (Self::TPM_CAP_PROPERTY, 0x111),
            Capability::Timeouts => (Self::TPM_CAP_PROPERTY, 0x115),
            Capability::Durations => (Self::TPM_CAP_PROPERTY, 0x120),
        }
    }

    /// Command payload: area, sub-capability size, sub-capability
    pub fn payload(&self) -> [u8; 12] {
        let (cap, subcap) = self.area();
        let mut out = [0u8; 12];
        out[0..4].copy_from_slice(&cap.to_be_bytes());
        out[4..8].copy_from_slice(&4u32.to_be_bytes());
        out[8..12].copy_from_slice(&subcap.to_be_bytes());
        out
    }
}

bitflags! {
    /// TSC_PhysicalPresence bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PhysicalPresence: u16 {
        /// Lock the physical presence state until the next reset
        const LOCK = 0x0004;
        /// Assert physical presence
        const PRESENT = 0x0008;
        /// Deassert physical presence
        const NOTPRESENT = 0x0010;
        /// Allow software to control physical presence
        const CMD_ENABLE = 0x0020;
        /// Allow the hardware signal
        const HW_ENABLE = 0x0040;
        /// Make the enable bits permanent
        const LIFETIME_LOCK = 0x0080;
        /// Disallow software control
        const CMD_DISABLE = 0x0100;
        /// Disallow the hardware signal
        const HW_DISABLE = 0x0200;
    }
}

impl PhysicalPresence {
    /// Command payload
    pub const fn to_be_bytes(self) -> [u8; 2] {
        self.bits().to_be_bytes()
    }
}

// =============================================================================
// PCR ASSIGNMENTS
// =============================================================================

/// PCR usage on a conventional BIOS platform
pub mod pcr {
    /// CRTM, BIOS and platform extensions
    pub const PCR0_BIOS: u32 = 0;
    /// Platform configuration (SMBIOS)
    pub const PCR1_PLATFORM_CONFIG: u32 = 1;
    /// Option ROM code
    pub const PCR2_OPTION_ROM: u32 = 2;
    /// IPL code (MBR, El Torito)
    pub const PCR4_IPL: u32 = 4;
    /// IPL configuration and data
    pub const PCR5_IPL_CONFIG: u32 = 5;
    /// Last PCR measured before handing off to the OS loader
    pub const PCR7_LAST_PREBOOT: u32 = 7;
}

// =============================================================================
// EVENT TYPES
// =============================================================================

/// Event types for the PC client event log
pub mod event_type {
    pub const EV_POST_CODE: u32 = 0x0000_0001;
    pub const EV_SEPARATOR: u32 = 0x0000_0004;
    pub const EV_ACTION: u32 = 0x0000_0005;
    pub const EV_EVENT_TAG: u32 = 0x0000_0006;
    pub const EV_COMPACT_HASH: u32 = 0x0000_000C;
    pub const EV_IPL: u32 = 0x0000_000D;
    pub const EV_IPL_PARTITION_DATA: u32 = 0x0000_000E;
}

/// Event identifiers inside EV_EVENT_TAG records
pub mod event_id {
    /// SMBIOS structure table
    pub const SMBIOS: u32 = 1;
    /// Option ROM
    pub const OPTION_ROM_EXEC: u32 = 7;
}

// =============================================================================
// BIOS CALL INTERFACE
// =============================================================================

/// "TCPA" returned in EBX by the status check
pub const TCG_MAGIC: u32 = 0x4150_4354;

/// Interface version reported by the status check
pub const TCG_VERSION_MAJOR: u8 = 1;
pub const TCG_VERSION_MINOR: u8 = 2;

/// Hash algorithm identifier accepted by HashAll
pub const TPM_ALG_SHA: u32 = 0x0000_0004;

/// Return codes of the BIOS call interface
pub mod rc {
    pub const TCG_PC_OK: u32 = 0x0;
    pub const TCG_PC_LOGOVERFLOW: u32 = 0x2;
    pub const TCG_PC_UNSUPPORTED: u32 = 0x3;

    pub const TPM_RET_BASE: u32 = 0x1;
    pub const TCG_GENERAL_ERROR: u32 = TPM_RET_BASE;
    pub const TCG_FIRMWARE_ERROR: u32 = TPM_RET_BASE + 0x05;
    pub const TCG_FATAL_COM_ERROR: u32 = TPM_RET_BASE + 0x17;
    pub const TCG_INVALID_INPUT_PARA: u32 = TPM_RET_BASE + 0x18;
    pub const TCG_TCG_COMMAND_ERROR: u32 = TPM_RET_BASE + 0x19;
    pub const TCG_INTERFACE_SHUTDOWN: u32 = TPM_RET_BASE + 0x20;
    pub const TCG_PC_TPM_NOT_PRESENT: u32 = TPM_RET_BASE + 0x22;
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_presence_values() {
        assert_eq!(PhysicalPresence::CMD_ENABLE.to_be_bytes(), [0x00, 0x20]);
        assert_eq!(PhysicalPresence::PRESENT.to_be_bytes(), [0x00, 0x08]);
        assert_eq!(
            (PhysicalPresence::NOTPRESENT | PhysicalPresence::LOCK).to_be_bytes(),
            [0x00, 0x14]
        );
        assert_eq!(PhysicalPresence::CMD_DISABLE.to_be_bytes(), [0x01, 0x00]);
    }

    #[test]
    fn test_capability_payload() {
        assert_eq!(
            Capability::Timeouts.payload(),
            [0, 0, 0, 5, 0, 0, 0, 4, 0, 0, 0x01, 0x15]
        );
        assert_eq!(
            Capability::PermanentFlags.payload(),
            [0, 0, 0, 4, 0, 0, 0, 4, 0, 0, 0x01, 0x08]
        );
    }

    #[test]
    fn test_startup_payload() {
        assert_eq!(StartupType::Clear.to_be_bytes(), [0x00, 0x01]);
        assert_eq!(StartupType::State.to_be_bytes(), [0x00, 0x02]);
    }
}
