//! Event log records
//!
//! The PC client event header (`TCG_PCClientPCREventStruct`) and the tagged
//! event records carried as its body. All fields are little-endian.

use static_assertions::const_assert_eq;

use crate::tcg::{event_id, Sha1Digest, SHA1_DIGEST_SIZE};

// =============================================================================
// EVENT HEADER
// =============================================================================

/// Log entry header, followed by `event_data_size` bytes of event data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcrEventHeader {
    /// PCR index
    pub pcr_index: u32,
    /// Event type
    pub event_type: u32,
    /// SHA-1 digest extended into the PCR
    pub digest: Sha1Digest,
    /// Event data size
    pub event_data_size: u32,
}

const_assert_eq!(PcrEventHeader::SIZE, 4 + 4 + SHA1_DIGEST_SIZE + 4);

impl PcrEventHeader {
    /// Encoded size
    pub const SIZE: usize = 32;

    /// Header with a zero digest
    pub const fn new(pcr_index: u32, event_type: u32, event_data_size: u32) -> Self {
        Self {
            pcr_index,
            event_type,
            digest: [0; SHA1_DIGEST_SIZE],
            event_data_size,
        }
    }

    /// Size of header plus event data
    pub fn entry_size(&self) -> u64 {
        Self::SIZE as u64 + u64::from(self.event_data_size)
    }

    /// Serialize
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.pcr_index.to_le_bytes());
        out[4..8].copy_from_slice(&self.event_type.to_le_bytes());
        out[8..28].copy_from_slice(&self.digest);
        out[28..32].copy_from_slice(&self.event_data_size.to_le_bytes());
        out
    }

    /// Parse from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }

        Some(Self {
            pcr_index: u32::from_le_bytes(bytes[0..4].try_into().ok()?),
            event_type: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            digest: bytes[8..28].try_into().ok()?,
            event_data_size: u32::from_le_bytes(bytes[28..32].try_into().ok()?),
        })
    }
}

// =============================================================================
// TAGGED EVENTS
// =============================================================================

/// EV_EVENT_TAG body for the SMBIOS structure table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmbiosEventTag {
    /// Digest of the structure table
    pub digest: Sha1Digest,
}

impl SmbiosEventTag {
    /// Encoded size
    pub const SIZE: usize = 28;

    pub const fn new(digest: Sha1Digest) -> Self {
        Self { digest }
    }

    /// Serialize
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&event_id::SMBIOS.to_le_bytes());
        out[4..8].copy_from_slice(&(SHA1_DIGEST_SIZE as u32).to_le_bytes());
        out[8..28].copy_from_slice(&self.digest);
        out
    }
}

/// EV_EVENT_TAG body for an executed option ROM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionRomEventTag {
    /// PCI function address of the device, zero if unknown
    pub pfa: u16,
    /// Digest of the ROM image
    pub digest: Sha1Digest,
}

impl OptionRomEventTag {
    /// Encoded size
    pub const SIZE: usize = 32;

    /// Event data size recorded in the tag: reserved, pfa and digest
    pub const DATA_SIZE: u32 = 2 + 2 + SHA1_DIGEST_SIZE as u32;

    pub const fn new(pfa: u16, digest: Sha1Digest) -> Self {
        Self { pfa, digest }
    }

    /// Serialize
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&event_id::OPTION_ROM_EXEC.to_le_bytes());
        out[4..8].copy_from_slice(&Self::DATA_SIZE.to_le_bytes());
        out[10..12].copy_from_slice(&self.pfa.to_le_bytes());
        out[12..32].copy_from_slice(&self.digest);
        out
    }
}

const_assert_eq!(OptionRomEventTag::SIZE, 8 + OptionRomEventTag::DATA_SIZE as usize);
