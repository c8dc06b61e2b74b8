//! BIOS call interface blocks
//!
//! Fixed-layout little-endian parameter blocks exchanged with callers of the
//! TCG BIOS interrupt. Every input block starts with its own length, which
//! doubles as the version discriminator.

use crate::tcg::Sha1Digest;

fn le_u16(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_le_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
}

fn le_u32(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

/// Length field shared by every input block
pub fn block_length(bytes: &[u8]) -> Option<u16> {
    le_u16(bytes, 0)
}

/// Error output: just the output length and a reserved word
pub fn short_output(opb_length: u16) -> [u8; 4] {
    let mut out = [0u8; 4];
    out[0..2].copy_from_slice(&opb_length.to_le_bytes());
    out
}

// =============================================================================
// HASH LOG EXTEND EVENT
// =============================================================================

/// HashLogExtendEvent input (`hleei_short` / `hleei_long`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashLogExtendInput {
    pub hash_ptr: u32,
    pub hash_len: u32,
    pub pcr_index: u32,
    pub log_ptr: u32,
    pub log_len: u32,
}

impl HashLogExtendInput {
    pub const SHORT_SIZE: usize = 24;
    pub const LONG_SIZE: usize = 28;

    /// Parse from bytes; `None` for an unknown length or short buffer
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        // The long form has a reserved word before the log data pointer.
        let log_at = match block_length(bytes)? as usize {
            Self::SHORT_SIZE => 16,
            Self::LONG_SIZE => 20,
            _ => return None,
        };

        Some(Self {
            hash_ptr: le_u32(bytes, 4)?,
            hash_len: le_u32(bytes, 8)?,
            pcr_index: le_u32(bytes, 12)?,
            log_ptr: le_u32(bytes, log_at)?,
            log_len: le_u32(bytes, log_at + 4)?,
        })
    }
}

/// HashLogExtendEvent output (`hleeo`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashLogExtendOutput {
    pub event_number: u32,
    pub digest: Sha1Digest,
}

impl HashLogExtendOutput {
    pub const SIZE: usize = 28;
    /// Output length reported on error
    pub const ERROR_SIZE: u16 = 4;

    /// Serialize
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&(Self::SIZE as u16).to_le_bytes());
        out[4..8].copy_from_slice(&self.event_number.to_le_bytes());
        out[8..28].copy_from_slice(&self.digest);
        out
    }
}

// =============================================================================
// PASS THROUGH TO TPM
// =============================================================================

/// PassThroughToTPM input header (`pttti`), followed by the TPM request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassThroughInput {
    pub ipb_length: u16,
    /// Size of the caller's output block
    pub opb_length: u16,
}

impl PassThroughInput {
    /// Header size; the TPM request starts here
    pub const HEADER_SIZE: usize = 8;

    /// Parse from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Self {
            ipb_length: le_u16(bytes, 0)?,
            opb_length: le_u16(bytes, 4)?,
        })
    }
}

/// PassThroughToTPM output header (`pttto`), followed by the TPM response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassThroughOutput;

impl PassThroughOutput {
    pub const HEADER_SIZE: usize = 4;
    /// Output length reported on error
    pub const ERROR_SIZE: u16 = 4;
}

// =============================================================================
// HASH LOG EVENT
// =============================================================================

/// HashLogEvent input (`hlei`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashLogEventInput {
    pub hash_ptr: u32,
    pub hash_len: u32,
    pub pcr_index: u32,
    pub event_type: u32,
    pub log_ptr: u32,
    pub log_len: u32,
}

impl HashLogEventInput {
    pub const SIZE: usize = 28;

    /// Parse from bytes; `None` unless the block length is exact
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if block_length(bytes)? as usize != Self::SIZE {
            return None;
        }

        Some(Self {
            hash_ptr: le_u32(bytes, 4)?,
            hash_len: le_u32(bytes, 8)?,
            pcr_index: le_u32(bytes, 12)?,
            event_type: le_u32(bytes, 16)?,
            log_ptr: le_u32(bytes, 20)?,
            log_len: le_u32(bytes, 24)?,
        })
    }
}

/// HashLogEvent output (`hleo`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashLogEventOutput {
    pub event_number: u32,
}

impl HashLogEventOutput {
    pub const SIZE: usize = 8;
    /// Output length reported on error
    pub const ERROR_SIZE: u16 = 2;

    /// Serialize
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&(Self::SIZE as u16).to_le_bytes());
        out[4..8].copy_from_slice(&self.event_number.to_le_bytes());
        out
    }
}

// =============================================================================
// HASH ALL
// =============================================================================

/// HashAll input (`hai`); the output is the bare digest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashAllInput {
    pub hash_ptr: u32,
    pub hash_len: u32,
    pub algorithm_id: u32,
}

impl HashAllInput {
    pub const SIZE: usize = 16;

    /// Parse from bytes; `None` unless the block length is exact
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if block_length(bytes)? as usize != Self::SIZE {
            return None;
        }

        Some(Self {
            hash_ptr: le_u32(bytes, 4)?,
            hash_len: le_u32(bytes, 8)?,
            algorithm_id: le_u32(bytes, 12)?,
        })
    }
}

/// TSS output (`to`)
pub const TSS_OUTPUT_SIZE: u16 = 4;
