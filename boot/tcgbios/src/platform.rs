//! Platform collaborators
//!
//! Everything the measured-boot engine needs from the surrounding firmware:
//! the TPM driver shim, access to the 32-bit flat address space, the ACPI
//! and SMBIOS locators and the SHA-1 primitive.

use alloc::vec;
use alloc::vec::Vec;

use core::fmt;

use crate::acpi::{self, TableRegion, TcpaLookup};
use crate::error::TcgError;
use crate::tcg::{Sha1Digest, SHA1_DIGEST_SIZE};

// =============================================================================
// TPM DRIVER SHIM
// =============================================================================

/// Driver-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// Locality could not be activated
    LocalityUnavailable,
    /// A polling loop exceeded its bound
    Timeout,
    /// Device I/O failed
    Io,
    /// Response larger than the supplied buffer
    BufferTooSmall,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::LocalityUnavailable => write!(f, "locality unavailable"),
            DriverError::Timeout => write!(f, "timeout"),
            DriverError::Io => write!(f, "I/O error"),
            DriverError::BufferTooSmall => write!(f, "response buffer too small"),
        }
    }
}

impl From<DriverError> for TcgError {
    fn from(_: DriverError) -> Self {
        TcgError::FatalCommunicationError
    }
}

/// Driver result
pub type DriverResult<T> = core::result::Result<T, DriverError>;

/// Timing class bounding how long a command may take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmDuration {
    Short,
    Medium,
    Long,
}

/// Byte-level access to one TPM device
pub trait TpmDriver: Send {
    /// Check whether the device is present
    fn probe(&mut self) -> bool;

    /// Bring the device into a usable state after a successful probe
    fn init(&mut self) -> DriverResult<()>;

    /// Request the given locality
    fn activate(&mut self, locality: u8) -> DriverResult<()>;

    /// Send a complete request frame
    fn send(&mut self, request: &[u8]) -> DriverResult<()>;

    /// Wait until the device reports valid status
    fn wait_data_valid(&mut self) -> DriverResult<()>;

    /// Wait until the response is available, bounded by `duration`
    fn wait_response_ready(&mut self, duration: TpmDuration) -> DriverResult<()>;

    /// Read the response into `buf`, returning its length
    fn read_response(&mut self, buf: &mut [u8]) -> DriverResult<usize>;

    /// Return the device to the ready state
    fn ready(&mut self) -> DriverResult<()>;

    /// Install timeouts A-D and the short/medium/long durations reported by
    /// the TPM (microseconds)
    fn set_timeouts(&mut self, timeouts: &[u32; 4], durations: &[u32; 3]);
}

// =============================================================================
// FLAT MEMORY
// =============================================================================

/// Access outside of mapped memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryError {
    pub address: u32,
    pub len: usize,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bad memory access at 0x{:08x} (+{})", self.address, self.len)
    }
}

impl From<MemoryError> for TcgError {
    fn from(_: MemoryError) -> Self {
        TcgError::InvalidParameter
    }
}

/// Memory result
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

/// The firmware's 32-bit flat address space
///
/// Caller pointers of the BIOS call interface, the ACPI tables and the
/// event log area are all addresses in this space.
pub trait FlatMemory {
    /// Copy `buf.len()` bytes starting at `address`
    fn read(&self, address: u32, buf: &mut [u8]) -> MemoryResult<()>;

    /// Copy `data` to `address`
    fn write(&mut self, address: u32, data: &[u8]) -> MemoryResult<()>;

    /// Read `len` bytes into a new buffer
    fn read_vec(&self, address: u32, len: usize) -> MemoryResult<Vec<u8>> {
        if u64::from(address) + len as u64 > 1 << 32 {
            return Err(MemoryError { address, len });
        }
        let mut buf = vec![0u8; len];
        self.read(address, &mut buf)?;
        Ok(buf)
    }

    /// Set `len` bytes to `value`
    fn fill(&mut self, address: u32, len: usize, value: u8) -> MemoryResult<()> {
        let chunk = [value; 256];
        let mut offset = 0usize;
        while offset < len {
            let n = (len - offset).min(chunk.len());
            let at = address
                .checked_add(offset as u32)
                .ok_or(MemoryError { address, len })?;
            self.write(at, &chunk[..n])?;
            offset += n;
        }
        Ok(())
    }

    fn read_u8(&self, address: u32) -> MemoryResult<u8> {
        let mut b = [0u8; 1];
        self.read(address, &mut b)?;
        Ok(b[0])
    }

    fn read_u16(&self, address: u32) -> MemoryResult<u16> {
        let mut b = [0u8; 2];
        self.read(address, &mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    fn read_u32(&self, address: u32) -> MemoryResult<u32> {
        let mut b = [0u8; 4];
        self.read(address, &mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    fn write_u16(&mut self, address: u32, value: u16) -> MemoryResult<()> {
        self.write(address, &value.to_le_bytes())
    }

    fn write_u32(&mut self, address: u32, value: u32) -> MemoryResult<()> {
        self.write(address, &value.to_le_bytes())
    }
}

// =============================================================================
// FIRMWARE TABLES
// =============================================================================

/// ACPI table locator
pub trait AcpiTables: FlatMemory {
    /// Address of the RSDP, if the firmware found one
    fn rsdp_address(&self) -> Option<u32>;

    /// Find the TCPA table and return the log area it describes
    fn tcpa_log_area(&self) -> TcpaLookup {
        match self.rsdp_address() {
            Some(rsdp) => acpi::find_tcpa_log_area(self, rsdp),
            None => TcpaLookup::NoRsdp,
        }
    }
}

/// SMBIOS locator
pub trait SmbiosTables: FlatMemory {
    /// Address of the SMBIOS 2.1 entry point, if any
    fn smbios_entry_point(&self) -> Option<u32>;

    /// Location of the SMBIOS structure table
    fn smbios_structure_table(&self) -> Option<TableRegion> {
        let entry = self.smbios_entry_point()?;
        acpi::read_smbios_structure_table(self, entry)
    }
}

// =============================================================================
// DIGEST
// =============================================================================

/// Digest primitive failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestError;

impl From<DigestError> for TcgError {
    fn from(_: DigestError) -> Self {
        TcgError::FirmwareInternalError
    }
}

/// SHA-1 primitive
pub trait DigestProvider {
    /// Hash `data`
    fn sha1(&self, data: &[u8]) -> core::result::Result<Sha1Digest, DigestError> {
        use sha1::{Digest, Sha1};

        let output = Sha1::digest(data);
        let mut digest = [0u8; SHA1_DIGEST_SIZE];
        digest.copy_from_slice(&output);
        Ok(digest)
    }
}

// =============================================================================
// PLATFORM
// =============================================================================

/// Everything the engine needs from the surrounding firmware except the
/// TPM drivers
pub trait Platform: AcpiTables + SmbiosTables + DigestProvider {}

impl<T: AcpiTables + SmbiosTables + DigestProvider> Platform for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPlatform;

    #[test]
    fn test_default_sha1() {
        let platform = MockPlatform::new();
        let digest = platform.sha1(b"abc").unwrap();
        assert_eq!(
            digest,
            [
                0xa9, 0x99, 0x3e, 0x36, 0x47, 0x06, 0x81, 0x6a, 0xba, 0x3e, 0x25, 0x71, 0x78, 0x50,
                0xc2, 0x6c, 0x9c, 0xd0, 0xd8, 0x9d,
            ]
        );
    }

    #[test]
    fn test_fill_and_integers() {
        let mut platform = MockPlatform::new();
        platform.fill(0x100, 600, 0xAB).unwrap();
        assert_eq!(platform.read_u8(0x100).unwrap(), 0xAB);
        assert_eq!(platform.read_u8(0x100 + 599).unwrap(), 0xAB);
        assert_eq!(platform.read_u8(0x100 + 600).unwrap(), 0);

        platform.write_u32(0x10, 0x1122_3344).unwrap();
        assert_eq!(platform.read_u16(0x10).unwrap(), 0x3344);
        assert_eq!(platform.read_u32(0x10).unwrap(), 0x1122_3344);
    }

    #[test]
    fn test_out_of_range_access() {
        let platform = MockPlatform::new();
        let err = platform.read_vec(u32::MAX - 1, 8).unwrap_err();
        assert_eq!(TcgError::from(err), TcgError::InvalidParameter);
    }
}
