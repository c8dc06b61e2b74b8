//! TCPA and SMBIOS lookups
//!
//! Just enough table walking to find the TCG event log area (the ACPI TCPA
//! table) and the SMBIOS structure table. This is not a general parser.

use crate::platform::FlatMemory;

/// Table signatures
pub mod signature {
    /// Root System Description Pointer
    pub const RSDP: [u8; 8] = *b"RSD PTR ";
    /// Root System Description Table
    pub const RSDT: [u8; 4] = *b"RSDT";
    /// TCG Client ACPI table
    pub const TCPA: [u8; 4] = *b"TCPA";
    /// SMBIOS 2.1 entry point anchor
    pub const SMBIOS: [u8; 4] = *b"_SM_";
}

/// Location and size of the event log area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogArea {
    /// Log Area Start Address
    pub base: u32,
    /// Log Area Minimum Length
    pub length: u32,
}

/// Result of looking for the TCPA table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpaLookup {
    /// The firmware has no RSDP at all
    NoRsdp,
    /// ACPI is present but holds no valid TCPA table
    NotFound,
    /// TCPA table found
    Found(LogArea),
}

/// A region of flat memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRegion {
    pub address: u32,
    pub length: u32,
}

// =============================================================================
// ACPI
// =============================================================================

/// Common ACPI table header
#[derive(Debug, Clone, Copy)]
pub struct SdtHeader {
    /// Signature
    pub signature: [u8; 4],
    /// Length of the whole table
    pub length: u32,
    /// Revision
    pub revision: u8,
    /// Checksum
    pub checksum: u8,
}

impl SdtHeader {
    /// Size
    pub const SIZE: usize = 36;

    /// Parse from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }

        Some(Self {
            signature: bytes[0..4].try_into().ok()?,
            length: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            revision: bytes[8],
            checksum: bytes[9],
        })
    }
}

/// TCPA table (client flavour)
#[derive(Debug, Clone, Copy)]
pub struct TcpaTable {
    pub header: SdtHeader,
    /// Platform class (0 = client)
    pub platform_class: u16,
    /// Log Area Minimum Length
    pub laml: u32,
    /// Log Area Start Address
    pub lasa: u64,
}

impl TcpaTable {
    /// Size of the fields read here
    pub const SIZE: usize = 50;

    /// Parse from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }

        let header = SdtHeader::from_bytes(bytes)?;
        if header.signature != signature::TCPA {
            return None;
        }

        Some(Self {
            header,
            platform_class: u16::from_le_bytes(bytes[36..38].try_into().ok()?),
            laml: u32::from_le_bytes(bytes[38..42].try_into().ok()?),
            lasa: u64::from_le_bytes(bytes[42..50].try_into().ok()?),
        })
    }

    /// Log area, if it lies in 32-bit memory
    pub fn log_area(&self) -> Option<LogArea> {
        let base = u32::try_from(self.lasa).ok()?;
        if base == 0 {
            return None;
        }
        Some(LogArea {
            base,
            length: self.laml,
        })
    }
}

/// Sum of all bytes is zero
pub fn validate_checksum(bytes: &[u8]) -> bool {
    bytes.iter().fold(0u8, |a, &b| a.wrapping_add(b)) == 0
}

/// RSDT address field offset inside the RSDP
const RSDP_RSDT_OFFSET: u32 = 16;

/// Walk RSDP -> RSDT -> TCPA
pub fn find_tcpa_log_area<M: FlatMemory + ?Sized>(mem: &M, rsdp: u32) -> TcpaLookup {
    match find_tcpa(mem, rsdp) {
        Some(tcpa) => match tcpa.log_area() {
            Some(area) => TcpaLookup::Found(area),
            None => {
                log::warn!("TCGBIOS: TCPA log area 0x{:x} not usable", tcpa.lasa);
                TcpaLookup::NotFound
            }
        },
        None => {
            log::info!("TCGBIOS: TCPA ACPI table was not found");
            TcpaLookup::NotFound
        }
    }
}

fn find_tcpa<M: FlatMemory + ?Sized>(mem: &M, rsdp: u32) -> Option<TcpaTable> {
    let mut sig = [0u8; 8];
    mem.read(rsdp, &mut sig).ok()?;
    if sig != signature::RSDP {
        return None;
    }

    let rsdt = mem.read_u32(rsdp.checked_add(RSDP_RSDT_OFFSET)?).ok()?;
    if rsdt == 0 {
        return None;
    }

    let mut raw = [0u8; SdtHeader::SIZE];
    mem.read(rsdt, &mut raw).ok()?;
    let header = SdtHeader::from_bytes(&raw)?;

    let mut offset = SdtHeader::SIZE as u32;
    while offset + 4 <= header.length {
        let entry = mem.read_u32(rsdt.checked_add(offset)?).ok()?;
        offset += 4;

        if let Some(tcpa) = read_tcpa(mem, entry) {
            return Some(tcpa);
        }
    }

    None
}

fn read_tcpa<M: FlatMemory + ?Sized>(mem: &M, address: u32) -> Option<TcpaTable> {
    let mut raw = [0u8; SdtHeader::SIZE];
    mem.read(address, &mut raw).ok()?;
    let header = SdtHeader::from_bytes(&raw)?;
    if header.signature != signature::TCPA || (header.length as usize) < TcpaTable::SIZE {
        return None;
    }

    let table = mem.read_vec(address, header.length as usize).ok()?;
    if !validate_checksum(&table) {
        log::debug!("TCGBIOS: TCPA table at 0x{:08x} has a bad checksum", address);
        return None;
    }

    TcpaTable::from_bytes(&table)
}

// =============================================================================
// SMBIOS
// =============================================================================

/// SMBIOS 2.1 entry point, the fields needed to locate the structure table
#[derive(Debug, Clone, Copy)]
pub struct SmbiosEntryPoint {
    /// Anchor "_SM_"
    pub anchor: [u8; 4],
    /// Structure table length
    pub structure_table_length: u16,
    /// Structure table address
    pub structure_table_address: u32,
}

impl SmbiosEntryPoint {
    /// Size of the 2.1 entry point
    pub const SIZE: usize = 31;

    /// Parse from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }

        let anchor: [u8; 4] = bytes[0..4].try_into().ok()?;
        if anchor != signature::SMBIOS {
            return None;
        }

        Some(Self {
            anchor,
            structure_table_length: u16::from_le_bytes(bytes[22..24].try_into().ok()?),
            structure_table_address: u32::from_le_bytes(bytes[24..28].try_into().ok()?),
        })
    }
}

/// Read the structure table location from the entry point at `entry`
pub fn read_smbios_structure_table<M: FlatMemory + ?Sized>(
    mem: &M,
    entry: u32,
) -> Option<TableRegion> {
    let mut raw = [0u8; SmbiosEntryPoint::SIZE];
    mem.read(entry, &mut raw).ok()?;
    let sep = SmbiosEntryPoint::from_bytes(&raw)?;

    Some(TableRegion {
        address: sep.structure_table_address,
        length: u32::from(sep.structure_table_length),
    })
}
