//! Test doubles: a scripted TPM and a flat-memory platform

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::acpi::{signature, LogArea, SdtHeader, TcpaTable};
use crate::bios::TcgBios;
use crate::config::TcgConfig;
use crate::platform::{
    AcpiTables, DigestProvider, DriverError, DriverResult, FlatMemory, MemoryError, MemoryResult,
    SmbiosTables, TpmDriver, TpmDuration,
};
use crate::tcg::{ordinal, tag, SHA1_DIGEST_SIZE, TPM_HEADER_SIZE};

/// Log area used by the context constructors
pub const LOG_BASE: u32 = 0x8000;

const MEMORY_SIZE: usize = 0x10000;
const RSDP_ADDRESS: u32 = 0xF000;
const RSDT_ADDRESS: u32 = 0xF100;
const TCPA_ADDRESS: u32 = 0xF200;
const SMBIOS_ADDRESS: u32 = 0xF400;

// =============================================================================
// TPM
// =============================================================================

/// One request seen by the mock TPM
#[derive(Debug, Clone)]
pub struct CommandRecord {
    pub locality: u8,
    pub ordinal: u32,
    pub request: Vec<u8>,
    pub duration: TpmDuration,
}

/// Shared view of what the mock TPM saw, and knobs to script it
#[derive(Debug)]
pub struct Recorder {
    pub probes: u32,
    pub fail_init: bool,
    pub fail_transmit: bool,
    pub fail_ordinal: Option<u32>,
    pub commands: Vec<CommandRecord>,
    pub return_codes: Vec<(u32, u32)>,
    pub timeouts: Option<([u32; 4], [u32; 3])>,
    pub permanent_flags: [u8; 3],
    pub owner: bool,
    /// Hand back only this many bytes of each response
    pub truncate_response: Option<usize>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            probes: 0,
            fail_init: false,
            fail_transmit: false,
            fail_ordinal: None,
            commands: Vec::new(),
            return_codes: Vec::new(),
            timeouts: None,
            permanent_flags: [0; 3],
            owner: false,
            truncate_response: None,
        }
    }

    pub fn transmits(&self) -> usize {
        self.commands.len()
    }

    pub fn ordinals(&self) -> Vec<u32> {
        self.commands.iter().map(|c| c.ordinal).collect()
    }

    /// Answer every later `ordinal` request with `rc`
    pub fn set_return_code(&mut self, ordinal: u32, rc: u32) {
        self.return_codes.retain(|(o, _)| *o != ordinal);
        self.return_codes.push((ordinal, rc));
    }

    fn return_code(&self, ordinal: u32) -> u32 {
        self.return_codes
            .iter()
            .find(|(o, _)| *o == ordinal)
            .map_or(0, |(_, rc)| *rc)
    }
}

/// Scripted TPM driver
#[derive(Debug)]
pub struct MockTpm {
    present: bool,
    locality: u8,
    pending: Vec<u8>,
    rec: Arc<Mutex<Recorder>>,
}

impl MockTpm {
    pub const TIMEOUTS: [u32; 4] = [750_000, 2_000_000, 750_000, 750_000];
    pub const DURATIONS: [u32; 3] = [2_000_000, 20_000_000, 60_000_000];

    /// A TPM that probes present
    pub fn new() -> (Self, Arc<Mutex<Recorder>>) {
        Self::with_presence(true)
    }

    /// A driver whose probe finds nothing
    pub fn absent() -> (Self, Arc<Mutex<Recorder>>) {
        Self::with_presence(false)
    }

    fn with_presence(present: bool) -> (Self, Arc<Mutex<Recorder>>) {
        let rec = Arc::new(Mutex::new(Recorder::new()));
        let tpm = Self {
            present,
            locality: 0,
            pending: Vec::new(),
            rec: rec.clone(),
        };
        (tpm, rec)
    }

    fn respond(rec: &Recorder, ordinal: u32, request: &[u8]) -> Vec<u8> {
        let rc = rec.return_code(ordinal);
        let mut payload = Vec::new();

        if rc == 0 {
            match ordinal {
                ordinal::TPM_ORD_EXTEND => payload.extend_from_slice(&[0xEE; SHA1_DIGEST_SIZE]),
                ordinal::TPM_ORD_GET_CAPABILITY => {
                    let subcap = request
                        .get(18..22)
                        .map_or(0, |b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]));
                    match subcap {
                        0x115 => {
                            payload.extend_from_slice(&16u32.to_be_bytes());
                            for t in Self::TIMEOUTS {
                                payload.extend_from_slice(&t.to_be_bytes());
                            }
                        }
                        0x120 => {
                            payload.extend_from_slice(&12u32.to_be_bytes());
                            for d in Self::DURATIONS {
                                payload.extend_from_slice(&d.to_be_bytes());
                            }
                        }
                        0x108 => {
                            payload.extend_from_slice(&22u32.to_be_bytes());
                            payload.extend_from_slice(&0x001Fu16.to_be_bytes());
                            let mut flags = [0u8; 20];
                            flags[..3].copy_from_slice(&rec.permanent_flags);
                            payload.extend_from_slice(&flags);
                        }
                        0x111 => {
                            payload.extend_from_slice(&1u32.to_be_bytes());
                            payload.push(u8::from(rec.owner));
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        let mut out = Vec::with_capacity(TPM_HEADER_SIZE + payload.len());
        out.extend_from_slice(&tag::TPM_TAG_RSP_CMD.to_be_bytes());
        out.extend_from_slice(&((TPM_HEADER_SIZE + payload.len()) as u32).to_be_bytes());
        out.extend_from_slice(&rc.to_be_bytes());
        out.extend_from_slice(&payload);
        out
    }
}

impl TpmDriver for MockTpm {
    fn probe(&mut self) -> bool {
        self.rec.lock().probes += 1;
        self.present
    }

    fn init(&mut self) -> DriverResult<()> {
        if self.rec.lock().fail_init {
            return Err(DriverError::Io);
        }
        Ok(())
    }

    fn activate(&mut self, locality: u8) -> DriverResult<()> {
        self.locality = locality;
        Ok(())
    }

    fn send(&mut self, request: &[u8]) -> DriverResult<()> {
        let mut rec = self.rec.lock();
        let ordinal = request
            .get(6..10)
            .map_or(0, |b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]));

        if rec.fail_transmit || rec.fail_ordinal == Some(ordinal) {
            return Err(DriverError::Io);
        }

        self.pending = Self::respond(&rec, ordinal, request);
        rec.commands.push(CommandRecord {
            locality: self.locality,
            ordinal,
            request: request.to_vec(),
            duration: TpmDuration::Short,
        });
        Ok(())
    }

    fn wait_data_valid(&mut self) -> DriverResult<()> {
        Ok(())
    }

    fn wait_response_ready(&mut self, duration: TpmDuration) -> DriverResult<()> {
        if let Some(command) = self.rec.lock().commands.last_mut() {
            command.duration = duration;
        }
        Ok(())
    }

    fn read_response(&mut self, buf: &mut [u8]) -> DriverResult<usize> {
        let len = self.pending.len();
        if buf.len() < len {
            return Err(DriverError::BufferTooSmall);
        }
        let len = self.rec.lock().truncate_response.map_or(len, |n| n.min(len));
        buf[..len].copy_from_slice(&self.pending[..len]);
        Ok(len)
    }

    fn ready(&mut self) -> DriverResult<()> {
        Ok(())
    }

    fn set_timeouts(&mut self, timeouts: &[u32; 4], durations: &[u32; 3]) {
        self.rec.lock().timeouts = Some((*timeouts, *durations));
    }
}

// =============================================================================
// PLATFORM
// =============================================================================

/// 64 KiB of flat memory with optional ACPI and SMBIOS tables
#[derive(Debug)]
pub struct MockPlatform {
    memory: Vec<u8>,
    pub rsdp: Option<u32>,
    pub smbios: Option<u32>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            memory: vec![0; MEMORY_SIZE],
            rsdp: None,
            smbios: None,
        }
    }

    fn range(&self, address: u32, len: usize) -> MemoryResult<core::ops::Range<usize>> {
        let start = address as usize;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.memory.len())
            .ok_or(MemoryError { address, len })?;
        Ok(start..end)
    }

    /// RSDP -> RSDT -> TCPA describing a log area; returns the TCPA address
    pub fn install_acpi(&mut self, base: u32, length: u32) -> u32 {
        let mut rsdp = [0u8; 20];
        rsdp[0..8].copy_from_slice(&signature::RSDP);
        rsdp[16..20].copy_from_slice(&RSDT_ADDRESS.to_le_bytes());
        rsdp[8] = checksum_byte(&rsdp);
        self.write(RSDP_ADDRESS, &rsdp).unwrap();

        let mut rsdt = vec![0u8; SdtHeader::SIZE + 4];
        let rsdt_len = rsdt.len() as u32;
        rsdt[0..4].copy_from_slice(&signature::RSDT);
        rsdt[4..8].copy_from_slice(&rsdt_len.to_le_bytes());
        rsdt[8] = 1;
        rsdt[SdtHeader::SIZE..].copy_from_slice(&TCPA_ADDRESS.to_le_bytes());
        rsdt[9] = checksum_byte(&rsdt);
        self.write(RSDT_ADDRESS, &rsdt).unwrap();

        let mut tcpa = [0u8; TcpaTable::SIZE];
        tcpa[0..4].copy_from_slice(&signature::TCPA);
        tcpa[4..8].copy_from_slice(&(TcpaTable::SIZE as u32).to_le_bytes());
        tcpa[8] = 2;
        tcpa[38..42].copy_from_slice(&length.to_le_bytes());
        tcpa[42..50].copy_from_slice(&u64::from(base).to_le_bytes());
        tcpa[9] = checksum_byte(&tcpa);
        self.write(TCPA_ADDRESS, &tcpa).unwrap();

        self.rsdp = Some(RSDP_ADDRESS);
        TCPA_ADDRESS
    }

    /// SMBIOS 2.1 entry point describing a structure table
    pub fn install_smbios(&mut self, address: u32, length: u16) {
        let mut entry = [0u8; 31];
        entry[0..4].copy_from_slice(&signature::SMBIOS);
        entry[22..24].copy_from_slice(&length.to_le_bytes());
        entry[24..28].copy_from_slice(&address.to_le_bytes());
        self.write(SMBIOS_ADDRESS, &entry).unwrap();
        self.smbios = Some(SMBIOS_ADDRESS);
    }
}

/// Byte that brings the sum of `bytes` to zero (its own slot must be zero)
fn checksum_byte(bytes: &[u8]) -> u8 {
    0u8.wrapping_sub(bytes.iter().fold(0u8, |a, &b| a.wrapping_add(b)))
}

impl FlatMemory for MockPlatform {
    fn read(&self, address: u32, buf: &mut [u8]) -> MemoryResult<()> {
        let range = self.range(address, buf.len())?;
        buf.copy_from_slice(&self.memory[range]);
        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> MemoryResult<()> {
        let range = self.range(address, data.len())?;
        self.memory[range].copy_from_slice(data);
        Ok(())
    }
}

impl AcpiTables for MockPlatform {
    fn rsdp_address(&self) -> Option<u32> {
        self.rsdp
    }
}

impl SmbiosTables for MockPlatform {
    fn smbios_entry_point(&self) -> Option<u32> {
        self.smbios
    }
}

impl DigestProvider for MockPlatform {}

// =============================================================================
// CONTEXTS
// =============================================================================

/// Probed context with a `capacity`-byte log at [`LOG_BASE`]; no TPM
/// commands sent yet
pub fn bios_with_log(capacity: u32) -> (TcgBios<MockPlatform>, Arc<Mutex<Recorder>>) {
    let (tpm, rec) = MockTpm::new();
    let mut bios = TcgBios::new(
        MockPlatform::new(),
        vec![Box::new(tpm) as Box<dyn TpmDriver>],
        TcgConfig::default(),
    );
    assert!(bios.has_working_tpm());
    bios.log
        .reset(
            &mut bios.platform,
            Some(LogArea {
                base: LOG_BASE,
                length: capacity,
            }),
        )
        .unwrap();
    (bios, rec)
}

/// Context with ACPI describing a 4 KiB log at [`LOG_BASE`]; setup not run
pub fn bios_with_acpi(config: TcgConfig) -> (TcgBios<MockPlatform>, Arc<Mutex<Recorder>>) {
    let (tpm, rec) = MockTpm::new();
    let mut platform = MockPlatform::new();
    platform.install_acpi(LOG_BASE, 0x1000);
    let bios = TcgBios::new(platform, vec![Box::new(tpm) as Box<dyn TpmDriver>], config);
    (bios, rec)
}
