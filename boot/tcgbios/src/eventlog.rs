//! Measurement log
//!
//! Append-only log of [`PcrEventHeader`] entries, each followed by its event
//! data, packed back to back in the log area described by the ACPI TCPA
//! table. Entries are never removed or reordered.

use alloc::vec::Vec;

use crate::acpi::LogArea;
use crate::error::{Result, TcgError};
use crate::event::PcrEventHeader;
use crate::platform::FlatMemory;

/// Measurement log placement and cursor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventLog {
    area: Option<LogArea>,
    /// Offset of the next free byte from the log base
    next: u32,
    /// Offset of the most recent entry
    last: Option<u32>,
    count: u32,
}

impl EventLog {
    /// Disabled log, every append overflows
    pub const fn new() -> Self {
        Self {
            area: None,
            next: 0,
            last: None,
            count: 0,
        }
    }

    /// Place the log in `area` (or disable it) and clear it
    pub fn reset<M: FlatMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        area: Option<LogArea>,
    ) -> Result<()> {
        *self = Self::new();

        let Some(area) = area else {
            log::warn!("TCGBIOS: no log area, event log disabled");
            return Ok(());
        };

        if let Err(err) = mem.fill(area.base, area.length as usize, 0) {
            log::error!("TCGBIOS: cannot clear log area: {}", err);
            return Err(TcgError::FirmwareInternalError);
        }

        log::info!(
            "TCGBIOS: event log at 0x{:08x}, {} bytes",
            area.base,
            area.length
        );
        self.area = Some(area);
        Ok(())
    }

    /// Append an entry
    ///
    /// The header's `event_data_size` must match `event`. Nothing is written
    /// when the entry does not fit.
    pub fn append<M: FlatMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        header: &PcrEventHeader,
        event: &[u8],
    ) -> Result<()> {
        if event.len() != header.event_data_size as usize {
            return Err(TcgError::FirmwareInternalError);
        }

        let Some(area) = self.area else {
            return Err(TcgError::LogOverflow);
        };

        let size = header.entry_size();
        if u64::from(self.next) + size > u64::from(area.length) {
            log::warn!("TCGBIOS: log overflow, entry of {} bytes", size);
            return Err(TcgError::LogOverflow);
        }

        let at = area.base + self.next;
        mem.write(at, &header.to_bytes())
            .and_then(|()| mem.write(at + PcrEventHeader::SIZE as u32, event))
            .map_err(|_| TcgError::FirmwareInternalError)?;

        self.last = Some(self.next);
        self.next += size as u32;
        self.count += 1;
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.area.is_some()
    }

    /// Log area, if discovered
    pub fn area(&self) -> Option<LogArea> {
        self.area
    }

    /// Log base address, zero when disabled
    pub fn base_address(&self) -> u32 {
        self.area.map_or(0, |area| area.base)
    }

    /// Address of the most recent entry, zero when empty
    pub fn last_entry_address(&self) -> u32 {
        match (self.area, self.last) {
            (Some(area), Some(last)) => area.base + last,
            _ => 0,
        }
    }

    /// Address the next entry will be written to, zero when disabled
    pub fn next_entry_address(&self) -> u32 {
        self.area.map_or(0, |area| area.base + self.next)
    }

    /// Number of entries written
    pub fn entry_count(&self) -> u32 {
        self.count
    }

    /// Bytes used
    pub fn used(&self) -> u32 {
        self.next
    }

    /// Size of the log area
    pub fn capacity(&self) -> u32 {
        self.area.map_or(0, |area| area.length)
    }

    /// Iterate over the written entries
    pub fn entries<'a, M: FlatMemory + ?Sized>(&self, mem: &'a M) -> LogEntries<'a, M> {
        LogEntries {
            mem,
            base: self.base_address(),
            offset: 0,
            end: self.next,
        }
    }
}

/// Entry read back from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Address of the header
    pub address: u32,
    pub header: PcrEventHeader,
    pub event: Vec<u8>,
}

/// Iterator over log entries
#[derive(Debug)]
pub struct LogEntries<'a, M: ?Sized> {
    mem: &'a M,
    base: u32,
    offset: u32,
    end: u32,
}

impl<M: FlatMemory + ?Sized> Iterator for LogEntries<'_, M> {
    type Item = LogEntry;

    fn next(&mut self) -> Option<LogEntry> {
        if self.offset >= self.end {
            return None;
        }

        let address = self.base + self.offset;
        let mut raw = [0u8; PcrEventHeader::SIZE];
        self.mem.read(address, &mut raw).ok()?;
        let header = PcrEventHeader::from_bytes(&raw)?;
        let event = self
            .mem
            .read_vec(address + PcrEventHeader::SIZE as u32, header.event_data_size as usize)
            .ok()?;

        self.offset += header.entry_size() as u32;
        Some(LogEntry {
            address,
            header,
            event,
        })
    }
}
