//! Extend-and-log and boot measurements
//!
//! Every measurement is extended into its PCR first and appended to the log
//! only after the TPM accepted it. A failed extend leaves the log untouched.
//! A failed append after a successful extend still reports the error: the
//! PCR is then ahead of the log and the caller sees a non-zero result.

use crate::bios::TcgBios;
use crate::error::{Result, TcgError};
use crate::event::{OptionRomEventTag, PcrEventHeader, SmbiosEventTag};
use crate::lifecycle::BootPhase;
use crate::platform::{Platform, TpmDuration};
use crate::tcg::{event_type, ordinal, pcr, PhysicalPresence, Sha1Digest, NUM_PCRS};

/// Event data of the PCR 0-7 separators
pub const EVENT_SEPARATOR: [u8; 4] = [0xFF; 4];

/// Bytes of MBR boot code
pub const MBR_CODE_SIZE: usize = 0x1B8;

/// End of the MBR partition table area
pub const MBR_SIZE: usize = 0x200;

impl<P: Platform> TcgBios<P> {
    // =========================================================================
    // EXTEND AND LOG
    // =========================================================================

    pub(crate) fn sha1(&self, data: &[u8]) -> Result<Sha1Digest> {
        Ok(self.platform.sha1(data)?)
    }

    /// Extend `header.digest` into its PCR, then log the entry
    ///
    /// Returns the event number (entry count after the append).
    pub fn log_extend_event(&mut self, header: &PcrEventHeader, event: &[u8]) -> Result<u32> {
        if !self.has_working_tpm() {
            return Err(TcgError::GeneralError);
        }
        if header.pcr_index >= NUM_PCRS {
            return Err(TcgError::InvalidParameter);
        }

        let extended = self
            .transport()
            .and_then(|mut t| t.extend(header.pcr_index, &header.digest));
        if let Err(err) = extended {
            log::error!("TCGBIOS: extend of PCR {} failed: {}", header.pcr_index, err);
            self.mark_failed();
            return Err(err);
        }

        if let Err(err) = self.log.append(&mut self.platform, header, event) {
            log::error!("TCGBIOS: PCR {} extended but not logged: {}", header.pcr_index, err);
            self.mark_failed();
            return Err(err);
        }

        log::debug!(
            "TCGBIOS: measured PCR {} type 0x{:x}, entry {}",
            header.pcr_index,
            header.event_type,
            self.log.entry_count()
        );
        Ok(self.log.entry_count())
    }

    /// Build an entry, hash `hash_data` into its digest and extend-and-log it
    pub fn extend_and_log(
        &mut self,
        pcr_index: u32,
        event_type: u32,
        event: &[u8],
        hash_data: Option<&[u8]>,
    ) -> Result<u32> {
        if !self.has_working_tpm() {
            return Err(TcgError::GeneralError);
        }
        if pcr_index >= NUM_PCRS {
            return Err(TcgError::InvalidParameter);
        }

        let mut header = PcrEventHeader::new(pcr_index, event_type, event.len() as u32);
        if let Some(data) = hash_data {
            header.digest = self.sha1(data)?;
        }
        self.log_extend_event(&header, event)
    }

    // =========================================================================
    // FAILURE HANDLING
    // =========================================================================

    /// Give up on the TPM for the rest of the boot session
    ///
    /// Tries to leave it deactivated; errors from that attempt are ignored.
    pub fn mark_failed(&mut self) {
        if self.state.working() {
            log::error!("TCGBIOS: TPM malfunctioning, deactivating");

            let sequence = [
                (ordinal::TPM_ORD_PHYSICAL_PRESENCE, Some(PhysicalPresence::CMD_ENABLE)),
                (ordinal::TPM_ORD_PHYSICAL_PRESENCE, Some(PhysicalPresence::PRESENT)),
                (ordinal::TPM_ORD_SET_TEMP_DEACTIVATED, None),
            ];
            for (ord, presence) in sequence {
                let payload = presence.map(PhysicalPresence::to_be_bytes);
                let payload = payload.as_ref().map_or(&[][..], |p| &p[..]);
                let _ = self.send_command(0, ord, payload, &mut [], TpmDuration::Short);
            }
        }

        self.state.set_failed();
        self.phase = BootPhase::Failed;
    }

    // =========================================================================
    // MEASUREMENTS
    // =========================================================================

    /// Log an EV_ACTION string, hashing the string itself
    pub fn add_action(&mut self, pcr_index: u32, action: &str) -> Result<u32> {
        let bytes = action.as_bytes();
        self.extend_and_log(pcr_index, event_type::EV_ACTION, bytes, Some(bytes))
    }

    /// Separators for PCRs 0-7, closing the pre-OS measurements
    pub fn add_event_separators(&mut self) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        if !self.has_working_tpm() {
            return Err(TcgError::GeneralError);
        }

        for pcr_index in pcr::PCR0_BIOS..=pcr::PCR7_LAST_PREBOOT {
            self.extend_and_log(pcr_index, event_type::EV_SEPARATOR, &[], Some(&EVENT_SEPARATOR))?;
        }
        Ok(())
    }

    /// Measure the SMBIOS structure table into PCR 1
    ///
    /// Succeeds without a measurement when there is no SMBIOS.
    pub fn measure_smbios(&mut self) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        if !self.has_working_tpm() {
            return Err(TcgError::GeneralError);
        }

        let Some(table) = self.platform.smbios_structure_table() else {
            log::debug!("TCGBIOS: no SMBIOS to measure");
            return Ok(());
        };

        let data = self.platform.read_vec(table.address, table.length as usize)?;
        let tag = SmbiosEventTag::new(self.sha1(&data)?).to_bytes();
        self.extend_and_log(
            pcr::PCR1_PLATFORM_CONFIG,
            event_type::EV_EVENT_TAG,
            &tag,
            Some(&tag),
        )?;
        Ok(())
    }

    /// Measure an option ROM image into PCR 2
    pub fn measure_option_rom(&mut self, rom: &[u8]) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        if !self.has_working_tpm() {
            return Err(TcgError::GeneralError);
        }

        let tag = OptionRomEventTag::new(0, self.sha1(rom)?).to_bytes();
        self.extend_and_log(pcr::PCR2_OPTION_ROM, event_type::EV_EVENT_TAG, &tag, Some(&tag))?;
        Ok(())
    }

    /// Measure a boot-connection-vector device: the boot attempt, the MBR
    /// code into PCR 4 and the partition table into PCR 5
    pub fn measure_bcv(&mut self, drive: u8, mbr: &[u8]) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        if !self.has_working_tpm() {
            return Err(TcgError::GeneralError);
        }
        if mbr.len() < MBR_SIZE {
            return Err(TcgError::InvalidParameter);
        }

        let action = if drive == 0x80 {
            "Booting BCV device 80h (HDD)"
        } else {
            "Booting BCV device 00h (Floppy)"
        };
        self.add_action(pcr::PCR4_IPL, action)?;

        self.extend_and_log(
            pcr::PCR4_IPL,
            event_type::EV_IPL,
            b"MBR",
            Some(&mbr[..MBR_CODE_SIZE]),
        )?;
        self.extend_and_log(
            pcr::PCR5_IPL_CONFIG,
            event_type::EV_IPL_PARTITION_DATA,
            b"MBR PARTITION_TABLE",
            Some(&mbr[MBR_CODE_SIZE..MBR_SIZE]),
        )?;
        Ok(())
    }

    /// Measure an El Torito boot image into PCR 4
    pub fn measure_cdrom(&mut self, image: &[u8]) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        if !self.has_working_tpm() {
            return Err(TcgError::GeneralError);
        }

        self.add_action(pcr::PCR4_IPL, "Booting from CD ROM device")?;
        self.extend_and_log(pcr::PCR4_IPL, event_type::EV_IPL, b"EL TORITO IPL", Some(image))?;
        Ok(())
    }

    /// Measure an El Torito boot catalog into PCR 5
    pub fn measure_cdrom_catalog(&mut self, catalog: &[u8]) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        if !self.has_working_tpm() {
            return Err(TcgError::GeneralError);
        }

        self.add_action(pcr::PCR4_IPL, "Booting from CD ROM device")?;
        self.extend_and_log(
            pcr::PCR5_IPL_CONFIG,
            event_type::EV_IPL_PARTITION_DATA,
            b"BOOT CATALOG",
            Some(catalog),
        )?;
        Ok(())
    }
}
