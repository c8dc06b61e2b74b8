//! Boot lifecycle
//!
//! Setup and TPM start-up at POST, lock-down before handing off to the OS
//! loader, and S3 resume.

use crate::acpi::TcpaLookup;
use crate::bios::TcgBios;
use crate::error::{Result, TcgError};
use crate::platform::{Platform, TpmDuration};
use crate::tcg::{
    ordinal, pcr, tpm_rc, Capability, PhysicalPresence, StartupType, TPM_HEADER_SIZE,
};
use crate::transport::TpmResponse;

/// Where the measured boot session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootPhase {
    /// Nothing has run yet
    #[default]
    Uninitialized,
    /// Drivers probed and the log placed; the TPM has not been started
    Probed,
    /// TPM started and self-tested
    Started,
    /// Physical presence locked and separators logged
    PrebootLocked,
    /// The platform went to S3
    Suspended,
    /// The TPM was given up on
    Failed,
}

/// Selected TPM_PERMANENT_FLAGS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermanentFlags {
    pub disabled: bool,
    pub ownership: bool,
    pub deactivated: bool,
}

/// GetCapability(timeouts) response size
const TIMEOUTS_RESPONSE_SIZE: usize = TPM_HEADER_SIZE + 4 + 4 * 4;
/// GetCapability(durations) response size
const DURATIONS_RESPONSE_SIZE: usize = TPM_HEADER_SIZE + 4 + 3 * 4;
/// GetCapability(permanent flags) response size: size, tag and 20 flags
const PERMANENT_FLAGS_RESPONSE_SIZE: usize = TPM_HEADER_SIZE + 4 + 2 + 20;
/// GetCapability(owner) response size
const OWNER_RESPONSE_SIZE: usize = TPM_HEADER_SIZE + 4 + 1;

impl<P: Platform> TcgBios<P> {
    // =========================================================================
    // POST
    // =========================================================================

    /// Probe the TPM, place the log and start the TPM
    pub fn setup(&mut self) {
        if !self.config.enabled {
            return;
        }

        self.state.reset();
        self.phase = BootPhase::Uninitialized;

        if !self.has_working_tpm() {
            log::info!("TCGBIOS: no working TPM, shutting down the interface");
            self.state.shutdown_interface();
            return;
        }

        self.reset_log();
        self.phase = BootPhase::Probed;

        if self.config.hypervisor_managed {
            log::info!("TCGBIOS: TPM start-up left to the hypervisor");
            return;
        }

        // failures already marked the TPM failed
        let _ = self.startup();
    }

    /// Rediscover the log area and clear the log
    fn reset_log(&mut self) {
        let area = match self.platform.tcpa_log_area() {
            TcpaLookup::Found(area) => Some(area),
            TcpaLookup::NotFound => None,
            TcpaLookup::NoRsdp => {
                log::warn!("TCGBIOS: RSDP was not found, disabling the interface");
                self.state.shutdown_interface();
                None
            }
        };

        if self.log.reset(&mut self.platform, area).is_err() {
            let _ = self.log.reset(&mut self.platform, None);
        }
    }

    /// Start the TPM, query its timing, self-test it and take the first
    /// measurements
    pub fn startup(&mut self) -> Result<()> {
        if !self.has_working_tpm() {
            return Err(TcgError::GeneralError);
        }

        match self.startup_sequence() {
            Ok(()) => {
                log::info!("TCGBIOS: TPM started");
                self.phase = BootPhase::Started;
                Ok(())
            }
            Err(err) => {
                log::error!("TCGBIOS: TPM start-up failed: {}", err);
                self.mark_failed();
                Err(err)
            }
        }
    }

    fn startup_sequence(&mut self) -> Result<()> {
        log::info!("TCGBIOS: starting with TPM_Startup(ST_CLEAR)");
        let rc = self.send_command(
            0,
            ordinal::TPM_ORD_STARTUP,
            &StartupType::Clear.to_be_bytes(),
            &mut [],
            TpmDuration::Short,
        )?;
        let tolerated = self.config.tolerate_started_tpm && rc == tpm_rc::TPM_INVALID_POSTINIT;
        if rc != tpm_rc::TPM_SUCCESS && !tolerated {
            return Err(TcgError::TpmCommandError);
        }

        self.determine_timeouts()?;

        self.send_command_ok(
            0,
            ordinal::TPM_ORD_SELF_TEST_FULL,
            &[],
            &mut [],
            TpmDuration::Long,
        )?;

        let rc = self.send_command(
            3,
            ordinal::TSC_ORD_RESET_ESTABLISHMENT_BIT,
            &[],
            &mut [],
            TpmDuration::Short,
        )?;
        if rc != tpm_rc::TPM_SUCCESS && rc != tpm_rc::TPM_BAD_LOCALITY {
            return Err(TcgError::TpmCommandError);
        }

        self.measure_smbios()?;
        self.add_action(pcr::PCR2_OPTION_ROM, "Start Option ROM Scan")?;
        Ok(())
    }

    /// Read the TIS timeouts and command durations from the TPM and hand
    /// them to the driver
    pub(crate) fn determine_timeouts(&mut self) -> Result<()> {
        let mut buf = [0u8; TIMEOUTS_RESPONSE_SIZE];
        self.send_command_ok(
            0,
            ordinal::TPM_ORD_GET_CAPABILITY,
            &Capability::Timeouts.payload(),
            &mut buf,
            TpmDuration::Short,
        )?;
        let mut rsp = TpmResponse::new(&buf)?;
        rsp.read_u32()?;
        let mut timeouts = [0u32; 4];
        for t in &mut timeouts {
            *t = rsp.read_u32()?;
        }

        let mut buf = [0u8; DURATIONS_RESPONSE_SIZE];
        self.send_command_ok(
            0,
            ordinal::TPM_ORD_GET_CAPABILITY,
            &Capability::Durations.payload(),
            &mut buf,
            TpmDuration::Short,
        )?;
        let mut rsp = TpmResponse::new(&buf)?;
        rsp.read_u32()?;
        let mut durations = [0u32; 3];
        for d in &mut durations {
            *d = rsp.read_u32()?;
        }

        log::debug!(
            "TCGBIOS: timeouts {:?}, durations {:?}",
            timeouts,
            durations
        );

        let index = self.state.driver().ok_or(TcgError::FatalCommunicationError)?;
        if let Some(driver) = self.drivers.get_mut(index) {
            driver.set_timeouts(&timeouts, &durations);
        }
        Ok(())
    }

    // =========================================================================
    // BOOT HANDOFF
    // =========================================================================

    /// Lock physical presence and close the pre-OS measurements
    ///
    /// A failure marks the TPM failed; booting continues regardless.
    pub fn prepare_for_boot(&mut self) {
        if !self.config.enabled || !self.has_working_tpm() {
            return;
        }

        match self.prepare_for_boot_sequence() {
            Ok(()) => self.phase = BootPhase::PrebootLocked,
            Err(err) => {
                log::error!("TCGBIOS: boot handoff measurement failed: {}", err);
                self.mark_failed();
            }
        }
    }

    fn prepare_for_boot_sequence(&mut self) -> Result<()> {
        for presence in [
            PhysicalPresence::CMD_ENABLE,
            PhysicalPresence::NOTPRESENT | PhysicalPresence::LOCK,
        ] {
            self.send_command_ok(
                0,
                ordinal::TPM_ORD_PHYSICAL_PRESENCE,
                &presence.to_be_bytes(),
                &mut [],
                TpmDuration::Short,
            )?;
        }

        self.add_action(pcr::PCR4_IPL, "Calling INT 19h")?;
        self.add_event_separators()
    }

    // =========================================================================
    // S3
    // =========================================================================

    /// Record entry into S3; the OS saves the TPM state
    pub fn suspend(&mut self) {
        if self.config.enabled && self.phase != BootPhase::Failed {
            self.phase = BootPhase::Suspended;
        }
    }

    /// Resume from S3 with TPM_Startup(ST_STATE); the log is kept as is
    pub fn resume(&mut self) {
        if !self.config.enabled || !self.has_working_tpm() {
            return;
        }

        log::info!("TCGBIOS: resuming with TPM_Startup(ST_STATE)");
        let result = self.send_command_ok(
            0,
            ordinal::TPM_ORD_STARTUP,
            &StartupType::State.to_be_bytes(),
            &mut [],
            TpmDuration::Short,
        );

        match result {
            Ok(()) => self.phase = BootPhase::Started,
            Err(err) => {
                log::error!("TCGBIOS: TPM resume failed: {}", err);
                self.mark_failed();
            }
        }
    }

    // =========================================================================
    // CAPABILITY QUERIES
    // =========================================================================

    /// Read the disabled, ownership and deactivated permanent flags
    pub fn read_permanent_flags(&mut self) -> Result<PermanentFlags> {
        if !self.has_working_tpm() {
            return Err(TcgError::GeneralError);
        }

        let mut buf = [0u8; PERMANENT_FLAGS_RESPONSE_SIZE];
        let result = self
            .send_command_ok(
                0,
                ordinal::TPM_ORD_GET_CAPABILITY,
                &Capability::PermanentFlags.payload(),
                &mut buf,
                TpmDuration::Short,
            )
            .and_then(|()| {
                let mut rsp = TpmResponse::new(&buf)?;
                rsp.read_u32()?;
                rsp.read_u16()?;
                let flags = rsp.read_bytes(3)?;
                Ok(PermanentFlags {
                    disabled: flags[0] != 0,
                    ownership: flags[1] != 0,
                    deactivated: flags[2] != 0,
                })
            });

        if result.is_err() {
            self.mark_failed();
        }
        result
    }

    /// Whether an owner is installed
    pub fn has_owner(&mut self) -> Result<bool> {
        if !self.has_working_tpm() {
            return Err(TcgError::GeneralError);
        }

        let mut buf = [0u8; OWNER_RESPONSE_SIZE];
        let result = self
            .send_command_ok(
                0,
                ordinal::TPM_ORD_GET_CAPABILITY,
                &Capability::OwnerAuth.payload(),
                &mut buf,
                TpmDuration::Short,
            )
            .and_then(|()| {
                let mut rsp = TpmResponse::new(&buf)?;
                rsp.read_u32()?;
                Ok(rsp.read_u8()? != 0)
            });

        if result.is_err() {
            self.mark_failed();
        }
        result
    }
}
