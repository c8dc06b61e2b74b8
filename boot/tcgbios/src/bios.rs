//! Measured boot context
//!
//! [`TcgBios`] owns everything one boot session needs: the platform
//! collaborators, the TPM drivers, the TPM state, the measurement log and the
//! configuration. The operations live in `measure`, `lifecycle` and
//! `dispatch`.

use alloc::boxed::Box;
use alloc::vec::Vec;

use core::fmt;

use crate::config::TcgConfig;
use crate::error::{Result, TcgError};
use crate::eventlog::EventLog;
use crate::lifecycle::BootPhase;
use crate::platform::{Platform, TpmDriver, TpmDuration};
use crate::state::TpmState;
use crate::transport::Transport;

/// Measured boot context
pub struct TcgBios<P: Platform> {
    pub(crate) platform: P,
    pub(crate) drivers: Vec<Box<dyn TpmDriver>>,
    pub(crate) state: TpmState,
    pub(crate) log: EventLog,
    pub(crate) config: TcgConfig,
    pub(crate) phase: BootPhase,
}

impl<P: Platform> TcgBios<P> {
    /// Create a context; drivers are probed in order on first use
    pub fn new(platform: P, drivers: Vec<Box<dyn TpmDriver>>, config: TcgConfig) -> Self {
        Self {
            platform,
            drivers,
            state: TpmState::new(),
            log: EventLog::new(),
            config,
            phase: BootPhase::Uninitialized,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn state(&self) -> &TpmState {
        &self.state
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn config(&self) -> &TcgConfig {
        &self.config
    }

    pub fn phase(&self) -> BootPhase {
        self.phase
    }

    pub fn is_interface_shutdown(&self) -> bool {
        self.state.is_interface_shutdown()
    }

    /// Probe on first use and report whether the TPM is usable
    pub fn has_working_tpm(&mut self) -> bool {
        self.state.is_working(&mut self.drivers)
    }

    /// Channel to the selected driver
    pub(crate) fn transport(&mut self) -> Result<Transport<'_>> {
        let index = self
            .state
            .driver()
            .ok_or(TcgError::FatalCommunicationError)?;
        let driver = self
            .drivers
            .get_mut(index)
            .ok_or(TcgError::FatalCommunicationError)?;
        Ok(Transport::new(driver.as_mut()))
    }

    /// Send a firmware command and return the TPM return code
    pub(crate) fn send_command(
        &mut self,
        locality: u8,
        ordinal: u32,
        payload: &[u8],
        response: &mut [u8],
        duration: TpmDuration,
    ) -> Result<u32> {
        self.transport()?
            .send_command(locality, ordinal, payload, response, duration)
    }

    /// Send a firmware command that must succeed
    pub(crate) fn send_command_ok(
        &mut self,
        locality: u8,
        ordinal: u32,
        payload: &[u8],
        response: &mut [u8],
        duration: TpmDuration,
    ) -> Result<()> {
        match self.send_command(locality, ordinal, payload, response, duration)? {
            0 => Ok(()),
            _ => Err(TcgError::TpmCommandError),
        }
    }
}

impl<P: Platform + fmt::Debug> fmt::Debug for TcgBios<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcgBios")
            .field("platform", &self.platform)
            .field("drivers", &self.drivers.len())
            .field("state", &self.state)
            .field("log", &self.log)
            .field("config", &self.config)
            .field("phase", &self.phase)
            .finish()
    }
}
