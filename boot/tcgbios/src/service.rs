//! Shared measured boot service
//!
//! Firmware hooks (POST, boot device selection, the interrupt vector, S3)
//! run from different places. [`TcgService`] puts the one [`TcgBios`]
//! context behind a lock so they can all reach it through `&self`.

use alloc::boxed::Box;
use alloc::vec::Vec;

use core::fmt;

use spin::Mutex;

use crate::bios::TcgBios;
use crate::config::TcgConfig;
use crate::dispatch::BiosRegs;
use crate::error::Result;
use crate::platform::{Platform, TpmDriver};

/// Lock-protected [`TcgBios`]
pub struct TcgService<P: Platform> {
    inner: Mutex<TcgBios<P>>,
}

impl<P: Platform> TcgService<P> {
    /// Create the service
    pub fn new(platform: P, drivers: Vec<Box<dyn TpmDriver>>, config: TcgConfig) -> Self {
        Self::from_bios(TcgBios::new(platform, drivers, config))
    }

    /// Wrap an existing context
    pub fn from_bios(bios: TcgBios<P>) -> Self {
        Self {
            inner: Mutex::new(bios),
        }
    }

    /// Run `f` with the context locked
    pub fn with<R>(&self, f: impl FnOnce(&mut TcgBios<P>) -> R) -> R {
        f(&mut *self.inner.lock())
    }

    /// Give the context back
    pub fn into_inner(self) -> TcgBios<P> {
        self.inner.into_inner()
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    pub fn setup(&self) {
        self.inner.lock().setup();
    }

    pub fn prepare_for_boot(&self) {
        self.inner.lock().prepare_for_boot();
    }

    pub fn suspend(&self) {
        self.inner.lock().suspend();
    }

    pub fn resume(&self) {
        self.inner.lock().resume();
    }

    // =========================================================================
    // MEASUREMENTS
    // =========================================================================

    pub fn measure_option_rom(&self, rom: &[u8]) -> Result<()> {
        self.inner.lock().measure_option_rom(rom)
    }

    pub fn measure_bcv(&self, drive: u8, mbr: &[u8]) -> Result<()> {
        self.inner.lock().measure_bcv(drive, mbr)
    }

    pub fn measure_cdrom(&self, image: &[u8]) -> Result<()> {
        self.inner.lock().measure_cdrom(image)
    }

    pub fn measure_cdrom_catalog(&self, catalog: &[u8]) -> Result<()> {
        self.inner.lock().measure_cdrom_catalog(catalog)
    }

    // =========================================================================
    // CALL INTERFACE
    // =========================================================================

    /// Handle one TCG BIOS interrupt
    pub fn interrupt(&self, regs: &mut BiosRegs) {
        self.inner.lock().interrupt(regs);
    }
}

impl<P: Platform> fmt::Debug for TcgService<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcgService")
            .field("locked", &self.inner.is_locked())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Function;
    use crate::lifecycle::BootPhase;
    use crate::mock::{bios_with_acpi, LOG_BASE};
    use crate::tcg::{ordinal, TCG_MAGIC};

    #[test]
    fn test_boot_flow() {
        let (bios, rec) = bios_with_acpi(TcgConfig::default());
        let service = TcgService::from_bios(bios);

        service.setup();
        service.measure_option_rom(&[0x55, 0xAA]).unwrap();
        service.prepare_for_boot();
        assert_eq!(service.with(|bios| bios.phase()), BootPhase::PrebootLocked);

        let mut regs = BiosRegs {
            eax: Function::StatusCheck as u32,
            ..BiosRegs::default()
        };
        service.interrupt(&mut regs);
        assert_eq!(regs.ebx, TCG_MAGIC);
        assert_eq!(regs.esi, LOG_BASE);

        // startup action, option ROM, INT 19h action, eight separators
        let bios = service.into_inner();
        assert_eq!(bios.log().entry_count(), 1 + 1 + 1 + 8);
        assert!(rec.lock().ordinals().contains(&ordinal::TPM_ORD_SELF_TEST_FULL));
    }

    #[test]
    fn test_suspend_resume() {
        let (bios, rec) = bios_with_acpi(TcgConfig::default());
        let service = TcgService::from_bios(bios);
        service.setup();

        service.suspend();
        assert_eq!(service.with(|bios| bios.phase()), BootPhase::Suspended);
        service.resume();
        assert_eq!(service.with(|bios| bios.phase()), BootPhase::Started);
        assert_eq!(rec.lock().ordinals().last(), Some(&ordinal::TPM_ORD_STARTUP));
    }
}
