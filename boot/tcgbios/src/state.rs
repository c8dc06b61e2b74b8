//! TPM state tracking
//!
//! Probe/found/working flags, the selected driver and the one-way latch of
//! the pre-boot call interface.

use alloc::boxed::Box;

use bitflags::bitflags;

use crate::platform::TpmDriver;

bitflags! {
    /// TPM state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TpmFlags: u8 {
        /// Driver probing has run
        const PROBED = 1 << 0;
        /// A TPM was found
        const FOUND = 1 << 1;
        /// The TPM is usable; cleared permanently on failure
        const WORKING = 1 << 2;
        /// The pre-boot interface has been shut down
        const IF_SHUTDOWN = 1 << 3;
    }
}

/// TPM state for one boot session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmState {
    flags: TpmFlags,
    driver: Option<usize>,
}

impl TpmState {
    /// Fresh, unprobed state
    pub const fn new() -> Self {
        Self {
            flags: TpmFlags::empty(),
            driver: None,
        }
    }

    /// Forget everything, including the interface latch
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Select the first driver that probes and initializes
    ///
    /// Only the first call does anything.
    pub fn probe(&mut self, drivers: &mut [Box<dyn TpmDriver>]) {
        if self.flags.contains(TpmFlags::PROBED) {
            return;
        }
        self.flags.insert(TpmFlags::PROBED);

        for (index, driver) in drivers.iter_mut().enumerate() {
            if !driver.probe() {
                continue;
            }
            if let Err(err) = driver.init() {
                log::warn!("TCGBIOS: TPM driver {} failed to initialize: {}", index, err);
                continue;
            }

            log::info!("TCGBIOS: using TPM driver {}", index);
            self.driver = Some(index);
            self.flags.insert(TpmFlags::FOUND | TpmFlags::WORKING);
            return;
        }

        log::info!("TCGBIOS: no TPM found");
    }

    /// Probe if needed and report whether the TPM is usable
    pub fn is_working(&mut self, drivers: &mut [Box<dyn TpmDriver>]) -> bool {
        self.probe(drivers);
        self.working()
    }

    pub fn flags(&self) -> TpmFlags {
        self.flags
    }

    pub fn probed(&self) -> bool {
        self.flags.contains(TpmFlags::PROBED)
    }

    pub fn found(&self) -> bool {
        self.flags.contains(TpmFlags::FOUND)
    }

    /// Working flag without probing
    pub fn working(&self) -> bool {
        self.flags.contains(TpmFlags::WORKING)
    }

    /// Index of the selected driver
    pub fn driver(&self) -> Option<usize> {
        self.driver
    }

    /// Clear the working flag for the rest of the boot session
    pub fn set_failed(&mut self) {
        self.flags.remove(TpmFlags::WORKING);
    }

    pub fn is_interface_shutdown(&self) -> bool {
        self.flags.contains(TpmFlags::IF_SHUTDOWN)
    }

    /// Latch the pre-boot interface shut, returning false if it already was
    pub fn shutdown_interface(&mut self) -> bool {
        let was_open = !self.is_interface_shutdown();
        self.flags.insert(TpmFlags::IF_SHUTDOWN);
        was_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTpm;

    #[test]
    fn test_probe_selects_first_present_driver() {
        let (absent, absent_rec) = MockTpm::absent();
        let (present, _) = MockTpm::new();
        let mut drivers: alloc::vec::Vec<Box<dyn TpmDriver>> =
            alloc::vec![Box::new(absent), Box::new(present)];

        let mut state = TpmState::new();
        assert!(state.is_working(&mut drivers));
        assert!(state.found());
        assert_eq!(state.driver(), Some(1));
        assert_eq!(absent_rec.lock().probes, 1);
    }

    #[test]
    fn test_probe_runs_once() {
        let (tpm, rec) = MockTpm::new();
        let mut drivers: alloc::vec::Vec<Box<dyn TpmDriver>> = alloc::vec![Box::new(tpm)];

        let mut state = TpmState::new();
        state.probe(&mut drivers);
        state.probe(&mut drivers);
        assert!(state.is_working(&mut drivers));
        assert_eq!(rec.lock().probes, 1);
    }

    #[test]
    fn test_init_failure_skips_driver() {
        let (tpm, rec) = MockTpm::new();
        rec.lock().fail_init = true;
        let mut drivers: alloc::vec::Vec<Box<dyn TpmDriver>> = alloc::vec![Box::new(tpm)];

        let mut state = TpmState::new();
        assert!(!state.is_working(&mut drivers));
        assert!(state.probed());
        assert!(!state.found());
        assert_eq!(state.driver(), None);
    }

    #[test]
    fn test_failure_and_latch() {
        let (tpm, _) = MockTpm::new();
        let mut drivers: alloc::vec::Vec<Box<dyn TpmDriver>> = alloc::vec![Box::new(tpm)];

        let mut state = TpmState::new();
        assert!(state.is_working(&mut drivers));
        state.set_failed();
        assert!(!state.is_working(&mut drivers));
        assert!(state.found());

        assert!(state.shutdown_interface());
        assert!(!state.shutdown_interface());
        assert!(state.is_interface_shutdown());

        state.reset();
        assert!(!state.is_interface_shutdown());
        assert!(!state.probed());
    }
}
