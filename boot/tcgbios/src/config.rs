//! Measured boot configuration

/// Measured boot configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcgConfig {
    /// Measured boot support compiled in and enabled
    pub enabled: bool,
    /// Accept TPM_INVALID_POSTINIT from TPM_Startup(ST_CLEAR), for firmware
    /// that runs after another stage may already have started the TPM
    pub tolerate_started_tpm: bool,
    /// A hypervisor owns TPM start-up; skip it after probing
    pub hypervisor_managed: bool,
}

impl TcgConfig {
    /// Create default configuration
    pub const fn new() -> Self {
        Self {
            enabled: true,
            tolerate_started_tpm: false,
            hypervisor_managed: false,
        }
    }

    /// Configuration with measured boot turned off
    pub const fn disabled() -> Self {
        Self::new().with_enabled(false)
    }

    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub const fn with_tolerate_started_tpm(mut self, tolerate: bool) -> Self {
        self.tolerate_started_tpm = tolerate;
        self
    }

    pub const fn with_hypervisor_managed(mut self, managed: bool) -> Self {
        self.hypervisor_managed = managed;
        self
    }
}

impl Default for TcgConfig {
    fn default() -> Self {
        Self::new()
    }
}
