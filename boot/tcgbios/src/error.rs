//! Error types for the TCG BIOS interface
//!
//! Every failure the measured-boot engine can report is one variant of
//! [`TcgError`]. Each variant carries a fixed 32-bit return code so that
//! the same value can be handed back to callers of the BIOS call interface.

use core::fmt;

use crate::tcg::rc;

/// Result type for TCG BIOS operations
pub type Result<T> = core::result::Result<T, TcgError>;

/// TCG BIOS error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcgError {
    /// No working TPM
    GeneralError,

    /// Malformed or inconsistent caller input
    InvalidParameter,

    /// The log region is exhausted or was never discovered
    LogOverflow,

    /// The pre-boot interface has been latched closed
    InterfaceShutdown,

    /// The driver failed while talking to the TPM
    FatalCommunicationError,

    /// Internal programming contract violated (e.g. oversized buffer)
    FirmwareInternalError,

    /// The TPM answered a firmware command with a non-zero return code
    TpmCommandError,

    /// No TPM device was found
    TpmNotPresent,

    /// Legacy or unknown operation
    Unsupported,
}

impl TcgError {
    /// Get the return code reported through the BIOS call interface
    pub const fn code(&self) -> u32 {
        match self {
            TcgError::GeneralError => rc::TCG_GENERAL_ERROR,
            TcgError::InvalidParameter => rc::TCG_INVALID_INPUT_PARA,
            TcgError::LogOverflow => rc::TCG_PC_LOGOVERFLOW,
            TcgError::InterfaceShutdown => rc::TCG_INTERFACE_SHUTDOWN,
            TcgError::FatalCommunicationError => rc::TCG_FATAL_COM_ERROR,
            TcgError::FirmwareInternalError => rc::TCG_FIRMWARE_ERROR,
            TcgError::TpmCommandError => rc::TCG_TCG_COMMAND_ERROR,
            TcgError::TpmNotPresent => rc::TCG_PC_TPM_NOT_PRESENT,
            TcgError::Unsupported => rc::TCG_PC_UNSUPPORTED,
        }
    }

    /// Get a short description
    pub const fn as_str(&self) -> &'static str {
        match self {
            TcgError::GeneralError => "no working TPM",
            TcgError::InvalidParameter => "invalid input parameter",
            TcgError::LogOverflow => "event log overflow",
            TcgError::InterfaceShutdown => "pre-boot interface shut down",
            TcgError::FatalCommunicationError => "fatal TPM communication error",
            TcgError::FirmwareInternalError => "firmware internal error",
            TcgError::TpmCommandError => "TPM command failed",
            TcgError::TpmNotPresent => "TPM not present",
            TcgError::Unsupported => "unsupported operation",
        }
    }
}

impl fmt::Display for TcgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02x})", self.as_str(), self.code())
    }
}

/// Encode a result as a BIOS return code
pub fn result_code(result: Result<()>) -> u32 {
    match result {
        Ok(()) => rc::TCG_PC_OK,
        Err(err) => err.code(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
