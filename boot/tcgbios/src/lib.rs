//! # TCG BIOS Measured Boot
//!
//! TPM 1.2 measured-boot engine for conventional (non-UEFI) PC firmware.
//!
//! ## Architecture
//!
//! The crate is organized leaf-first:
//!
//! - **Collaborators** (`platform`): TPM driver shim, flat memory, ACPI and
//!   SMBIOS locators, SHA-1 primitive
//! - **State tracker** (`state`): probe/found/working flags and the
//!   pre-boot interface latch
//! - **Transport** (`transport`): TPM command framing and response parsing
//! - **Measurement log** (`eventlog`, `event`): append-only log in the
//!   firmware-reserved ACPI log area
//! - **Extend-and-log** (`measure`): PCR extend followed by log append,
//!   with joint failure handling
//! - **Lifecycle** (`lifecycle`): startup, boot handoff, S3 resume
//! - **Call interface** (`abi`, `dispatch`): the BIOS interrupt surface
//!
//! All state lives in one owned [`TcgBios`] context. Firmware that needs a
//! shared instance wraps it in a [`TcgService`].

#![cfg_attr(not(test), no_std)]
#![allow(clippy::module_name_repetitions)]

extern crate alloc;

// =============================================================================
// MODULES
// =============================================================================

pub mod abi;
pub mod acpi;
pub mod bios;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod eventlog;
pub mod lifecycle;
pub mod measure;
pub mod platform;
pub mod service;
pub mod state;
pub mod tcg;
pub mod transport;

#[cfg(test)]
mod mock;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use bios::TcgBios;
pub use config::TcgConfig;
pub use dispatch::{BiosRegs, Function};
pub use error::{Result, TcgError};
pub use event::PcrEventHeader;
pub use eventlog::EventLog;
pub use lifecycle::{BootPhase, PermanentFlags};
pub use platform::{
    AcpiTables, DigestProvider, DriverError, FlatMemory, Platform, SmbiosTables, TpmDriver,
    TpmDuration,
};
pub use service::TcgService;
pub use state::TpmState;
