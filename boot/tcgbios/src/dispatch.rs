//! TCG BIOS interrupt dispatch
//!
//! The externally callable surface: the function code in AL selects a
//! handler, which reads its input block from the caller's input pointer and
//! writes its output block to the caller's output pointer. Results go back
//! in EAX.

use alloc::vec;
use alloc::vec::Vec;

use crate::abi::{
    self, HashAllInput, HashLogEventInput, HashLogEventOutput, HashLogExtendInput,
    HashLogExtendOutput, PassThroughInput, PassThroughOutput,
};
use crate::bios::TcgBios;
use crate::error::{result_code, Result, TcgError};
use crate::event::PcrEventHeader;
use crate::platform::{Platform, TpmDuration};
use crate::tcg::{
    event_type, rc, NUM_PCRS, TCG_MAGIC, TCG_VERSION_MAJOR, TCG_VERSION_MINOR, TPM_ALG_SHA,
    TPM_HEADER_SIZE,
};

/// Function codes (AL)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    StatusCheck = 0x00,
    HashLogExtendEvent = 0x01,
    PassThroughToTpm = 0x02,
    ShutdownPreBootInterface = 0x03,
    HashLogEvent = 0x04,
    HashAll = 0x05,
    Tss = 0x06,
    CompactHashLogExtendEvent = 0x07,
}

impl TryFrom<u8> for Function {
    type Error = u8;

    fn try_from(value: u8) -> core::result::Result<Self, u8> {
        Ok(match value {
            0x00 => Function::StatusCheck,
            0x01 => Function::HashLogExtendEvent,
            0x02 => Function::PassThroughToTpm,
            0x03 => Function::ShutdownPreBootInterface,
            0x04 => Function::HashLogEvent,
            0x05 => Function::HashAll,
            0x06 => Function::Tss,
            0x07 => Function::CompactHashLogExtendEvent,
            other => return Err(other),
        })
    }
}

/// Register state of a TCG BIOS call
///
/// `input` and `output` are the flat addresses of ES:DI and DS:SI; the
/// surrounding firmware does the segment translation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BiosRegs {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    /// ES:DI
    pub input: u32,
    /// DS:SI
    pub output: u32,
    /// Carry flag
    pub carry: bool,
}

impl BiosRegs {
    pub fn al(&self) -> u8 {
        self.eax as u8
    }

    pub fn ch(&self) -> u8 {
        (self.ecx >> 8) as u8
    }

    pub fn cl(&self) -> u8 {
        self.ecx as u8
    }

    /// Set CH and CL, leaving the upper half of ECX alone
    pub fn set_cx(&mut self, ch: u8, cl: u8) {
        self.ecx = (self.ecx & 0xFFFF_0000) | (u32::from(ch) << 8) | u32::from(cl);
    }
}

impl<P: Platform> TcgBios<P> {
    /// Handle one TCG BIOS interrupt
    pub fn interrupt(&mut self, regs: &mut BiosRegs) {
        if !self.config.enabled {
            return;
        }

        regs.carry = false;

        let function = match Function::try_from(regs.al()) {
            Ok(function) => function,
            Err(code) => {
                log::debug!("TCGBIOS: unknown function 0x{:02x}", code);
                regs.carry = true;
                return;
            }
        };

        match function {
            Function::StatusCheck => self.status_check(regs),
            Function::HashLogExtendEvent => {
                regs.eax = result_code(self.hash_log_extend_event(regs.input, regs.output));
            }
            Function::PassThroughToTpm => {
                regs.eax = result_code(self.pass_through_to_tpm(regs.input, regs.output));
            }
            Function::ShutdownPreBootInterface => {
                regs.eax = result_code(self.shutdown_preboot_interface());
            }
            Function::HashLogEvent => {
                regs.eax = result_code(self.hash_log_event(regs.input, regs.output));
            }
            Function::HashAll => {
                regs.eax = result_code(self.hash_all(regs.input, regs.output));
            }
            Function::Tss => {
                regs.eax = result_code(self.tss(regs.output));
            }
            Function::CompactHashLogExtendEvent => {
                match self.compact_hash_log_extend_event(regs.input, regs.esi, regs.ecx, regs.edx)
                {
                    Ok(number) => {
                        regs.eax = rc::TCG_PC_OK;
                        regs.edx = number;
                    }
                    Err(err) => regs.eax = err.code(),
                }
            }
        }
    }

    /// Report the interface version and the log location
    pub fn status_check(&mut self, regs: &mut BiosRegs) {
        self.state.probe(&mut self.drivers);
        if !self.state.found() {
            regs.eax = rc::TCG_PC_TPM_NOT_PRESENT;
            return;
        }

        regs.eax = rc::TCG_PC_OK;
        regs.ebx = TCG_MAGIC;
        regs.set_cx(TCG_VERSION_MAJOR, TCG_VERSION_MINOR);
        regs.edx = 0;
        regs.esi = self.log.base_address();
        regs.edi = self.log.last_entry_address();
    }

    /// Interface open and TPM working
    fn check_interface(&mut self) -> Result<()> {
        if self.state.is_interface_shutdown() {
            return Err(TcgError::InterfaceShutdown);
        }
        if !self.has_working_tpm() {
            return Err(TcgError::GeneralError);
        }
        Ok(())
    }

    /// Read an input block whose first word is its own length
    fn read_block(&self, address: u32) -> Result<Vec<u8>> {
        let len = self.platform.read_u16(address)?;
        Ok(self.platform.read_vec(address, usize::from(len))?)
    }

    /// Read a caller's log entry and check it against the input block
    fn read_caller_event(
        &self,
        log_ptr: u32,
        log_len: u32,
        pcr_index: u32,
    ) -> Result<(PcrEventHeader, Vec<u8>)> {
        let mut raw = [0u8; PcrEventHeader::SIZE];
        self.platform.read(log_ptr, &mut raw)?;
        let header = PcrEventHeader::from_bytes(&raw).ok_or(TcgError::InvalidParameter)?;

        if header.pcr_index >= NUM_PCRS
            || header.pcr_index != pcr_index
            || u64::from(log_len) != header.entry_size()
        {
            return Err(TcgError::InvalidParameter);
        }

        let data_at = log_ptr
            .checked_add(PcrEventHeader::SIZE as u32)
            .ok_or(TcgError::InvalidParameter)?;
        let event = self
            .platform
            .read_vec(data_at, header.event_data_size as usize)?;
        Ok((header, event))
    }

    /// Hash the caller's data into the entry's digest, also updating the
    /// caller's copy of the entry
    fn fill_caller_digest(
        &mut self,
        header: &mut PcrEventHeader,
        log_ptr: u32,
        hash_ptr: u32,
        hash_len: u32,
    ) -> Result<()> {
        if hash_ptr == 0 {
            return Ok(());
        }
        let data = self.platform.read_vec(hash_ptr, hash_len as usize)?;
        header.digest = self.sha1(&data)?;
        self.platform.write(log_ptr + 8, &header.digest)?;
        Ok(())
    }

    /// Store an output block. The operation has already taken effect, so a
    /// bad output pointer does not change its result.
    fn write_output(&mut self, output: u32, bytes: &[u8]) {
        if let Err(err) = self.platform.write(output, bytes) {
            log::warn!("TCGBIOS: output block not written: {}", err);
        }
    }

    // =========================================================================
    // HANDLERS
    // =========================================================================

    /// Hash caller data, extend it into a PCR and log the caller's entry
    pub fn hash_log_extend_event(&mut self, input: u32, output: u32) -> Result<()> {
        match self.hash_log_extend_event_inner(input) {
            Ok(out) => {
                self.write_output(output, &out.to_bytes());
                Ok(())
            }
            Err(err) => {
                self.write_output(output, &abi::short_output(HashLogExtendOutput::ERROR_SIZE));
                Err(err)
            }
        }
    }

    fn hash_log_extend_event_inner(&mut self, input: u32) -> Result<HashLogExtendOutput> {
        self.check_interface()?;

        let raw = self.read_block(input)?;
        let block = HashLogExtendInput::from_bytes(&raw).ok_or(TcgError::InvalidParameter)?;
        let (mut header, event) =
            self.read_caller_event(block.log_ptr, block.log_len, block.pcr_index)?;
        self.fill_caller_digest(&mut header, block.log_ptr, block.hash_ptr, block.hash_len)?;

        let event_number = self.log_extend_event(&header, &event)?;
        Ok(HashLogExtendOutput {
            event_number,
            digest: header.digest,
        })
    }

    /// Forward a raw TPM request and return the raw response
    pub fn pass_through_to_tpm(&mut self, input: u32, output: u32) -> Result<()> {
        match self.pass_through_to_tpm_inner(input) {
            Ok(response) => {
                let opb = (PassThroughOutput::HEADER_SIZE + response.len()) as u16;
                let mut out = Vec::with_capacity(usize::from(opb));
                out.extend_from_slice(&abi::short_output(opb));
                out.extend_from_slice(&response);
                self.write_output(output, &out);
                Ok(())
            }
            Err(err) => {
                self.write_output(output, &abi::short_output(PassThroughOutput::ERROR_SIZE));
                Err(err)
            }
        }
    }

    fn pass_through_to_tpm_inner(&mut self, input: u32) -> Result<Vec<u8>> {
        self.check_interface()?;

        let mut raw = [0u8; PassThroughInput::HEADER_SIZE];
        self.platform.read(input, &mut raw)?;
        let block = PassThroughInput::from_bytes(&raw).ok_or(TcgError::InvalidParameter)?;

        let header_size = PassThroughInput::HEADER_SIZE + TPM_HEADER_SIZE;
        if usize::from(block.ipb_length) < header_size
            || usize::from(block.opb_length) < PassThroughOutput::HEADER_SIZE
        {
            return Err(TcgError::InvalidParameter);
        }

        let request_at = input
            .checked_add(PassThroughInput::HEADER_SIZE as u32)
            .ok_or(TcgError::InvalidParameter)?;
        let mut length = [0u8; 4];
        let length_at = request_at.checked_add(2).ok_or(TcgError::InvalidParameter)?;
        self.platform.read(length_at, &mut length)?;
        let request_len = u32::from_be_bytes(length) as usize;
        if usize::from(block.ipb_length) != PassThroughInput::HEADER_SIZE + request_len {
            return Err(TcgError::InvalidParameter);
        }

        let request = self.platform.read_vec(request_at, request_len)?;
        let mut response =
            vec![0u8; usize::from(block.opb_length) - PassThroughOutput::HEADER_SIZE];

        let sent = self
            .transport()
            .and_then(|mut t| t.transmit(0, &request, &mut response, TpmDuration::Long));
        match sent {
            Ok(len) if len < TPM_HEADER_SIZE => {
                log::error!("TCGBIOS: pass-through response of {} bytes", len);
                self.mark_failed();
                Err(TcgError::FatalCommunicationError)
            }
            Ok(len) => {
                response.truncate(len);
                Ok(response)
            }
            Err(err) => {
                log::error!("TCGBIOS: pass-through transmit failed: {}", err);
                self.mark_failed();
                Err(err)
            }
        }
    }

    /// Latch the pre-boot interface shut
    pub fn shutdown_preboot_interface(&mut self) -> Result<()> {
        if self.state.shutdown_interface() {
            log::info!("TCGBIOS: pre-boot interface shut down");
            Ok(())
        } else {
            Err(TcgError::InterfaceShutdown)
        }
    }

    /// Hash caller data and log the caller's entry without extending a PCR
    pub fn hash_log_event(&mut self, input: u32, output: u32) -> Result<()> {
        match self.hash_log_event_inner(input) {
            Ok(out) => {
                self.write_output(output, &out.to_bytes());
                Ok(())
            }
            Err(err) => {
                self.write_output(output, &abi::short_output(HashLogEventOutput::ERROR_SIZE));
                Err(err)
            }
        }
    }

    fn hash_log_event_inner(&mut self, input: u32) -> Result<HashLogEventOutput> {
        self.check_interface()?;

        let raw = self.read_block(input)?;
        let block = HashLogEventInput::from_bytes(&raw).ok_or(TcgError::InvalidParameter)?;
        let (mut header, event) =
            self.read_caller_event(block.log_ptr, block.log_len, block.pcr_index)?;
        if header.event_type != block.event_type {
            return Err(TcgError::InvalidParameter);
        }
        self.fill_caller_digest(&mut header, block.log_ptr, block.hash_ptr, block.hash_len)?;

        self.log.append(&mut self.platform, &header, &event)?;
        Ok(HashLogEventOutput {
            event_number: self.log.entry_count(),
        })
    }

    /// SHA-1 over a caller buffer
    pub fn hash_all(&mut self, input: u32, output: u32) -> Result<()> {
        self.check_interface()?;

        let raw = self.read_block(input)?;
        let block = HashAllInput::from_bytes(&raw).ok_or(TcgError::InvalidParameter)?;
        if block.hash_ptr == 0 || block.hash_len == 0 || block.algorithm_id != TPM_ALG_SHA {
            return Err(TcgError::InvalidParameter);
        }

        let data = self.platform.read_vec(block.hash_ptr, block.hash_len as usize)?;
        let digest = self.sha1(&data)?;
        self.platform.write(output, &digest)?;
        Ok(())
    }

    /// Legacy TSS entry point
    pub fn tss(&mut self, output: u32) -> Result<()> {
        self.write_output(output, &abi::short_output(abi::TSS_OUTPUT_SIZE));

        if self.state.is_interface_shutdown() {
            Err(TcgError::InterfaceShutdown)
        } else {
            Err(TcgError::Unsupported)
        }
    }

    /// Hash a buffer and log it as EV_COMPACT_HASH with `info` as event data
    ///
    /// Returns the event number.
    pub fn compact_hash_log_extend_event(
        &mut self,
        buffer: u32,
        info: u32,
        length: u32,
        pcr_index: u32,
    ) -> Result<u32> {
        self.check_interface()?;
        if pcr_index >= NUM_PCRS {
            return Err(TcgError::InvalidParameter);
        }

        let data = self.platform.read_vec(buffer, length as usize)?;
        self.extend_and_log(
            pcr_index,
            event_type::EV_COMPACT_HASH,
            &info.to_le_bytes(),
            Some(&data),
        )
    }
}
