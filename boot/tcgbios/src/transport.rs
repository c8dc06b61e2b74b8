//! TPM command transport
//!
//! Frames TPM 1.2 requests, pushes them through the driver shim and parses
//! the response header.

use heapless::Vec as FrameVec;

use crate::error::{Result, TcgError};
use crate::platform::{TpmDriver, TpmDuration};
use crate::tcg::{
    tag, tpm_rc, MAX_COMMAND_APPEND, MAX_COMMAND_RESPONSE, SHA1_DIGEST_SIZE, TPM_HEADER_SIZE,
};

/// Largest request frame the firmware ever builds
pub const MAX_REQUEST_FRAME: usize = 64;

/// Encoded request frame
pub type RequestFrame = FrameVec<u8, MAX_REQUEST_FRAME>;

// =============================================================================
// COMMAND BUILDER
// =============================================================================

/// TPM 1.2 command builder with a payload of at most `N` bytes
#[derive(Debug, Clone)]
pub struct CommandFrame<const N: usize> {
    ordinal: u32,
    payload: FrameVec<u8, N>,
}

/// Command as sent by `send_command`
pub type Command = CommandFrame<MAX_COMMAND_APPEND>;

impl<const N: usize> CommandFrame<N> {
    /// Create new command
    pub fn new(ordinal: u32) -> Self {
        Self {
            ordinal,
            payload: FrameVec::new(),
        }
    }

    /// Add u16
    pub fn add_u16(&mut self, value: u16) -> Result<&mut Self> {
        self.add_bytes(&value.to_be_bytes())
    }

    /// Add u32
    pub fn add_u32(&mut self, value: u32) -> Result<&mut Self> {
        self.add_bytes(&value.to_be_bytes())
    }

    /// Add bytes
    pub fn add_bytes(&mut self, data: &[u8]) -> Result<&mut Self> {
        self.payload
            .extend_from_slice(data)
            .map_err(|_| TcgError::FirmwareInternalError)?;
        Ok(self)
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    /// Total frame length
    pub fn size(&self) -> usize {
        TPM_HEADER_SIZE + self.payload.len()
    }

    /// Build command
    pub fn build(&self) -> Result<RequestFrame> {
        let size = self.size() as u32;

        let mut frame = RequestFrame::new();
        for part in [
            &tag::TPM_TAG_RQU_CMD.to_be_bytes()[..],
            &size.to_be_bytes()[..],
            &self.ordinal.to_be_bytes()[..],
            &self.payload[..],
        ] {
            frame
                .extend_from_slice(part)
                .map_err(|_| TcgError::FirmwareInternalError)?;
        }

        Ok(frame)
    }
}

// =============================================================================
// RESPONSE PARSER
// =============================================================================

/// TPM 1.2 response parser
#[derive(Debug)]
pub struct TpmResponse<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> TpmResponse<'a> {
    /// Parse response
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < TPM_HEADER_SIZE {
            return Err(TcgError::TpmCommandError);
        }

        Ok(Self { data, offset: 0 })
    }

    /// Get tag
    pub fn tag(&self) -> u16 {
        u16::from_be_bytes([self.data[0], self.data[1]])
    }

    /// Get size
    pub fn size(&self) -> u32 {
        u32::from_be_bytes([self.data[2], self.data[3], self.data[4], self.data[5]])
    }

    /// Get return code
    pub fn return_code(&self) -> u32 {
        u32::from_be_bytes([self.data[6], self.data[7], self.data[8], self.data[9]])
    }

    pub fn is_success(&self) -> bool {
        self.return_code() == tpm_rc::TPM_SUCCESS
    }

    /// Get payload
    pub fn payload(&self) -> &'a [u8] {
        &self.data[TPM_HEADER_SIZE..]
    }

    /// Read u8
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read u16
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read u32
    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let payload = self.payload();
        if self.offset + len > payload.len() {
            return Err(TcgError::TpmCommandError);
        }
        let bytes = &payload[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Command channel to the selected TPM
pub struct Transport<'a> {
    driver: &'a mut dyn TpmDriver,
}

impl core::fmt::Debug for Transport<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

impl<'a> Transport<'a> {
    pub fn new(driver: &'a mut dyn TpmDriver) -> Self {
        Self { driver }
    }

    /// Send a complete request and read the response into `response`
    ///
    /// Returns the response length. Any driver failure is reported as
    /// [`TcgError::FatalCommunicationError`].
    pub fn transmit(
        &mut self,
        locality: u8,
        request: &[u8],
        response: &mut [u8],
        duration: TpmDuration,
    ) -> Result<usize> {
        self.driver.activate(locality)?;
        self.driver.send(request)?;
        self.driver.wait_data_valid()?;
        self.driver.wait_response_ready(duration)?;
        let len = self.driver.read_response(response)?;
        self.driver.ready()?;

        if len > response.len() {
            return Err(TcgError::FatalCommunicationError);
        }
        Ok(len)
    }

    /// Build a command from `ordinal` and `payload`, send it and return the
    /// TPM return code
    ///
    /// The first `response.len()` bytes of the (zero padded) response are
    /// copied into `response`. A response shorter than the header, or a
    /// successful one shorter than `response`, is a communication failure.
    pub fn send_command(
        &mut self,
        locality: u8,
        ordinal: u32,
        payload: &[u8],
        response: &mut [u8],
        duration: TpmDuration,
    ) -> Result<u32> {
        if response.len() > MAX_COMMAND_RESPONSE || payload.len() > MAX_COMMAND_APPEND {
            log::error!(
                "TCGBIOS: internal error: payload {} / response {} too large",
                payload.len(),
                response.len()
            );
            return Err(TcgError::FirmwareInternalError);
        }

        let mut command = Command::new(ordinal);
        command.add_bytes(payload)?;
        let request = command.build()?;

        let mut buffer = [0u8; MAX_COMMAND_RESPONSE];
        let len = self.transmit(locality, &request, &mut buffer, duration)?;

        if len < TPM_HEADER_SIZE {
            log::error!(
                "TCGBIOS: ordinal 0x{:08x}: {} byte response is shorter than a header",
                ordinal,
                len
            );
            return Err(TcgError::FatalCommunicationError);
        }

        let rsp = TpmResponse::new(&buffer[..len])?;
        let rc = rsp.return_code();
        log::debug!(
            "TCGBIOS: ordinal 0x{:08x} returned 0x{:08x}",
            ordinal,
            rc
        );

        // Error responses carry only the header.
        if rc == tpm_rc::TPM_SUCCESS && len < response.len() {
            log::error!(
                "TCGBIOS: ordinal 0x{:08x}: short response ({} of {} bytes)",
                ordinal,
                len,
                response.len()
            );
            return Err(TcgError::FatalCommunicationError);
        }

        response.copy_from_slice(&buffer[..response.len()]);
        Ok(rc)
    }

    /// TPM_Extend: fold `digest` into PCR `pcr_index`
    ///
    /// A valid answer is exactly header plus new PCR value with a zero
    /// return code.
    pub fn extend(&mut self, pcr_index: u32, digest: &[u8; SHA1_DIGEST_SIZE]) -> Result<()> {
        let mut command = CommandFrame::<{ 4 + SHA1_DIGEST_SIZE }>::new(
            crate::tcg::ordinal::TPM_ORD_EXTEND,
        );
        command.add_u32(pcr_index)?.add_bytes(digest)?;
        let request = command.build()?;

        let mut buffer = [0u8; crate::tcg::EXTEND_RESPONSE_SIZE];
        let len = self.transmit(0, &request, &mut buffer, TpmDuration::Short)?;
        if len != buffer.len() {
            log::error!("TCGBIOS: TPM_Extend returned {} bytes", len);
            return Err(TcgError::TpmCommandError);
        }

        let rsp = TpmResponse::new(&buffer)?;
        if !rsp.is_success() {
            log::error!("TCGBIOS: TPM_Extend returned 0x{:08x}", rsp.return_code());
            return Err(TcgError::TpmCommandError);
        }

        Ok(())
    }
}
