//! Socrates diagnostic protocol client.
//!
//! Socrates runs after a payload has been started and speaks a plain
//! length-prefixed protocol over the same bulk pipe:
//! `type(2, BE) | length(2, BE) | payload`. No flags, escaping or CRC.

pub mod command;
pub mod mmc;

pub use command::{DiagCommand, Width};

use byteorder::{BigEndian, ByteOrder};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::buffer::ByteAccumulator;
use crate::client::{ProtocolClient, fill_from};
use crate::error::{ProtocolError, Result};
use crate::hdlc::FramingError;
use crate::protocol::Packet;
use crate::protocol::constants::{DIAG_BUFFER_SIZE, DIAG_DEFAULT_TIMEOUT, DIAG_HEADER_SIZE};
use crate::retry::RetryPolicy;
use crate::transport::UsbTransport;

/// Name and revision reported by the Socrates agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocratesVersion {
    pub name: String,
    pub number: u8,
}

impl SocratesVersion {
    /// Parse `name\0 number`. Bytes after the number are ignored.
    pub fn parse(payload: &[u8]) -> std::result::Result<Self, ProtocolError> {
        if payload.len() < 2 {
            return Err(ProtocolError::MalformedVersion(format!(
                "{} bytes",
                payload.len()
            )));
        }

        let nul = payload
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ProtocolError::MalformedVersion("name not terminated".into()))?;
        let number = *payload
            .get(nul + 1)
            .ok_or_else(|| ProtocolError::MalformedVersion("missing revision byte".into()))?;

        Ok(Self {
            name: String::from_utf8_lossy(&payload[..nul]).into_owned(),
            number,
        })
    }
}

impl fmt::Display for SocratesVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.number)
    }
}

/// Client for the Socrates register and MMC protocol.
pub struct SocratesClient<T: UsbTransport> {
    transport: T,
    fifo: ByteAccumulator,
    retry: RetryPolicy,
    timeout: Duration,
}

impl<T: UsbTransport> SocratesClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            fifo: ByteAccumulator::new(DIAG_BUFFER_SIZE),
            retry: RetryPolicy::default(),
            timeout: DIAG_DEFAULT_TIMEOUT,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Timeout applied to each individual read.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[instrument(skip(self))]
    pub fn version(&mut self) -> Result<SocratesVersion> {
        let response = self.transact(&Packet::new(DiagCommand::ReqVersion), DiagCommand::RspOk)?;
        let payload = response.payload().ok_or(ProtocolError::MissingPayload {
            kind: response.kind(),
        })?;
        let version = SocratesVersion::parse(payload)?;
        info!(version = %version, "Socrates version");
        Ok(version)
    }

    /// Read `width` bits at `address`, zero-extended.
    #[instrument(skip(self), fields(address = format!("0x{:X}", address), width = %width))]
    pub fn read(&mut self, width: Width, address: u64) -> Result<u64> {
        let mut request = [0u8; 8];
        BigEndian::write_u64(&mut request, address);

        let response = self.transact(
            &Packet::with_payload(width.read_request(), request),
            width.read_response(),
        )?;
        let data = expect_len(&response, width.bytes())?;
        Ok(BigEndian::read_uint(&data, width.bytes()))
    }

    /// Write the low `width` bits of `value` to `address`.
    #[instrument(skip(self), fields(
        address = format!("0x{:X}", address),
        value = format!("0x{:X}", value),
        width = %width,
    ))]
    pub fn write(&mut self, width: Width, address: u64, value: u64) -> Result<()> {
        let n = width.bytes();
        let mut request = [0u8; 16];
        BigEndian::write_u64(&mut request[0..8], address);
        BigEndian::write_uint(&mut request[8..8 + n], value & width.max_value(), n);

        self.transact(
            &Packet::with_payload(width.write_request(), &request[..8 + n]),
            DiagCommand::RspOk,
        )?;
        Ok(())
    }

    pub fn read8(&mut self, address: u64) -> Result<u8> {
        self.read(Width::W8, address).map(|v| v as u8)
    }

    pub fn read16(&mut self, address: u64) -> Result<u16> {
        self.read(Width::W16, address).map(|v| v as u16)
    }

    pub fn read32(&mut self, address: u64) -> Result<u32> {
        self.read(Width::W32, address).map(|v| v as u32)
    }

    pub fn read64(&mut self, address: u64) -> Result<u64> {
        self.read(Width::W64, address)
    }

    pub fn write8(&mut self, address: u64, value: u8) -> Result<()> {
        self.write(Width::W8, address, value.into())
    }

    pub fn write16(&mut self, address: u64, value: u16) -> Result<()> {
        self.write(Width::W16, address, value.into())
    }

    pub fn write32(&mut self, address: u64, value: u32) -> Result<()> {
        self.write(Width::W32, address, value.into())
    }

    pub fn write64(&mut self, address: u64, value: u64) -> Result<()> {
        self.write(Width::W64, address, value)
    }

    /// Receive with an explicit per-read timeout.
    ///
    /// Reads until the header is buffered, then until the whole declared
    /// body is. Nothing is consumed before the frame is complete.
    pub fn receive_packet_timeout(&mut self, timeout: Duration) -> Result<Packet> {
        let frame_len = loop {
            if let Some(len) = self.buffered_frame_len()? {
                if self.fifo.available() >= len {
                    break len;
                }
            }
            fill_from(
                Self::NAME,
                &mut self.transport,
                &mut self.fifo,
                &self.retry,
                Some(timeout),
            )?;
        };

        let frame = self.fifo.get(frame_len)?;
        let kind = BigEndian::read_u16(&frame[0..2]);
        let packet = Packet::with_payload(kind, &frame[DIAG_HEADER_SIZE..]);
        debug!(kind = %command_name(kind), payload = packet.payload_len(), "Received");
        Ok(packet)
    }

    /// Total frame length once the header is buffered.
    fn buffered_frame_len(&self) -> Result<Option<usize>> {
        if self.fifo.available() < DIAG_HEADER_SIZE {
            return Ok(None);
        }
        let header = self.fifo.peek(DIAG_HEADER_SIZE)?;
        let len = DIAG_HEADER_SIZE + BigEndian::read_u16(&header[2..4]) as usize;
        if len > self.fifo.capacity() {
            return Err(FramingError::FrameTooLarge {
                max: self.fifo.capacity(),
            }
            .into());
        }
        Ok(Some(len))
    }

    fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        let len = DIAG_HEADER_SIZE + packet.payload_len();
        if len > DIAG_BUFFER_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                len: packet.payload_len(),
                max: DIAG_BUFFER_SIZE - DIAG_HEADER_SIZE,
            }
            .into());
        }

        let mut buf = [0u8; DIAG_BUFFER_SIZE];
        BigEndian::write_u16(&mut buf[0..2], packet.kind());
        BigEndian::write_u16(&mut buf[2..4], packet.payload_len() as u16);
        if let Some(payload) = packet.payload() {
            buf[DIAG_HEADER_SIZE..len].copy_from_slice(payload);
        }

        debug!(kind = %command_name(packet.kind()), payload = packet.payload_len(), "Sending");
        self.transport.write_all(&buf[..len])?;
        Ok(())
    }

    /// Send `packet` and require a response of type `expected`.
    fn transact(&mut self, packet: &Packet, expected: DiagCommand) -> Result<Packet> {
        self.send_packet(packet)?;
        let response = self.receive_packet()?;

        if response.kind() == u16::from(DiagCommand::RspError) {
            let payload = response.into_payload();
            warn!(request = %command_name(packet.kind()), "Device returned RSP_ERROR");
            return Err(ProtocolError::DeviceError { payload }.into());
        }
        if response.kind() != u16::from(expected) {
            return Err(ProtocolError::UnexpectedResponse {
                expected: expected.into(),
                actual: response.kind(),
            }
            .into());
        }
        Ok(response)
    }
}

/// Payload of `packet`, which must be exactly `len` bytes.
fn expect_len(packet: &Packet, len: usize) -> Result<Vec<u8>> {
    let actual = packet.payload_len();
    if actual != len {
        return Err(ProtocolError::PayloadLength {
            expected: len,
            actual,
        }
        .into());
    }
    Ok(packet.payload().unwrap_or_default().to_vec())
}

fn command_name(kind: u16) -> String {
    match DiagCommand::from_u16(kind) {
        Some(cmd) => cmd.to_string(),
        None => format!("0x{:04X}", kind),
    }
}

impl<T: UsbTransport> ProtocolClient for SocratesClient<T> {
    type Transport = T;

    const NAME: &'static str = "Socrates";

    fn transport(&self) -> &T {
        &self.transport
    }

    fn into_transport(self) -> T {
        self.transport
    }

    fn receive_packet(&mut self) -> Result<Packet> {
        self.receive_packet_timeout(self.timeout)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transport::{MockTransport, TransportError};

    /// Encode a Socrates frame.
    pub(crate) fn diag_frame(kind: impl Into<u16>, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; DIAG_HEADER_SIZE];
        BigEndian::write_u16(&mut out[0..2], kind.into());
        BigEndian::write_u16(&mut out[2..4], payload.len() as u16);
        out.extend_from_slice(payload);
        out
    }

    pub(crate) fn client(mock: &MockTransport) -> SocratesClient<MockTransport> {
        SocratesClient::new(mock.clone()).with_retry_policy(RetryPolicy::none())
    }

    #[test]
    fn test_version() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(DiagCommand::RspOk, b"BROM\0\x03"));
        let mut soc = client(&mock);

        let version = soc.version().unwrap();
        assert_eq!(version.name, "BROM");
        assert_eq!(version.number, 3);
        assert_eq!(mock.get_writes(), vec![vec![0x00, 0x00, 0x00, 0x00]]);
    }

    #[test]
    fn test_version_parse_errors() {
        assert!(SocratesVersion::parse(b"B").is_err());
        assert!(SocratesVersion::parse(b"BROM").is_err());
        assert!(SocratesVersion::parse(b"BROM\0").is_err());
        assert_eq!(
            SocratesVersion::parse(b"\0\x01").unwrap(),
            SocratesVersion {
                name: String::new(),
                number: 1
            }
        );
    }

    #[test]
    fn test_version_rejects_rsp_version() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(DiagCommand::RspVersion, b"BROM\0\x03"));
        let mut soc = client(&mock);
        assert!(matches!(
            soc.version(),
            Err(Error::Protocol(ProtocolError::UnexpectedResponse {
                expected: 0x8000,
                actual: 0x8002
            }))
        ));
    }

    #[test]
    fn test_two_phase_receive() {
        let mock = MockTransport::new();
        let frame = diag_frame(DiagCommand::RspRead32, &[0xDE, 0xAD, 0xBE, 0xEF]);
        mock.queue_read(&frame[..4]);
        mock.queue_read(&frame[4..]);
        let mut soc = client(&mock);

        assert_eq!(soc.read32(0x1000).unwrap(), 0xDEADBEEF);
        assert_eq!(mock.read_requests(), vec![1024, 1020]);
        assert_eq!(mock.read_timeouts(), vec![DIAG_DEFAULT_TIMEOUT; 2]);
    }

    #[test]
    fn test_partial_header() {
        let mock = MockTransport::new();
        mock.queue_chunked(&diag_frame(DiagCommand::RspOk, &[]), 1);
        let mut soc = client(&mock);
        let packet = soc.receive_packet().unwrap();
        assert_eq!(packet.kind(), 0x8000);
        assert_eq!(packet.payload(), None);
    }

    #[test]
    fn test_leftover_bytes_stay_buffered() {
        let mock = MockTransport::new();
        let mut both = diag_frame(DiagCommand::RspRead8, &[0x11]);
        both.extend(diag_frame(DiagCommand::RspRead8, &[0x22]));
        mock.queue_read(&both);
        let mut soc = client(&mock);

        assert_eq!(soc.read8(0).unwrap(), 0x11);
        assert_eq!(soc.read8(1).unwrap(), 0x22);
        assert_eq!(mock.read_requests().len(), 1);
    }

    #[test]
    fn test_oversized_declared_length() {
        let mock = MockTransport::new();
        mock.queue_read(&[0x80, 0x00, 0x04, 0x00]);
        let mut soc = client(&mock);
        assert!(matches!(
            soc.receive_packet(),
            Err(Error::Framing(FramingError::FrameTooLarge { max: 1024 }))
        ));
    }

    #[test]
    fn test_read_request_layout() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(DiagCommand::RspRead16, &[0x12, 0x34]));
        let mut soc = client(&mock);

        assert_eq!(soc.read16(0x0123_4567_89AB_CDEF).unwrap(), 0x1234);
        assert_eq!(
            mock.get_writes()[0],
            vec![0x00, 0x03, 0x00, 0x08, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF]
        );
    }

    #[test]
    fn test_read64() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(
            DiagCommand::RspRead64,
            &[1, 2, 3, 4, 5, 6, 7, 8],
        ));
        let mut soc = client(&mock);
        assert_eq!(soc.read64(0).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_read_wrong_length() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(DiagCommand::RspRead32, &[0x00, 0x01]));
        let mut soc = client(&mock);
        assert!(matches!(
            soc.read32(0),
            Err(Error::Protocol(ProtocolError::PayloadLength {
                expected: 4,
                actual: 2
            }))
        ));
    }

    #[test]
    fn test_read_wrong_width_response() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(DiagCommand::RspRead8, &[0x01]));
        let mut soc = client(&mock);
        assert!(matches!(
            soc.read16(0),
            Err(Error::Protocol(ProtocolError::UnexpectedResponse { .. }))
        ));
    }

    #[test]
    fn test_write_layout() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(DiagCommand::RspOk, &[]));
        mock.queue_read(&diag_frame(DiagCommand::RspOk, &[]));
        let mut soc = client(&mock);

        soc.write8(0x20, 0xAB).unwrap();
        soc.write32(0x40, 0x1122_3344).unwrap();

        let writes = mock.get_writes();
        assert_eq!(
            writes[0],
            vec![0x00, 0x02, 0x00, 0x09, 0, 0, 0, 0, 0, 0, 0, 0x20, 0xAB]
        );
        assert_eq!(
            writes[1],
            vec![0x00, 0x06, 0x00, 0x0C, 0, 0, 0, 0, 0, 0, 0, 0x40, 0x11, 0x22, 0x33, 0x44]
        );
    }

    #[test]
    fn test_write_truncates_to_width() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(DiagCommand::RspOk, &[]));
        let mut soc = client(&mock);

        soc.write(Width::W16, 0, 0x1_2345).unwrap();
        assert_eq!(mock.get_writes()[0][12..], [0x23, 0x45]);
    }

    #[test]
    fn test_rsp_error_maps_to_device_error() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(DiagCommand::RspError, &[0x05]));
        let mut soc = client(&mock);

        match soc.write64(0, 1) {
            Err(Error::Protocol(ProtocolError::DeviceError { payload })) => {
                assert_eq!(payload, vec![0x05]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_timeout_threaded_into_reads() {
        let mock = MockTransport::new();
        let mut soc = client(&mock).with_timeout(Duration::from_millis(20));
        assert!(matches!(
            soc.version(),
            Err(Error::Transport(TransportError::Timeout { .. }))
        ));
        assert_eq!(mock.read_timeouts(), vec![Duration::from_millis(20)]);
    }
}
