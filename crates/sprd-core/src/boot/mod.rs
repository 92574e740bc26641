//! BootROM download protocol client.
//!
//! Every request is an HDLC frame answered by exactly one frame, usually
//! `REP_ACK`. Uploads go start → midst* → end, each step gated by its ACK.
//! Jumping to a payload reuses the upload path to overwrite a return
//! address on the BootROM stack.

pub mod command;
pub mod state;

pub use command::BootCommand;
pub use state::HandshakeState;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tracing::{debug, info, instrument, warn};

use crate::buffer::ByteAccumulator;
use crate::client::{ProtocolClient, fill_from};
use crate::error::{ProtocolError, Result};
use crate::hdlc::{self, FrameDecoder};
use crate::protocol::Packet;
use crate::protocol::constants::{
    HDLC_DATA_MAX_SIZE, HDLC_FLAG, HDLC_FRAME_MAX_SIZE, MIDST_CHUNK_SIZE,
};
use crate::retry::RetryPolicy;
use crate::transport::UsbTransport;

/// Client for the BootROM loader protocol.
pub struct BootRomClient<T: UsbTransport> {
    transport: T,
    fifo: ByteAccumulator,
    retry: RetryPolicy,
    state: HandshakeState,
}

impl<T: UsbTransport> BootRomClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            fifo: ByteAccumulator::new(HDLC_FRAME_MAX_SIZE),
            retry: RetryPolicy::default(),
            state: HandshakeState::Disconnected,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Send a bare flag byte and return the BootROM version string.
    #[instrument(skip(self))]
    pub fn send_hello(&mut self) -> Result<String> {
        let res = self.hello();
        self.track(res, Some(HandshakeState::HelloOk))
    }

    fn hello(&mut self) -> Result<String> {
        self.transport.write_all(&[HDLC_FLAG])?;
        let packet = self.expect(BootCommand::Version)?;
        let payload = packet.payload().ok_or(ProtocolError::MissingPayload {
            kind: packet.kind(),
        })?;

        // Trailing NUL
        let text = &payload[..payload.len() - 1];
        let version = String::from_utf8_lossy(text).into_owned();
        info!(version = %version, "BootROM version");
        Ok(version)
    }

    #[instrument(skip(self))]
    pub fn send_connect(&mut self) -> Result<()> {
        let res = self.request(&Packet::new(BootCommand::Connect));
        self.track(res, Some(HandshakeState::Connected))
    }

    /// Announce an upload of `length` bytes to `address`.
    #[instrument(skip(self), fields(address = format!("0x{:08X}", address)))]
    pub fn send_start_data(&mut self, address: u32, length: u32) -> Result<()> {
        let mut payload = [0u8; 8];
        BigEndian::write_u32(&mut payload[0..4], address);
        BigEndian::write_u32(&mut payload[4..8], length);
        let res = self.request(&Packet::with_payload(BootCommand::StartData, payload));
        self.track(res, None)
    }

    /// Send one chunk of upload data.
    #[instrument(skip(self, chunk), fields(len = chunk.len()))]
    pub fn send_midst_data(&mut self, chunk: &[u8]) -> Result<()> {
        let res = if chunk.len() > HDLC_DATA_MAX_SIZE {
            Err(ProtocolError::PayloadTooLarge {
                len: chunk.len(),
                max: HDLC_DATA_MAX_SIZE,
            }
            .into())
        } else {
            self.request(&Packet::with_payload(BootCommand::MidstData, chunk))
        };
        self.track(res, None)
    }

    #[instrument(skip(self))]
    pub fn send_end_data(&mut self) -> Result<()> {
        let res = self.request(&Packet::new(BootCommand::EndData));
        self.track(res, None)
    }

    /// Ask the BootROM to execute code at `address`.
    #[instrument(skip(self), fields(address = format!("0x{:08X}", address)))]
    pub fn send_exec_data(&mut self, address: u32) -> Result<()> {
        let mut payload = [0u8; 4];
        BigEndian::write_u32(&mut payload, address);
        let res = self.request(&Packet::with_payload(BootCommand::ExecData, payload));
        self.track(res, Some(HandshakeState::Executing))
    }

    /// Upload `data` to `address` in ACK-gated chunks.
    pub fn send_payload(&mut self, address: u32, data: &[u8]) -> Result<()> {
        self.send_payload_with_progress(address, data, |_, _| {})
    }

    /// Like `send_payload`, calling `progress(sent, total)` after each chunk.
    #[instrument(skip(self, data, progress), fields(address = format!("0x{:08X}", address), len = data.len()))]
    pub fn send_payload_with_progress<F>(
        &mut self,
        address: u32,
        data: &[u8],
        mut progress: F,
    ) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        let length = match u32::try_from(data.len()) {
            Ok(len) => len,
            Err(_) => {
                let err = ProtocolError::PayloadTooLarge {
                    len: data.len(),
                    max: u32::MAX as usize,
                };
                return self.track(Err(err.into()), None);
            }
        };

        self.send_start_data(address, length)?;

        let total = data.len();
        let mut sent = 0;
        for chunk in data.chunks(MIDST_CHUNK_SIZE) {
            self.send_midst_data(chunk)?;
            sent += chunk.len();
            progress(sent, total);
        }

        self.send_end_data()?;
        info!(bytes = total, "Payload uploaded");
        self.state = HandshakeState::Loaded;
        Ok(())
    }

    /// Overwrite the return address at `stack_slot` with `target`.
    ///
    /// When the BootROM's current call returns, execution continues at
    /// `target`. The address is written little-endian; in 64-bit mode the
    /// high word is zero.
    #[instrument(skip(self), fields(
        stack_slot = format!("0x{:08X}", stack_slot),
        target = format!("0x{:08X}", target),
    ))]
    pub fn send_jump_to_payload(
        &mut self,
        stack_slot: u32,
        target: u32,
        is_64bit: bool,
    ) -> Result<()> {
        let mut slot = [0u8; 8];
        LittleEndian::write_u32(&mut slot[0..4], target);
        let slot = if is_64bit { &slot[..] } else { &slot[..4] };

        self.send_start_data(stack_slot, slot.len() as u32)?;
        self.send_midst_data(slot)?;

        info!("Return address overwritten");
        self.state = HandshakeState::Executing;
        Ok(())
    }

    fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        let frame = hdlc::encode(packet)?;
        debug!(
            kind = %command_name(packet.kind()),
            payload = packet.payload_len(),
            frame = frame.len(),
            "Sending frame"
        );
        self.transport.write_all(&frame)?;
        Ok(())
    }

    /// Send `packet` and wait for `REP_ACK`.
    fn request(&mut self, packet: &Packet) -> Result<()> {
        self.send_packet(packet)?;
        self.expect(BootCommand::Ack)?;
        Ok(())
    }

    fn expect(&mut self, expected: BootCommand) -> Result<Packet> {
        let packet = self.receive_packet()?;
        if packet.kind() != u16::from(expected) {
            warn!(
                expected = %expected,
                actual = %command_name(packet.kind()),
                "Unexpected response"
            );
            return Err(ProtocolError::UnexpectedResponse {
                expected: expected.into(),
                actual: packet.kind(),
            }
            .into());
        }
        Ok(packet)
    }

    fn track<R>(&mut self, res: Result<R>, next: Option<HandshakeState>) -> Result<R> {
        match &res {
            Ok(_) => {
                if let Some(next) = next {
                    self.state = next;
                }
            }
            Err(e) => {
                if self.state.is_alive() {
                    warn!(error = %e, from = %self.state, "Handshake aborted");
                }
                if !self.fifo.is_empty() {
                    debug!(bytes = self.fifo.available(), "Dropping buffered bytes");
                    self.fifo.clear();
                }
                self.state = HandshakeState::Disconnected;
            }
        }
        res
    }
}

fn command_name(kind: u16) -> String {
    match BootCommand::from_u16(kind) {
        Some(cmd) => cmd.to_string(),
        None => format!("0x{:04X}", kind),
    }
}

impl<T: UsbTransport> ProtocolClient for BootRomClient<T> {
    type Transport = T;

    const NAME: &'static str = "BootROM";

    fn transport(&self) -> &T {
        &self.transport
    }

    fn into_transport(self) -> T {
        self.transport
    }

    /// Decode the next CRC-valid frame, reading more only when the
    /// accumulator is empty.
    fn receive_packet(&mut self) -> Result<Packet> {
        let mut decoder = FrameDecoder::new();
        loop {
            if self.fifo.is_empty() {
                fill_from(
                    Self::NAME,
                    &mut self.transport,
                    &mut self.fifo,
                    &self.retry,
                    None,
                )?;
            }

            let used = decoder.feed(self.fifo.peek(self.fifo.available())?)?;
            self.fifo.consume(used)?;

            if decoder.is_complete() {
                break;
            }
        }

        if decoder.discarded() > 0 {
            debug!(bytes = decoder.discarded(), "Skipped bytes before frame");
        }
        let packet = decoder.finish()?;
        debug!(kind = %command_name(packet.kind()), payload = packet.payload_len(), "Received frame");
        Ok(packet)
    }
}
