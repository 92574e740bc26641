//! HDLC-style framing used by the BootROM.
//!
//! ```text
//! +------+--------+--------+-----------+--------+------+
//! | FLAG |  Type  | Length |  Payload  | CRC16  | FLAG |
//! +------+--------+--------+-----------+--------+------+
//! |  1   | 2 (BE) | 2 (BE) |  Length   | 2 (BE) |  1   |
//! +------+--------+--------+-----------+--------+------+
//! ```
//!
//! FLAG (0x7E) and ESCAPE (0x7D) between the flags are sent as
//! `ESCAPE, byte ^ 0x20`. The CRC covers the unescaped type, length and
//! payload.

pub mod crc;
pub mod decoder;

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

pub use crc::crc16;
pub use decoder::{DecodeState, FrameDecoder};

use crate::protocol::Packet;
use crate::protocol::constants::{
    HDLC_CRC_SIZE, HDLC_ESCAPE, HDLC_ESCAPE_MASK, HDLC_FLAG, HDLC_HEADER_SIZE,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{received:04X}")]
    CrcMismatch { expected: u16, received: u16 },

    #[error("Frame truncated: {len} bytes between flags")]
    Truncated { len: usize },

    #[error("Length mismatch: header declares {declared} bytes, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },

    #[error("Input ended without a complete frame (decoder in {state})")]
    Incomplete { state: DecodeState },

    #[error("Payload of {len} bytes cannot be framed")]
    PayloadTooLarge { len: usize },
}

fn needs_escape(byte: u8) -> bool {
    byte == HDLC_FLAG || byte == HDLC_ESCAPE
}

/// Append the escaped form of `data` to `out`.
pub fn escape_into(data: &[u8], out: &mut Vec<u8>) {
    for &b in data {
        if needs_escape(b) {
            out.push(HDLC_ESCAPE);
            out.push(b ^ HDLC_ESCAPE_MASK);
        } else {
            out.push(b);
        }
    }
}

/// Encode `packet` into a complete wire frame.
pub fn encode(packet: &Packet) -> Result<Vec<u8>, FramingError> {
    let payload = packet.payload().unwrap_or_default();
    let len = u16::try_from(payload.len())
        .map_err(|_| FramingError::PayloadTooLarge { len: payload.len() })?;

    let mut canonical = vec![0u8; HDLC_HEADER_SIZE + payload.len() + HDLC_CRC_SIZE];
    BigEndian::write_u16(&mut canonical[0..2], packet.kind());
    BigEndian::write_u16(&mut canonical[2..4], len);
    canonical[HDLC_HEADER_SIZE..HDLC_HEADER_SIZE + payload.len()].copy_from_slice(payload);

    let body_end = HDLC_HEADER_SIZE + payload.len();
    let crc = crc16(&canonical[..body_end]);
    BigEndian::write_u16(&mut canonical[body_end..], crc);

    // Worst case every byte is escaped
    let mut frame = Vec::with_capacity(canonical.len() * 2 + 2);
    frame.push(HDLC_FLAG);
    escape_into(&canonical, &mut frame);
    frame.push(HDLC_FLAG);
    Ok(frame)
}

/// Decode the first frame in `input`.
///
/// Returns the packet and the number of bytes used, including any garbage
/// before the opening flag.
pub fn decode(input: &[u8]) -> Result<(Packet, usize), FramingError> {
    let mut decoder = FrameDecoder::new();
    let used = decoder.feed(input)?;
    Ok((decoder.finish()?, used))
}
