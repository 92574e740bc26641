//! Resumable HDLC frame decoder.
//!
//! The decoder is fed whatever the transport returned and reports how many
//! bytes it used. Callers consume exactly that many from their accumulator,
//! so bytes following a frame's closing flag stay buffered for the next one.

use byteorder::{BigEndian, ByteOrder};
use std::fmt;

use super::FramingError;
use super::crc::crc16;
use crate::protocol::Packet;
use crate::protocol::constants::{
    HDLC_CANONICAL_MAX_SIZE, HDLC_CRC_SIZE, HDLC_ESCAPE, HDLC_ESCAPE_MASK, HDLC_FLAG,
    HDLC_HEADER_SIZE,
};

/// Position of the decoder within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeState {
    /// Discarding bytes until an opening flag.
    #[default]
    Start,
    /// Inside a frame, copying bytes.
    Unescaped,
    /// Previous byte was an escape marker.
    Escaped,
    /// Closing flag seen.
    End,
}

impl fmt::Display for DecodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeState::Start => write!(f, "START"),
            DecodeState::Unescaped => write!(f, "UNESCAPED"),
            DecodeState::Escaped => write!(f, "ESCAPED"),
            DecodeState::End => write!(f, "END"),
        }
    }
}

/// Streaming decoder for a single frame.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    canonical: Vec<u8>,
    discarded: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Start,
            canonical: Vec::with_capacity(HDLC_CANONICAL_MAX_SIZE),
            discarded: 0,
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == DecodeState::End
    }

    /// Bytes skipped while hunting for the opening flag.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Advance over `input`, returning the number of bytes used.
    ///
    /// Stops right after the closing flag; anything past it is left to the
    /// caller. Once complete, further calls use nothing.
    pub fn feed(&mut self, input: &[u8]) -> Result<usize, FramingError> {
        let mut used = 0;
        for &byte in input {
            if self.state == DecodeState::End {
                break;
            }
            used += 1;
            match self.state {
                DecodeState::Start => {
                    if byte == HDLC_FLAG {
                        self.state = DecodeState::Unescaped;
                    } else {
                        self.discarded += 1;
                    }
                }
                DecodeState::Unescaped => match byte {
                    // Back-to-back flags are idle fill, not an empty frame
                    HDLC_FLAG if self.canonical.is_empty() => {}
                    HDLC_FLAG => self.state = DecodeState::End,
                    HDLC_ESCAPE => self.state = DecodeState::Escaped,
                    _ => self.push(byte)?,
                },
                DecodeState::Escaped => {
                    self.push(byte ^ HDLC_ESCAPE_MASK)?;
                    self.state = DecodeState::Unescaped;
                }
                DecodeState::End => unreachable!(),
            }
        }
        Ok(used)
    }

    /// Validate the collected bytes and build the packet.
    pub fn finish(self) -> Result<Packet, FramingError> {
        if self.state != DecodeState::End {
            return Err(FramingError::Incomplete { state: self.state });
        }
        parse_canonical(&self.canonical)
    }

    fn push(&mut self, byte: u8) -> Result<(), FramingError> {
        if self.canonical.len() >= HDLC_CANONICAL_MAX_SIZE {
            return Err(FramingError::FrameTooLarge {
                max: HDLC_CANONICAL_MAX_SIZE,
            });
        }
        self.canonical.push(byte);
        Ok(())
    }
}

/// Interpret `type|length|payload|crc` and check the CRC.
pub(crate) fn parse_canonical(bytes: &[u8]) -> Result<Packet, FramingError> {
    if bytes.len() < HDLC_HEADER_SIZE + HDLC_CRC_SIZE {
        return Err(FramingError::Truncated { len: bytes.len() });
    }

    let kind = BigEndian::read_u16(&bytes[0..2]);
    let declared = BigEndian::read_u16(&bytes[2..4]) as usize;
    let actual = bytes.len() - HDLC_HEADER_SIZE - HDLC_CRC_SIZE;
    if declared != actual {
        return Err(FramingError::LengthMismatch { declared, actual });
    }

    let body_end = HDLC_HEADER_SIZE + declared;
    let received = BigEndian::read_u16(&bytes[body_end..body_end + HDLC_CRC_SIZE]);
    let expected = crc16(&bytes[..body_end]);
    if received != expected {
        return Err(FramingError::CrcMismatch { expected, received });
    }

    Ok(Packet::with_payload(
        kind,
        bytes[HDLC_HEADER_SIZE..body_end].to_vec(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACK_FRAME: [u8; 8] = [0x7E, 0x00, 0x80, 0x00, 0x00, 0x3B, 0x5A, 0x7E];

    #[test]
    fn test_decode_ack() {
        let mut dec = FrameDecoder::new();
        assert_eq!(dec.feed(&ACK_FRAME).unwrap(), ACK_FRAME.len());
        assert!(dec.is_complete());

        let packet = dec.finish().unwrap();
        assert_eq!(packet.kind(), 0x80);
        assert_eq!(packet.payload(), None);
    }

    #[test]
    fn test_resume_across_feeds() {
        let mut dec = FrameDecoder::new();
        assert_eq!(dec.feed(&ACK_FRAME[..3]).unwrap(), 3);
        assert_eq!(dec.state(), DecodeState::Unescaped);
        assert_eq!(dec.feed(&ACK_FRAME[3..]).unwrap(), 5);
        assert_eq!(dec.finish().unwrap().kind(), 0x80);
    }

    #[test]
    fn test_stops_after_closing_flag() {
        let mut input = ACK_FRAME.to_vec();
        input.extend_from_slice(&[0x7E, 0x00, 0x81]);

        let mut dec = FrameDecoder::new();
        assert_eq!(dec.feed(&input).unwrap(), ACK_FRAME.len());
        assert_eq!(dec.feed(&input[ACK_FRAME.len()..]).unwrap(), 0);
    }

    #[test]
    fn test_skips_leading_garbage() {
        let mut input = vec![0x00, 0x11, 0x22];
        input.extend_from_slice(&ACK_FRAME);

        let mut dec = FrameDecoder::new();
        dec.feed(&input).unwrap();
        assert_eq!(dec.discarded(), 3);
        assert!(dec.finish().is_ok());
    }

    #[test]
    fn test_repeated_opening_flags() {
        let mut input = vec![0x7E, 0x7E];
        input.extend_from_slice(&ACK_FRAME);

        let mut dec = FrameDecoder::new();
        assert_eq!(dec.feed(&input).unwrap(), input.len());
        assert_eq!(dec.finish().unwrap().kind(), 0x80);
    }

    #[test]
    fn test_escaped_payload() {
        // REP_ACK carrying a single 0x7E byte
        let frame = [0x7E, 0x00, 0x80, 0x00, 0x01, 0x7D, 0x5E, 0x71, 0x50, 0x7E];
        let mut dec = FrameDecoder::new();
        dec.feed(&frame).unwrap();
        assert_eq!(dec.finish().unwrap().payload(), Some(&[0x7E][..]));
    }

    #[test]
    fn test_crc_mismatch() {
        let mut frame = ACK_FRAME;
        frame[6] ^= 0x01;
        let mut dec = FrameDecoder::new();
        dec.feed(&frame).unwrap();
        assert!(matches!(
            dec.finish(),
            Err(FramingError::CrcMismatch {
                expected: 0x3B5A,
                received: 0x3B5B
            })
        ));
    }

    #[test]
    fn test_length_mismatch() {
        // Claims 2 payload bytes, carries none
        let canonical = [0x00, 0x80, 0x00, 0x02, 0x00, 0x00];
        assert!(matches!(
            parse_canonical(&canonical),
            Err(FramingError::LengthMismatch {
                declared: 2,
                actual: 0
            })
        ));
    }

    #[test]
    fn test_truncated() {
        let mut dec = FrameDecoder::new();
        dec.feed(&[0x7E, 0x00, 0x80, 0x7E]).unwrap();
        assert!(matches!(
            dec.finish(),
            Err(FramingError::Truncated { len: 2 })
        ));
    }

    #[test]
    fn test_incomplete() {
        let mut dec = FrameDecoder::new();
        dec.feed(&ACK_FRAME[..5]).unwrap();
        assert!(matches!(
            dec.finish(),
            Err(FramingError::Incomplete {
                state: DecodeState::Unescaped
            })
        ));
    }

    #[test]
    fn test_oversized_frame() {
        let mut input = vec![0x7E];
        input.extend(std::iter::repeat_n(0x01, HDLC_CANONICAL_MAX_SIZE + 1));

        let mut dec = FrameDecoder::new();
        assert!(matches!(
            dec.feed(&input),
            Err(FramingError::FrameTooLarge { .. })
        ));
    }
}
