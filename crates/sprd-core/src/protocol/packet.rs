//! Protocol-neutral packet value shared by both wire formats.

use std::fmt;

/// A typed message exchanged with the device.
///
/// The tag is interpreted by the protocol that carries it (`BootCommand`
/// for BootROM frames, `DiagCommand` for Socrates frames). An empty
/// payload is the absent payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    kind: u16,
    payload: Vec<u8>,
}

impl Packet {
    /// Packet without payload.
    pub fn new(kind: impl Into<u16>) -> Self {
        Self {
            kind: kind.into(),
            payload: Vec::new(),
        }
    }

    /// Packet carrying `payload`.
    pub fn with_payload(kind: impl Into<u16>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    /// Raw type tag.
    pub fn kind(&self) -> u16 {
        self.kind
    }

    /// Payload bytes, `None` when the packet carries none.
    pub fn payload(&self) -> Option<&[u8]> {
        if self.payload.is_empty() {
            None
        } else {
            Some(&self.payload)
        }
    }

    /// Payload length (0 when absent).
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Consume the packet, returning its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packet(0x{:04X}, {} bytes)", self.kind, self.payload.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_is_absent() {
        let p = Packet::with_payload(0x80u16, Vec::new());
        assert_eq!(p.payload(), None);
        assert_eq!(p, Packet::new(0x80u16));
    }

    #[test]
    fn test_debug_format() {
        let p = Packet::with_payload(0x81u16, b"SPRD3\0".to_vec());
        assert_eq!(format!("{:?}", p), "Packet(0x0081, 6 bytes)");
    }
}
