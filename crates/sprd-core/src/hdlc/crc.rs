//! BootROM frame checksum.
//!
//! Bit-serial CRC-16 with polynomial 0x1021 and a zero seed, processed MSB
//! first. The shift-then-inject formulation used by the BootROM yields the
//! same values as CRC-16/XMODEM.

const CRC_16_POLYNOMIAL: u16 = 0x1021;
const CRC_16_HIGH_BIT: u16 = 0x8000;

/// Checksum over canonical (unescaped) frame bytes.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &byte| update(crc, byte))
}

fn update(mut crc: u16, byte: u8) -> u16 {
    let mut mask: u8 = 0x80;
    while mask != 0 {
        let carry = crc & CRC_16_HIGH_BIT != 0;
        crc <<= 1;
        if carry {
            crc ^= CRC_16_POLYNOMIAL;
        }
        if byte & mask != 0 {
            crc ^= CRC_16_POLYNOMIAL;
        }
        mask >>= 1;
    }
    crc
}
