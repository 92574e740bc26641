//! Socrates message type tags.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DiagCommand {
    ReqVersion = 0x0000,
    ReqRead8 = 0x0001,
    ReqWrite8 = 0x0002,
    ReqRead16 = 0x0003,
    ReqWrite16 = 0x0004,
    ReqRead32 = 0x0005,
    ReqWrite32 = 0x0006,
    ReqRead64 = 0x0007,
    ReqWrite64 = 0x0008,
    ReqMmcInit = 0x0009,
    ReqMmcSwitch = 0x000A,
    ReqMmcGetSecCount = 0x000B,
    ReqMmcReadSingleBlock = 0x000C,
    ReqMmcWriteBlock = 0x000D,

    RspOk = 0x8000,
    RspError = 0x8001,
    RspVersion = 0x8002,
    RspRead8 = 0x8003,
    RspRead16 = 0x8004,
    RspRead32 = 0x8005,
    RspRead64 = 0x8006,
    RspMmcGetSecCount = 0x8007,
    RspMmcReadSingleBlock = 0x8008,
}

const ALL: [DiagCommand; 23] = [
    DiagCommand::ReqVersion,
    DiagCommand::ReqRead8,
    DiagCommand::ReqWrite8,
    DiagCommand::ReqRead16,
    DiagCommand::ReqWrite16,
    DiagCommand::ReqRead32,
    DiagCommand::ReqWrite32,
    DiagCommand::ReqRead64,
    DiagCommand::ReqWrite64,
    DiagCommand::ReqMmcInit,
    DiagCommand::ReqMmcSwitch,
    DiagCommand::ReqMmcGetSecCount,
    DiagCommand::ReqMmcReadSingleBlock,
    DiagCommand::ReqMmcWriteBlock,
    DiagCommand::RspOk,
    DiagCommand::RspError,
    DiagCommand::RspVersion,
    DiagCommand::RspRead8,
    DiagCommand::RspRead16,
    DiagCommand::RspRead32,
    DiagCommand::RspRead64,
    DiagCommand::RspMmcGetSecCount,
    DiagCommand::RspMmcReadSingleBlock,
];

impl DiagCommand {
    pub fn from_u16(value: u16) -> Option<Self> {
        ALL.iter().copied().find(|cmd| *cmd as u16 == value)
    }
}

impl From<DiagCommand> for u16 {
    fn from(cmd: DiagCommand) -> Self {
        cmd as u16
    }
}

impl fmt::Display for DiagCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagCommand::ReqVersion => "REQ_VERSION",
            DiagCommand::ReqRead8 => "REQ_READ_8",
            DiagCommand::ReqWrite8 => "REQ_WRITE_8",
            DiagCommand::ReqRead16 => "REQ_READ_16",
            DiagCommand::ReqWrite16 => "REQ_WRITE_16",
            DiagCommand::ReqRead32 => "REQ_READ_32",
            DiagCommand::ReqWrite32 => "REQ_WRITE_32",
            DiagCommand::ReqRead64 => "REQ_READ_64",
            DiagCommand::ReqWrite64 => "REQ_WRITE_64",
            DiagCommand::ReqMmcInit => "REQ_MMC_INIT",
            DiagCommand::ReqMmcSwitch => "REQ_MMC_SWITCH",
            DiagCommand::ReqMmcGetSecCount => "REQ_MMC_GET_SEC_COUNT",
            DiagCommand::ReqMmcReadSingleBlock => "REQ_MMC_READ_SINGLE_BLOCK",
            DiagCommand::ReqMmcWriteBlock => "REQ_MMC_WRITE_BLOCK",
            DiagCommand::RspOk => "RSP_OK",
            DiagCommand::RspError => "RSP_ERROR",
            DiagCommand::RspVersion => "RSP_VERSION",
            DiagCommand::RspRead8 => "RSP_READ_8",
            DiagCommand::RspRead16 => "RSP_READ_16",
            DiagCommand::RspRead32 => "RSP_READ_32",
            DiagCommand::RspRead64 => "RSP_READ_64",
            DiagCommand::RspMmcGetSecCount => "RSP_MMC_GET_SEC_COUNT",
            DiagCommand::RspMmcReadSingleBlock => "RSP_MMC_READ_SINGLE_BLOCK",
        };
        write!(f, "{}", name)
    }
}

/// Access width of a register read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
}

impl Width {
    pub fn bytes(self) -> usize {
        match self {
            Width::W8 => 1,
            Width::W16 => 2,
            Width::W32 => 4,
            Width::W64 => 8,
        }
    }

    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Width::W8),
            16 => Some(Width::W16),
            32 => Some(Width::W32),
            64 => Some(Width::W64),
            _ => None,
        }
    }

    pub(crate) fn read_request(self) -> DiagCommand {
        match self {
            Width::W8 => DiagCommand::ReqRead8,
            Width::W16 => DiagCommand::ReqRead16,
            Width::W32 => DiagCommand::ReqRead32,
            Width::W64 => DiagCommand::ReqRead64,
        }
    }

    pub(crate) fn read_response(self) -> DiagCommand {
        match self {
            Width::W8 => DiagCommand::RspRead8,
            Width::W16 => DiagCommand::RspRead16,
            Width::W32 => DiagCommand::RspRead32,
            Width::W64 => DiagCommand::RspRead64,
        }
    }

    pub(crate) fn write_request(self) -> DiagCommand {
        match self {
            Width::W8 => DiagCommand::ReqWrite8,
            Width::W16 => DiagCommand::ReqWrite16,
            Width::W32 => DiagCommand::ReqWrite32,
            Width::W64 => DiagCommand::ReqWrite64,
        }
    }

    /// Largest value representable at this width.
    pub fn max_value(self) -> u64 {
        match self {
            Width::W64 => u64::MAX,
            w => (1u64 << w.bits()) - 1,
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_interleave_by_width() {
        assert_eq!(u16::from(Width::W8.read_request()), 0x0001);
        assert_eq!(u16::from(Width::W8.write_request()), 0x0002);
        assert_eq!(u16::from(Width::W64.read_request()), 0x0007);
        assert_eq!(u16::from(Width::W64.write_request()), 0x0008);
        assert_eq!(u16::from(Width::W16.read_response()), 0x8004);
        assert_eq!(u16::from(Width::W64.read_response()), 0x8006);
    }

    #[test]
    fn test_from_u16() {
        for cmd in ALL {
            assert_eq!(DiagCommand::from_u16(cmd.into()), Some(cmd));
        }
        assert_eq!(DiagCommand::from_u16(0x000E), None);
        assert_eq!(DiagCommand::from_u16(0x8009), None);
    }

    #[test]
    fn test_width() {
        assert_eq!(Width::from_bits(32), Some(Width::W32));
        assert_eq!(Width::from_bits(24), None);
        assert_eq!(Width::W16.max_value(), 0xFFFF);
        assert_eq!(Width::W64.max_value(), u64::MAX);
        assert_eq!(Width::W8.to_string(), "8");
    }
}
