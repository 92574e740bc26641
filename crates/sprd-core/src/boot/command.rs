//! BootROM frame type tags.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BootCommand {
    /// Connect (0x00).
    Connect = 0x00,
    /// Announce address and length of an upload (0x01).
    StartData = 0x01,
    /// One chunk of upload data (0x02).
    MidstData = 0x02,
    /// Upload finished (0x03).
    EndData = 0x03,
    /// Execute uploaded code (0x04).
    ExecData = 0x04,

    /// Acknowledge (0x80).
    Ack = 0x80,
    /// Version string, reply to the hello flag (0x81).
    Version = 0x81,
}

impl BootCommand {
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0x00 => Self::Connect,
            0x01 => Self::StartData,
            0x02 => Self::MidstData,
            0x03 => Self::EndData,
            0x04 => Self::ExecData,
            0x80 => Self::Ack,
            0x81 => Self::Version,
            _ => return None,
        })
    }
}

impl From<BootCommand> for u16 {
    fn from(cmd: BootCommand) -> Self {
        cmd as u16
    }
}

impl fmt::Display for BootCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootCommand::Connect => "CMD_CONNECT",
            BootCommand::StartData => "CMD_START_DATA",
            BootCommand::MidstData => "CMD_MIDST_DATA",
            BootCommand::EndData => "CMD_END_DATA",
            BootCommand::ExecData => "CMD_EXEC_DATA",
            BootCommand::Ack => "REP_ACK",
            BootCommand::Version => "REP_VER",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_values() {
        for cmd in [
            BootCommand::Connect,
            BootCommand::StartData,
            BootCommand::MidstData,
            BootCommand::EndData,
            BootCommand::ExecData,
            BootCommand::Ack,
            BootCommand::Version,
        ] {
            assert_eq!(BootCommand::from_u16(cmd.into()), Some(cmd));
        }
        assert_eq!(BootCommand::from_u16(0x82), None);
    }
}
