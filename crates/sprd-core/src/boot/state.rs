//! BootROM handshake progress.

use std::fmt;

/// Where a BootROM session stands.
///
/// `Disconnected → HelloOk → Connected → Loaded → Executing`. Connect is
/// optional. Any failure drops back to `Disconnected`; nothing resumes on
/// its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// No handshake yet, or the last one failed.
    #[default]
    Disconnected,
    /// BootROM answered the hello flag.
    HelloOk,
    /// Connect acknowledged.
    Connected,
    /// A payload was uploaded.
    Loaded,
    /// Return address overwritten; the device is running the payload.
    Executing,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeState::Disconnected => write!(f, "DISCONNECTED"),
            HandshakeState::HelloOk => write!(f, "HELLO_OK"),
            HandshakeState::Connected => write!(f, "CONNECTED"),
            HandshakeState::Loaded => write!(f, "LOADED"),
            HandshakeState::Executing => write!(f, "EXECUTING"),
        }
    }
}

impl HandshakeState {
    /// Whether the BootROM has answered in this session.
    pub fn is_alive(&self) -> bool {
        !matches!(self, HandshakeState::Disconnected)
    }
}
