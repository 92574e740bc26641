//! USB Transport layer abstraction.
//!
//! Defines the `UsbTransport` trait for the bulk pipe to the BootROM,
//! allowing different implementations (nusb, mock, etc.).

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("No vendor interface with one bulk IN and one bulk OUT endpoint")]
    InterfaceNotFound,

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to select configuration {configuration}: {message}")]
    ConfigurationFailed { configuration: u8, message: String },

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Failed to select alternate setting {alt_setting} on interface {interface}: {message}")]
    AltSettingFailed {
        interface: u8,
        alt_setting: u8,
        message: String,
    },

    #[error("Control transfer failed: {0}")]
    ControlFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl TransportError {
    /// Whether a read that failed this way may succeed when tried again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout { .. } | TransportError::ReadFailed(_)
        )
    }
}

/// Abstract USB transport interface.
///
/// A transport is owned by exactly one protocol client at a time, hence
/// `&mut self` everywhere.
pub trait UsbTransport: Send {
    /// Write raw bytes to the OUT endpoint, returning the count written.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `max_len` bytes from the IN endpoint.
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError>;

    /// Read with a per-call timeout.
    fn read_timeout(
        &mut self,
        max_len: usize,
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.read(max_len)
    }

    /// Write all of `data`, failing if the device took fewer bytes.
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let written = self.write(data)?;
        if written != data.len() {
            return Err(TransportError::ShortWrite {
                expected: data.len(),
                written,
            });
        }
        Ok(())
    }

    /// Send the class request that drops the device out of an alternate
    /// protocol mode before BootROM commands.
    fn mode_switch(&mut self) -> Result<(), TransportError>;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}
