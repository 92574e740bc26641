//! Event system for UI decoupling.
//!
//! Lets a CLI or GUI follow a loader session and show status text without
//! touching framing or transport code.

use std::fmt;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Loader session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for device connection.
    WaitingForDevice,
    /// Mode switch and Socrates detection.
    Setup,
    /// BootROM hello/connect.
    Handshake,
    /// Payload upload in progress.
    Upload,
    /// Overwriting the return address.
    Jump,
    /// All operations complete.
    Complete,
    /// Error state.
    Error,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::WaitingForDevice => write!(f, "Waiting for Device"),
            SessionPhase::Setup => write!(f, "Setup"),
            SessionPhase::Handshake => write!(f, "Handshake"),
            SessionPhase::Upload => write!(f, "Upload"),
            SessionPhase::Jump => write!(f, "Jump"),
            SessionPhase::Complete => write!(f, "Complete"),
            SessionPhase::Error => write!(f, "Error"),
        }
    }
}

/// Events emitted by a loader session.
#[derive(Debug, Clone)]
pub enum SprdEvent {
    /// Device connected.
    DeviceConnected { vid: u16, pid: u16 },
    /// Phase changed.
    PhaseChanged { from: SessionPhase, to: SessionPhase },
    /// Progress update for current operation.
    Progress {
        phase: SessionPhase,
        operation: String,
        current: u64,
        total: u64,
    },
    /// Human-readable status line.
    Log { level: LogLevel, message: String },
    /// Version string reported by the BootROM or Socrates agent.
    VersionReceived { version: String },
    /// Error occurred.
    Error { message: String },
    /// USB Packet sent/received.
    Packet {
        direction: PacketDirection,
        length: usize,
        data: Option<Vec<u8>>,
    },
    /// All operations completed successfully.
    Complete,
}

/// USB packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Transmit (Host -> Device)
    Rx, // Receive (Device -> Host)
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait SprdObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &SprdEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl SprdObserver for NullObserver {
    fn on_event(&self, _event: &SprdEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl SprdObserver for TracingObserver {
    fn on_event(&self, event: &SprdEvent) {
        match event {
            SprdEvent::DeviceConnected { vid, pid } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), "Device connected");
            }
            SprdEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            SprdEvent::Progress {
                phase,
                operation,
                current,
                total,
            } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    0
                };
                tracing::debug!(phase = %phase, operation = %operation, progress = %format!("{}%", pct), "Progress");
            }
            SprdEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            SprdEvent::VersionReceived { version } => {
                tracing::info!(version = %version, "Version received");
            }
            SprdEvent::Error { message } => {
                tracing::error!("Error: {}", message);
            }
            SprdEvent::Packet {
                direction, length, ..
            } => {
                tracing::trace!(dir = %direction, len = length, "USB Packet");
            }
            SprdEvent::Complete => {
                tracing::info!("Operation complete");
            }
        }
    }
}

/// Observer that records events, for tests and UIs that poll.
#[derive(Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<SprdEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything observed so far.
    pub fn events(&self) -> Vec<SprdEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

impl SprdObserver for RecordingObserver {
    fn on_event(&self, event: &SprdEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
