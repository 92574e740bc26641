//! sprd-core: Spreadtrum/Unisoc BootROM and Socrates protocols in Rust.
//!
//! This crate talks to a Unisoc SoC sitting in its USB BootROM download
//! mode: it frames BootROM requests, uploads a payload, redirects execution
//! into it and then speaks the Socrates diagnostic protocol to the running
//! payload for register and eMMC access.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Transport**: USB bulk pipe abstraction (nusb, mock, observable)
//! - **Buffer**: fixed-capacity receive accumulator
//! - **HDLC**: BootROM frame codec and incremental decoder
//! - **Boot**: BootROM client (hello, connect, upload, jump)
//! - **Diag**: Socrates client (version, register and MMC access)
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use sprd_core::session::{LoaderSession, SessionConfig};
//!
//! let config = SessionConfig {
//!     payload_path: Some("payload.bin".to_string()),
//!     stack_slot_address: Some(0x3F00),
//!     ..Default::default()
//! };
//!
//! let session = LoaderSession::new(config);
//! session.run().expect("Load failed");
//! ```

pub mod boot;
pub mod buffer;
pub mod chip;
pub mod client;
pub mod diag;
pub mod error;
pub mod events;
pub mod hdlc;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use boot::{BootCommand, BootRomClient, HandshakeState};
pub use buffer::{AccumulatorError, ByteAccumulator};
pub use chip::ChipFamily;
pub use client::ProtocolClient;
pub use diag::{DiagCommand, SocratesClient, SocratesVersion, Width};
pub use error::{Error, ProtocolError, Result};
pub use events::{
    LogLevel, NullObserver, SessionPhase, SprdEvent, SprdObserver, TracingObserver,
};
pub use hdlc::{FrameDecoder, FramingError};
pub use protocol::Packet;
pub use retry::RetryPolicy;
pub use session::{LoaderSession, SessionConfig, SessionOutcome};
pub use transport::{
    InterfaceSelection, MockTransport, NusbTransport, ObservableTransport, TransportError,
    UsbTransport,
};
