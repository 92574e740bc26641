//! Loader session - high-level orchestrator for bootstrapping a payload.
//!
//! Waits for the device, optionally checks whether a Socrates agent is
//! already running, then performs the BootROM hello, upload and jump.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::boot::BootRomClient;
use crate::chip::ChipFamily;
use crate::client::ProtocolClient;
use crate::diag::{SocratesClient, SocratesVersion};
use crate::events::{LogLevel, SessionPhase, SprdEvent, SprdObserver, TracingObserver};
use crate::protocol::constants::{
    BOOTROM_VERSION_SPRD3, DEFAULT_JUMP_OFFSET, DEFAULT_LOAD_ADDRESS,
};
use crate::retry::RetryPolicy;
use crate::transport::{NusbTransport, ObservableTransport, TransportError, UsbTransport};

/// Configuration for a loader session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// SoC family, for logs only.
    pub family: Option<ChipFamily>,
    /// Path to the payload binary.
    pub payload_path: Option<String>,
    /// Where the payload is uploaded.
    pub load_address: u32,
    /// Entry point offset from `load_address`.
    pub jump_offset: u32,
    /// Explicit entry point, overriding `load_address + jump_offset`.
    pub jump_target: Option<u32>,
    /// Stack slot holding the BootROM return address. Without it the
    /// payload is uploaded but not started.
    pub stack_slot_address: Option<u32>,
    /// Write a 64-bit return address.
    pub is_64bit: bool,
    /// Abort unless the hello reply matches.
    pub expected_version: Option<String>,
    /// Send `CMD_CONNECT` after the hello.
    pub send_connect: bool,
    /// Issue the vendor mode-switch control request after opening.
    pub mode_switch: bool,
    /// Try Socrates before the BootROM hello.
    pub detect_socrates: bool,
    /// How long to wait for the device to enumerate.
    pub wait_timeout_secs: u64,
    /// Socrates per-read timeout in milliseconds.
    pub diag_timeout_ms: u64,
    /// Retry policy for soft read failures.
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            family: None,
            payload_path: None,
            load_address: DEFAULT_LOAD_ADDRESS,
            jump_offset: DEFAULT_JUMP_OFFSET,
            jump_target: None,
            stack_slot_address: None,
            is_64bit: false,
            expected_version: Some(BOOTROM_VERSION_SPRD3.to_string()),
            send_connect: true,
            mode_switch: false,
            detect_socrates: false,
            wait_timeout_secs: 30,
            diag_timeout_ms: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: SessionConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Address execution continues at after the jump.
    pub fn jump_target(&self) -> u32 {
        self.jump_target
            .unwrap_or_else(|| self.load_address.wrapping_add(self.jump_offset))
    }

    pub fn diag_timeout(&self) -> Duration {
        Duration::from_millis(self.diag_timeout_ms)
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A Socrates agent already answered; nothing was uploaded.
    SocratesRunning(SocratesVersion),
    /// Payload uploaded but not started (no stack slot configured).
    Loaded { bootrom_version: String, bytes: usize },
    /// Payload uploaded and the BootROM redirected into it.
    Started {
        bootrom_version: String,
        bytes: usize,
        target: u32,
    },
}

/// Loader session - orchestrates one bootstrap run.
pub struct LoaderSession<O: SprdObserver> {
    config: SessionConfig,
    observer: Arc<O>,
}

impl LoaderSession<TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: SprdObserver + 'static> LoaderSession<O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, observer: Arc<O>) -> Self {
        Self { config, observer }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Read the payload, wait for the device and run the session on it.
    #[instrument(skip(self))]
    pub fn run(&self) -> Result<SessionOutcome> {
        let path = self
            .config
            .payload_path
            .as_deref()
            .ok_or_else(|| anyhow!("No payload configured"))?;
        info!(path = %path, "Loading payload");
        let payload =
            std::fs::read(path).with_context(|| format!("Failed to read payload {}", path))?;

        self.log(LogLevel::Info, "Waiting for device");
        let transport = self.wait_for_device()?;
        self.run_on(transport, &payload)
    }

    /// Poll until a device in download mode can be opened.
    pub fn wait_for_device(&self) -> Result<NusbTransport> {
        info!("Waiting for device...");
        let timeout = Duration::from_secs(self.config.wait_timeout_secs);
        let start = Instant::now();
        let mut poll_count = 0u64;

        loop {
            poll_count += 1;

            match NusbTransport::open() {
                Ok(t) => {
                    info!(
                        vid = format!("{:04X}", t.vendor_id()),
                        pid = format!("{:04X}", t.product_id()),
                        selection = %t.selection(),
                        "Device found after {} polls",
                        poll_count
                    );
                    return Ok(t);
                }
                Err(TransportError::DeviceNotFound { .. }) => {
                    if start.elapsed() > timeout {
                        return Err(anyhow!(
                            "Timeout waiting for device after {}s",
                            timeout.as_secs()
                        ));
                    }
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Run the session on an already-open transport.
    pub fn run_on<T: UsbTransport>(&self, transport: T, payload: &[u8]) -> Result<SessionOutcome> {
        self.observer.on_event(&SprdEvent::DeviceConnected {
            vid: transport.vendor_id(),
            pid: transport.product_id(),
        });
        let transport = ObservableTransport::new(transport, self.observer.clone());
        let mut phase = SessionPhase::WaitingForDevice;

        match self.drive(transport, payload, &mut phase) {
            Ok(outcome) => {
                self.enter(&mut phase, SessionPhase::Complete);
                self.observer.on_event(&SprdEvent::Complete);
                Ok(outcome)
            }
            Err(e) => {
                self.observer.on_event(&SprdEvent::Error {
                    message: format!("{:#}", e),
                });
                self.enter(&mut phase, SessionPhase::Error);
                Err(e)
            }
        }
    }

    fn drive<T: UsbTransport>(
        &self,
        mut transport: T,
        payload: &[u8],
        phase: &mut SessionPhase,
    ) -> Result<SessionOutcome> {
        let config = &self.config;
        if let Some(family) = config.family {
            info!(family = %family, "Target family");
        }

        self.enter(phase, SessionPhase::Setup);
        if config.mode_switch {
            transport.mode_switch().context("Mode switch failed")?;
            self.log(LogLevel::Info, "Mode switch request sent");
        }

        if config.detect_socrates {
            let mut socrates = SocratesClient::new(transport)
                .with_retry_policy(config.retry)
                .with_timeout(config.diag_timeout());
            match socrates.version() {
                Ok(version) => {
                    self.observer.on_event(&SprdEvent::VersionReceived {
                        version: version.to_string(),
                    });
                    self.log(LogLevel::Info, "Socrates already running, skipping load");
                    return Ok(SessionOutcome::SocratesRunning(version));
                }
                Err(e) => {
                    debug!(error = %e, "No Socrates agent");
                    self.log(LogLevel::Info, "Not in Socrates mode");
                }
            }
            transport = socrates.into_transport();
        }

        self.enter(phase, SessionPhase::Handshake);
        let mut rom = BootRomClient::new(transport).with_retry_policy(config.retry);

        let version = rom.send_hello().context("BootROM hello failed")?;
        self.observer.on_event(&SprdEvent::VersionReceived {
            version: version.clone(),
        });
        if let Some(expected) = &config.expected_version
            && version != *expected
        {
            bail!(
                "Unexpected BootROM version {:?} (expected {:?})",
                version,
                expected
            );
        }
        if config.send_connect {
            rom.send_connect().context("BootROM connect failed")?;
        }

        self.enter(phase, SessionPhase::Upload);
        info!(
            address = format!("0x{:08X}", config.load_address),
            bytes = payload.len(),
            "Sending payload"
        );
        let observer = self.observer.clone();
        rom.send_payload_with_progress(config.load_address, payload, |sent, total| {
            observer.on_event(&SprdEvent::Progress {
                phase: SessionPhase::Upload,
                operation: "payload".to_string(),
                current: sent as u64,
                total: total as u64,
            });
        })
        .context("Payload upload failed")?;

        let Some(stack_slot) = config.stack_slot_address else {
            warn!("No stack slot configured, payload left unstarted");
            return Ok(SessionOutcome::Loaded {
                bootrom_version: version,
                bytes: payload.len(),
            });
        };

        self.enter(phase, SessionPhase::Jump);
        let target = config.jump_target();
        rom.send_jump_to_payload(stack_slot, target, config.is_64bit)
            .context("Jump to payload failed")?;
        self.log(
            LogLevel::Info,
            &format!("Jumped to payload at 0x{:08X}", target),
        );

        Ok(SessionOutcome::Started {
            bootrom_version: version,
            bytes: payload.len(),
            target,
        })
    }

    fn enter(&self, phase: &mut SessionPhase, next: SessionPhase) {
        self.observer.on_event(&SprdEvent::PhaseChanged {
            from: *phase,
            to: next,
        });
        *phase = next;
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.observer.on_event(&SprdEvent::Log {
            level,
            message: message.to_string(),
        });
    }
}
