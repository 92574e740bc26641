//! nusb-based USB transport implementation.

use nusb::io::{EndpointRead, EndpointWrite};
use nusb::transfer::{Bulk, ControlOut, ControlType, In, Out, Recipient};
use nusb::{Device, Interface, MaybeFuture, list_devices};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::discovery::{
    AltSettingCandidate, EndpointDirection, InterfaceSelection, select_interface,
};
use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{
    CONTROL_TIMEOUT, MODE_SWITCH_INDEX, MODE_SWITCH_REQUEST, MODE_SWITCH_VALUE,
    SPRD_BOOT_PRODUCT_ID, SPRD_VENDOR_ID,
};

/// Transfer size for the endpoint reader/writer.
const TRANSFER_SIZE: usize = 4096;

/// Default wait for a bulk IN transfer.
pub const BULK_READ_TIMEOUT: Duration = Duration::from_millis(5000);

/// nusb-based USB transport.
///
/// Owns the claimed interface and both endpoint streams; dropping it
/// releases the interface.
pub struct NusbTransport {
    interface: Interface,
    reader: EndpointRead<Bulk>,
    writer: EndpointWrite<Bulk>,
    selection: InterfaceSelection,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// Open the first device in BootROM download mode.
    #[instrument(level = "info")]
    pub fn open() -> Result<Self, TransportError> {
        Self::open_with_ids(SPRD_VENDOR_ID, SPRD_BOOT_PRODUCT_ID)
    }

    /// Open a device with specific VID/PID.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let selection = select_interface(&Self::candidates(&device))
            .ok_or(TransportError::InterfaceNotFound)?;
        debug!(%selection, "Selected download interface");

        let interface = Self::acquire(&device, &selection)?;

        let reader = interface
            .endpoint::<Bulk, In>(selection.in_endpoint)
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .reader(TRANSFER_SIZE);
        let writer = interface
            .endpoint::<Bulk, Out>(selection.out_endpoint)
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .writer(TRANSFER_SIZE);

        info!(
            in_ep = %format!("0x{:02X}", selection.in_endpoint),
            out_ep = %format!("0x{:02X}", selection.out_endpoint),
            "Device opened successfully"
        );

        Ok(Self {
            interface,
            reader,
            writer,
            selection,
            vid,
            pid,
        })
    }

    /// Identifiers of the claimed interface.
    pub fn selection(&self) -> &InterfaceSelection {
        &self.selection
    }

    fn candidates(device: &Device) -> Vec<AltSettingCandidate> {
        let mut candidates = Vec::new();
        for config in device.configurations() {
            for iface in config.interfaces() {
                for alt in iface.alt_settings() {
                    let endpoints = alt
                        .endpoints()
                        .map(|ep| {
                            let dir = if ep.direction() == nusb::transfer::Direction::In {
                                EndpointDirection::In
                            } else {
                                EndpointDirection::Out
                            };
                            (ep.address(), dir)
                        })
                        .collect();
                    candidates.push(AltSettingCandidate {
                        configuration: config.configuration_value(),
                        interface: iface.interface_number(),
                        alt_setting: alt.alternate_setting(),
                        class: alt.class(),
                        endpoints,
                    });
                }
            }
        }
        candidates
    }

    /// Select configuration, claim the interface, select the alternate
    /// setting. A claimed interface is released again if a later step fails.
    fn acquire(device: &Device, sel: &InterfaceSelection) -> Result<Interface, TransportError> {
        let active = device
            .active_configuration()
            .map(|c| c.configuration_value())
            .ok();
        if active != Some(sel.configuration) {
            device
                .set_configuration(sel.configuration)
                .wait()
                .map_err(|e| TransportError::ConfigurationFailed {
                    configuration: sel.configuration,
                    message: e.to_string(),
                })?;
        }

        let interface = device.claim_interface(sel.interface).wait().map_err(|e| {
            TransportError::ClaimInterfaceFailed {
                interface: sel.interface,
                message: e.to_string(),
            }
        })?;

        if let Err(e) = interface.set_alt_setting(sel.alt_setting).wait() {
            warn!(interface = sel.interface, "Releasing interface after failed alt setting");
            drop(interface);
            return Err(TransportError::AltSettingFailed {
                interface: sel.interface,
                alt_setting: sel.alt_setting,
                message: e.to_string(),
            });
        }

        Ok(interface)
    }

    fn read_with(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.reader.set_read_timeout(timeout);

        let mut buf = vec![0u8; max_len];
        let n = self.reader.read(&mut buf).map_err(|e| {
            if e.kind() == ErrorKind::TimedOut {
                TransportError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
            } else {
                TransportError::ReadFailed(e.to_string())
            }
        })?;

        buf.truncate(n);
        debug!(bytes_read = n, "Read complete");
        Ok(buf)
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.writer
            .write_all(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        self.writer
            .flush()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        debug!(bytes_written = data.len(), "Write complete");
        Ok(data.len())
    }

    #[instrument(skip(self), fields(max_len))]
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        self.read_with(max_len, BULK_READ_TIMEOUT)
    }

    #[instrument(skip(self), fields(max_len, timeout_ms = timeout.as_millis() as u64))]
    fn read_timeout(
        &mut self,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.read_with(max_len, timeout)
    }

    #[instrument(skip(self))]
    fn mode_switch(&mut self) -> Result<(), TransportError> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: MODE_SWITCH_REQUEST,
                    value: MODE_SWITCH_VALUE,
                    index: MODE_SWITCH_INDEX,
                    data: &[],
                },
                CONTROL_TIMEOUT,
            )
            .wait()
            .map_err(|e| TransportError::ControlFailed(e.to_string()))?;

        info!("Sent mode switch request");
        Ok(())
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
