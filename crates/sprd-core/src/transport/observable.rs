//! Transport decorator that reports traffic to an observer.

use std::sync::Arc;
use std::time::Duration;

use super::traits::{TransportError, UsbTransport};
use crate::events::{PacketDirection, SprdEvent, SprdObserver};

/// Bytes of each transfer copied into the event.
const PREVIEW_LEN: usize = 32;

/// Transport wrapper that emits packet events.
pub struct ObservableTransport<T: UsbTransport, O: SprdObserver> {
    inner: T,
    observer: Arc<O>,
}

impl<T: UsbTransport, O: SprdObserver> ObservableTransport<T, O> {
    pub fn new(inner: T, observer: Arc<O>) -> Self {
        Self { inner, observer }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn emit(&self, direction: PacketDirection, data: &[u8]) {
        self.observer.on_event(&SprdEvent::Packet {
            direction,
            length: data.len(),
            data: Some(data.iter().take(PREVIEW_LEN).cloned().collect()),
        });
    }
}

impl<T: UsbTransport, O: SprdObserver> UsbTransport for ObservableTransport<T, O> {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let res = self.inner.write(data);
        if res.is_ok() {
            self.emit(PacketDirection::Tx, data);
        }
        res
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let res = self.inner.read(max_len);
        if let Ok(data) = &res
            && !data.is_empty()
        {
            self.emit(PacketDirection::Rx, data);
        }
        res
    }

    fn read_timeout(
        &mut self,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let res = self.inner.read_timeout(max_len, timeout);
        if let Ok(data) = &res
            && !data.is_empty()
        {
            self.emit(PacketDirection::Rx, data);
        }
        res
    }

    fn mode_switch(&mut self) -> Result<(), TransportError> {
        self.inner.mode_switch()
    }

    fn vendor_id(&self) -> u16 {
        self.inner.vendor_id()
    }

    fn product_id(&self) -> u16 {
        self.inner.product_id()
    }
}
