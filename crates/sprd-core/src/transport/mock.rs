//! Mock USB transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::traits::{TransportError, UsbTransport};
use crate::hdlc;
use crate::protocol::Packet;
use crate::protocol::constants::{SPRD_BOOT_PRODUCT_ID, SPRD_VENDOR_ID};

/// One scripted read outcome.
#[derive(Debug)]
enum ReadStep {
    Data(Vec<u8>),
    Fail(TransportError),
}

#[derive(Debug, Default)]
struct MockState {
    reads: VecDeque<ReadStep>,
    writes: Vec<Vec<u8>>,
    read_requests: Vec<usize>,
    read_timeouts: Vec<Duration>,
    mode_switches: usize,
    short_write_by: usize,
    disconnected: bool,
}

/// Mock transport for unit testing protocol clients.
///
/// Clones share state, so a test can keep one handle while a client owns
/// another.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    vid: u16,
    pid: u16,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            vid: SPRD_VENDOR_ID,
            pid: SPRD_BOOT_PRODUCT_ID,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue bytes to be returned by a read.
    ///
    /// A read asking for fewer bytes gets a prefix; the rest stays queued.
    pub fn queue_read(&self, data: &[u8]) {
        self.lock().reads.push_back(ReadStep::Data(data.to_vec()));
    }

    /// Queue `data` split into reads of at most `chunk` bytes.
    pub fn queue_chunked(&self, data: &[u8], chunk: usize) {
        for part in data.chunks(chunk.max(1)) {
            self.queue_read(part);
        }
    }

    /// Queue a read that fails with `error`.
    pub fn queue_read_error(&self, error: TransportError) {
        self.lock().reads.push_back(ReadStep::Fail(error));
    }

    /// Queue an HDLC-framed BootROM response.
    pub fn queue_frame(&self, packet: &Packet) {
        let frame = hdlc::encode(packet).unwrap_or_default();
        self.queue_read(&frame);
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// `max_len` of every read call so far.
    pub fn read_requests(&self) -> Vec<usize> {
        self.lock().read_requests.clone()
    }

    /// Timeouts passed through `read_timeout`.
    pub fn read_timeouts(&self) -> Vec<Duration> {
        self.lock().read_timeouts.clone()
    }

    /// Number of scripted reads not yet consumed.
    pub fn pending_reads(&self) -> usize {
        self.lock().reads.len()
    }

    pub fn mode_switches(&self) -> usize {
        self.lock().mode_switches
    }

    /// Make subsequent writes report `by` fewer bytes than given.
    pub fn set_short_write(&self, by: usize) {
        self.lock().short_write_by = by;
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        self.lock().disconnected = true;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        self.lock().disconnected = false;
    }

    /// Set VID/PID reported by the mock.
    pub fn set_ids(&mut self, vid: u16, pid: u16) {
        self.vid = vid;
        self.pid = pid;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.lock();
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        state.writes.push(data.to_vec());
        Ok(data.len().saturating_sub(state.short_write_by))
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let mut state = self.lock();
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        state.read_requests.push(max_len);

        match state.reads.pop_front() {
            Some(ReadStep::Data(mut data)) => {
                if data.len() > max_len {
                    let rest = data.split_off(max_len);
                    state.reads.push_front(ReadStep::Data(rest));
                }
                Ok(data)
            }
            Some(ReadStep::Fail(e)) => Err(e),
            None => Err(TransportError::Timeout { timeout_ms: 5000 }),
        }
    }

    fn read_timeout(
        &mut self,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.lock().read_timeouts.push(timeout);
        self.read(max_len)
    }

    fn mode_switch(&mut self) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        state.mode_switches += 1;
        Ok(())
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_read_queue() {
        let mut mock = MockTransport::new();
        mock.queue_read(b"SPRD");
        mock.queue_read(b"3");

        assert_eq!(mock.read(64).unwrap(), b"SPRD");
        assert_eq!(mock.read(64).unwrap(), b"3");

        // Queue is empty now
        assert!(matches!(
            mock.read(64),
            Err(TransportError::Timeout { .. })
        ));
    }

    #[test]
    fn test_mock_read_splits_to_max_len() {
        let mut mock = MockTransport::new();
        mock.queue_read(b"abcdef");

        assert_eq!(mock.read(4).unwrap(), b"abcd");
        assert_eq!(mock.read(4).unwrap(), b"ef");
        assert_eq!(mock.read_requests(), vec![4, 4]);
    }

    #[test]
    fn test_mock_write_capture() {
        let mut mock = MockTransport::new();
        mock.write(b"Hello").unwrap();
        mock.write(b"World").unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"Hello");
        assert_eq!(writes[1], b"World");
    }

    #[test]
    fn test_write_all_detects_short_write() {
        let mut mock = MockTransport::new();
        mock.set_short_write(1);
        assert!(matches!(
            mock.write_all(b"abc"),
            Err(TransportError::ShortWrite {
                expected: 3,
                written: 2
            })
        ));
    }

    #[test]
    fn test_mock_disconnect() {
        let mut mock = MockTransport::new();
        mock.disconnect();
        assert!(mock.write(b"test").is_err());
        assert!(matches!(mock.read(1), Err(TransportError::Disconnected)));

        mock.reconnect();
        assert!(mock.write(b"test").is_ok());
    }

    #[test]
    fn test_clones_share_state() {
        let handle = MockTransport::new();
        let mut owned = handle.clone();
        owned.mode_switch().unwrap();
        owned.write(b"x").unwrap();
        assert_eq!(handle.mode_switches(), 1);
        assert_eq!(handle.get_writes().len(), 1);
    }
}
