//! Capabilities shared by the BootROM and Socrates clients.
//!
//! The two protocols have nothing in common on the wire; they only share
//! the exclusively-owned transport, a receive accumulator and the retry
//! policy for refilling it.

use std::thread;
use std::time::Duration;
use tracing::{trace, warn};

use crate::buffer::{AccumulatorError, ByteAccumulator};
use crate::error::Result;
use crate::protocol::Packet;
use crate::retry::RetryPolicy;
use crate::transport::{TransportError, UsbTransport};

/// A half-duplex request/response client owning one transport.
pub trait ProtocolClient {
    type Transport: UsbTransport;

    /// Short protocol name for logs.
    const NAME: &'static str;

    fn transport(&self) -> &Self::Transport;

    /// Give the transport back, e.g. to hand it to the other protocol.
    /// Bytes still buffered in the accumulator are dropped.
    fn into_transport(self) -> Self::Transport;

    /// Block until one complete message has been received.
    fn receive_packet(&mut self) -> Result<Packet>;
}

/// Read once from `transport` into the free space of `fifo`.
///
/// Transient failures and empty transfers are retried per `policy`;
/// `protocol` tags the retry warnings. Returns the number of bytes appended.
pub(crate) fn fill_from<T: UsbTransport>(
    protocol: &'static str,
    transport: &mut T,
    fifo: &mut ByteAccumulator,
    policy: &RetryPolicy,
    timeout: Option<Duration>,
) -> Result<usize> {
    if fifo.free() == 0 {
        return Err(AccumulatorError::Overflow {
            requested: 1,
            free: 0,
        }
        .into());
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        let res = match timeout {
            Some(t) => transport.read_timeout(fifo.free(), t),
            None => transport.read(fifo.free()),
        };

        let err = match res {
            Ok(data) if !data.is_empty() => {
                fifo.append(&data)?;
                trace!(bytes = data.len(), buffered = fifo.available(), "Buffered");
                return Ok(data.len());
            }
            Ok(_) => TransportError::ReadFailed("Empty transfer".into()),
            Err(e) => e,
        };

        if !err.is_transient() || attempt >= policy.attempts() {
            return Err(err.into());
        }

        warn!(protocol, error = %err, attempt, "Transient read error, retrying...");
        let backoff = policy.backoff();
        if !backoff.is_zero() {
            thread::sleep(backoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transport::MockTransport;

    #[test]
    fn test_fill_retries_transient_errors() {
        let mut mock = MockTransport::new();
        mock.queue_read_error(TransportError::ReadFailed("stall".into()));
        mock.queue_read(&[]);
        mock.queue_read(b"abc");

        let mut fifo = ByteAccumulator::new(16);
        let n = fill_from("test", &mut mock, &mut fifo, &RetryPolicy::new(2, 0), None).unwrap();
        assert_eq!(n, 3);
        assert_eq!(fifo.peek(3).unwrap(), b"abc");
    }

    #[test]
    fn test_fill_gives_up_after_policy() {
        let mut mock = MockTransport::new();
        mock.queue_read_error(TransportError::Timeout { timeout_ms: 1 });
        mock.queue_read_error(TransportError::Timeout { timeout_ms: 1 });
        mock.queue_read(b"late");

        let mut fifo = ByteAccumulator::new(16);
        let err = fill_from("test", &mut mock, &mut fifo, &RetryPolicy::new(1, 0), None).unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::Timeout { .. })
        ));
        assert_eq!(mock.pending_reads(), 1);
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_fill_never_retries_disconnect() {
        let mut mock = MockTransport::new();
        mock.queue_read_error(TransportError::Disconnected);
        mock.queue_read(b"abc");

        let mut fifo = ByteAccumulator::new(16);
        let err = fill_from("test", &mut mock, &mut fifo, &RetryPolicy::new(5, 0), None).unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Disconnected)));
    }

    #[test]
    fn test_fill_requests_free_space_and_timeout() {
        let mut mock = MockTransport::new();
        mock.queue_read(b"abcdef");

        let mut fifo = ByteAccumulator::new(8);
        fifo.append(b"xyz").unwrap();
        fill_from(
            "test",
            &mut mock,
            &mut fifo,
            &RetryPolicy::none(),
            Some(Duration::from_millis(250)),
        )
        .unwrap();

        assert_eq!(mock.read_requests(), vec![5]);
        assert_eq!(mock.read_timeouts(), vec![Duration::from_millis(250)]);
        assert_eq!(fifo.peek(8).unwrap(), b"xyzabcde");
    }
}
