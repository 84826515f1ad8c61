//! In-memory transport driven by a handle.
//!
//! Tests feed bytes, failures and peer closes through [`MockTransportHandle`]
//! and observe what the connection wrote back (ACKs, trigger commands).
//! Dropping every handle closes the input, which reads as a disconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::traits::{DeviceTransport, ReadEvent};
use crate::{HardwareError, Result};

#[derive(Debug)]
enum MockInput {
    Data(Bytes),
    Fail(String),
    PeerClosed,
}

/// Transport whose input is scripted by a [`MockTransportHandle`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use vitalgate_hardware::traits::{DeviceTransport, ReadEvent};
/// use vitalgate_hardware::transport::MockTransport;
///
/// #[tokio::main]
/// async fn main() -> vitalgate_hardware::Result<()> {
///     let (mut transport, handle) = MockTransport::new("mock0");
///     transport.open().await?;
///
///     handle.send(b"MO,\"MC-780\"\r\n").await;
///     let event = transport.read_chunk(Duration::from_millis(100)).await?;
///     assert!(matches!(event, ReadEvent::Data(_)));
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockTransport {
    name: String,
    input_rx: mpsc::Receiver<MockInput>,
    written_tx: mpsc::UnboundedSender<Bytes>,
    open: bool,
    fail_opens: Arc<AtomicU32>,
    opens: Arc<AtomicU32>,
}

/// Controls a [`MockTransport`] from the test side.
#[derive(Debug, Clone)]
pub struct MockTransportHandle {
    input_tx: mpsc::Sender<MockInput>,
    written_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>>,
    fail_opens: Arc<AtomicU32>,
    opens: Arc<AtomicU32>,
}

impl MockTransport {
    pub fn new(name: impl Into<String>) -> (Self, MockTransportHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (written_tx, written_rx) = mpsc::unbounded_channel();
        let fail_opens = Arc::new(AtomicU32::new(0));
        let opens = Arc::new(AtomicU32::new(0));

        let transport = Self {
            name: name.into(),
            input_rx,
            written_tx,
            open: false,
            fail_opens: Arc::clone(&fail_opens),
            opens: Arc::clone(&opens),
        };
        let handle = MockTransportHandle {
            input_tx,
            written_rx: Arc::new(tokio::sync::Mutex::new(written_rx)),
            fail_opens,
            opens,
        };
        (transport, handle)
    }
}

impl MockTransportHandle {
    /// Deliver bytes as one read chunk.
    pub async fn send(&self, bytes: &[u8]) {
        let _ = self
            .input_tx
            .send(MockInput::Data(Bytes::copy_from_slice(bytes)))
            .await;
    }

    /// Make the next read fail at transport level.
    pub async fn fail(&self, message: impl Into<String>) {
        let _ = self.input_tx.send(MockInput::Fail(message.into())).await;
    }

    /// Simulate the remote peer closing cleanly.
    pub async fn close_peer(&self) {
        let _ = self.input_tx.send(MockInput::PeerClosed).await;
    }

    /// Make the next `count` calls to `open` fail.
    pub fn fail_next_opens(&self, count: u32) {
        self.fail_opens.store(count, Ordering::SeqCst);
    }

    /// Number of successful opens so far.
    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Next chunk written by the connection, waiting up to `timeout`.
    pub async fn next_written(&self, timeout: Duration) -> Option<Bytes> {
        let mut rx = self.written_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }
}

impl DeviceTransport for MockTransport {
    async fn open(&mut self) -> Result<()> {
        let remaining = self.fail_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(HardwareError::transport(self.describe(), "open refused"));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.open = true;
        Ok(())
    }

    async fn read_chunk(&mut self, timeout: Duration) -> Result<ReadEvent> {
        if !self.open {
            return Err(HardwareError::disconnected(self.describe()));
        }
        match tokio::time::timeout(timeout, self.input_rx.recv()).await {
            Err(_) => Ok(ReadEvent::Idle),
            Ok(Some(MockInput::Data(bytes))) => Ok(ReadEvent::Data(bytes)),
            Ok(Some(MockInput::PeerClosed)) => Ok(ReadEvent::PeerClosed),
            Ok(Some(MockInput::Fail(message))) => {
                self.open = false;
                Err(HardwareError::transport(self.describe(), message))
            }
            Ok(None) => {
                self.open = false;
                Err(HardwareError::disconnected(self.describe()))
            }
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(HardwareError::disconnected(self.describe()));
        }
        let _ = self.written_tx.send(Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn describe(&self) -> String {
        format!("mock://{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_scripted_reads() {
        let (mut t, handle) = MockTransport::new("t");
        t.open().await.unwrap();

        handle.send(b"abc").await;
        handle.close_peer().await;
        handle.fail("unplugged").await;

        assert_eq!(
            t.read_chunk(TICK).await.unwrap(),
            ReadEvent::Data(Bytes::from_static(b"abc"))
        );
        assert_eq!(t.read_chunk(TICK).await.unwrap(), ReadEvent::PeerClosed);
        assert!(t.read_chunk(TICK).await.is_err());
        assert!(!t.is_open());
    }

    #[tokio::test]
    async fn test_idle_when_nothing_sent() {
        let (mut t, _handle) = MockTransport::new("t");
        t.open().await.unwrap();
        assert_eq!(t.read_chunk(TICK).await.unwrap(), ReadEvent::Idle);
    }

    #[tokio::test]
    async fn test_failed_opens_then_success() {
        let (mut t, handle) = MockTransport::new("t");
        handle.fail_next_opens(2);
        assert!(t.open().await.is_err());
        assert!(t.open().await.is_err());
        t.open().await.unwrap();
        assert_eq!(handle.opens(), 1);
    }

    #[tokio::test]
    async fn test_writes_are_observable() {
        let (mut t, handle) = MockTransport::new("t");
        t.open().await.unwrap();
        t.write_all(b"MEASURE\r\n").await.unwrap();
        assert_eq!(
            handle.next_written(TICK).await,
            Some(Bytes::from_static(b"MEASURE\r\n"))
        );
        assert_eq!(handle.next_written(TICK).await, None);
    }
}
