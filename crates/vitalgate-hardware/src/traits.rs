//! Seams between the device layer and the outside world.
//!
//! - [`DeviceTransport`]: byte-level access to one serial port or TCP listener
//! - [`MeasurementSink`]: where the manager hands decoded measurements before
//!   releasing them to consumers
//!
//! Both use native `async fn` in traits. Connections hold the concrete
//! [`AnyTransport`](crate::transport::AnyTransport) enum so spawned read
//! loops stay `Send` without boxing.

#![allow(async_fn_in_trait)]

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use vitalgate_core::Measurement;

use crate::Result;

/// Outcome of one bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    /// Bytes arrived.
    Data(Bytes),
    /// The read timeout elapsed with nothing to report.
    Idle,
    /// The remote peer closed cleanly. The transport stays usable and
    /// waits for the next peer; any partially buffered frame is void.
    PeerClosed,
}

/// Byte-level transport to one analyzer endpoint.
///
/// Reads are always bounded by a timeout so the read loop can observe
/// commands and staleness between calls.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use vitalgate_hardware::traits::{DeviceTransport, ReadEvent};
///
/// async fn pump<T: DeviceTransport>(t: &mut T) -> vitalgate_hardware::Result<usize> {
///     t.open().await?;
///     let mut total = 0;
///     while let ReadEvent::Data(chunk) = t.read_chunk(Duration::from_secs(2)).await? {
///         total += chunk.len();
///     }
///     t.close().await?;
///     Ok(total)
/// }
/// ```
pub trait DeviceTransport: Send {
    /// Open the port or bind the listener.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Transport` if the endpoint cannot be opened.
    async fn open(&mut self) -> Result<()>;

    /// Wait up to `timeout` for the next chunk of bytes.
    ///
    /// # Errors
    ///
    /// A transport-level failure (port gone, socket reset). The caller is
    /// expected to close and reopen.
    async fn read_chunk(&mut self, timeout: Duration) -> Result<ReadEvent>;

    /// Write bytes to the device, e.g. an HL7 ACK or a trigger command.
    async fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Release the port or socket. Safe to call when already closed.
    async fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Human readable endpoint, for logs and errors.
    fn describe(&self) -> String;
}

/// Persistence hook for decoded measurements.
///
/// The storage crate implements this by saving the measurement and enqueuing
/// its sync job in one transaction.
pub trait MeasurementSink: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn persist(
        &self,
        measurement: &Measurement,
    ) -> impl Future<Output = std::result::Result<(), Self::Error>> + Send;
}

/// Sink that keeps nothing. Useful for decode-only tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl MeasurementSink for DiscardSink {
    type Error = std::convert::Infallible;

    async fn persist(&self, _measurement: &Measurement) -> std::result::Result<(), Self::Error> {
        Ok(())
    }
}
