//! Device layer for the vitalgate gateway.
//!
//! This crate connects body-composition analyzers to the rest of the
//! gateway: it finds endpoints, keeps one supervised connection per
//! endpoint, frames and decodes what they send, and fans the resulting
//! measurements into a single stream.
//!
//! # Layers
//!
//! - [`transport`]: byte-level access to serial ports, TCP listeners and an
//!   in-memory mock, dispatched through [`transport::AnyTransport`]
//! - [`state`]: the per-connection lifecycle state machine
//! - [`connection`]: the read loop of one endpoint
//! - [`discovery`]: serial port scanning and configured listen addresses
//! - [`manager`]: supervision, fan-in, status and triggering
//!
//! # Design Philosophy
//!
//! - **Async-first**: transports use native `async fn` in traits.
//! - **Message passing**: connections never share mutable state with the
//!   manager; they send [`connection::ConnectionEvent`]s and receive
//!   [`connection::ConnectionCommand`]s.
//! - **Never give up**: a connection reconnects after every transport
//!   failure until it is explicitly stopped.
//! - **Never lose a measurement**: decoded measurements reach the
//!   [`traits::MeasurementSink`] even during shutdown.

pub mod connection;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod state;
pub mod traits;
pub mod transport;

pub use connection::{ConnectionCommand, ConnectionEvent, DeviceConnection, trigger_command};
pub use discovery::DiscoveryConfig;
pub use error::{HardwareError, Result};
pub use manager::{DeviceManager, ManagerConfig, ManagerStats, ShutdownReport};
pub use traits::{DeviceTransport, DiscardSink, MeasurementSink, ReadEvent};
pub use transport::AnyTransport;
