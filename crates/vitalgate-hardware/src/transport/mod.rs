//! Concrete transports and the enum that dispatches between them.
//!
//! Native `async fn` in traits cannot be used as `dyn DeviceTransport`, so
//! connections hold an [`AnyTransport`] instead. Adding a transport means
//! adding a variant and one arm per method.

mod mock;
mod serial;
mod tcp;

pub use mock::{MockTransport, MockTransportHandle};
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

use std::time::Duration;

use vitalgate_core::{DeviceConfig, Endpoint};

use crate::Result;
use crate::traits::{DeviceTransport, ReadEvent};

/// Enum wrapper for transport dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTransport {
    Serial(SerialTransport),
    Tcp(TcpTransport),
    /// In-memory transport for tests and demos.
    Mock(MockTransport),
}

impl AnyTransport {
    /// Build the transport matching an endpoint.
    pub fn for_endpoint(endpoint: &Endpoint, config: &DeviceConfig) -> Self {
        match endpoint {
            Endpoint::Serial { path } => Self::Serial(SerialTransport::new(path.clone(), config)),
            Endpoint::Tcp { bind } => Self::Tcp(TcpTransport::new(*bind, config)),
        }
    }
}

impl DeviceTransport for AnyTransport {
    async fn open(&mut self) -> Result<()> {
        match self {
            Self::Serial(t) => t.open().await,
            Self::Tcp(t) => t.open().await,
            Self::Mock(t) => t.open().await,
        }
    }

    async fn read_chunk(&mut self, timeout: Duration) -> Result<ReadEvent> {
        match self {
            Self::Serial(t) => t.read_chunk(timeout).await,
            Self::Tcp(t) => t.read_chunk(timeout).await,
            Self::Mock(t) => t.read_chunk(timeout).await,
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Serial(t) => t.write_all(data).await,
            Self::Tcp(t) => t.write_all(data).await,
            Self::Mock(t) => t.write_all(data).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::Serial(t) => t.close().await,
            Self::Tcp(t) => t.close().await,
            Self::Mock(t) => t.close().await,
        }
    }

    fn is_open(&self) -> bool {
        match self {
            Self::Serial(t) => t.is_open(),
            Self::Tcp(t) => t.is_open(),
            Self::Mock(t) => t.is_open(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Serial(t) => t.describe(),
            Self::Tcp(t) => t.describe(),
            Self::Mock(t) => t.describe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_endpoint_selects_variant() {
        let config = DeviceConfig::default();
        let serial = AnyTransport::for_endpoint(
            &Endpoint::Serial {
                path: "/dev/ttyUSB0".into(),
            },
            &config,
        );
        assert!(matches!(serial, AnyTransport::Serial(_)));
        assert_eq!(serial.describe(), "/dev/ttyUSB0");

        let tcp = AnyTransport::for_endpoint(
            &Endpoint::Tcp {
                bind: "127.0.0.1:2575".parse().unwrap(),
            },
            &config,
        );
        assert!(matches!(tcp, AnyTransport::Tcp(_)));
        assert!(!tcp.is_open());
    }
}
