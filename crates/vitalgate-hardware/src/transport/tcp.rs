//! TCP listener transport for HL7 analyzers.
//!
//! The analyzer connects to the gateway, pushes results and waits for an
//! ACK on the same socket. One peer is served at a time. A clean close by
//! the peer sends the transport back to accepting; a reset is a transport
//! error.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use vitalgate_core::DeviceConfig;

use crate::traits::{DeviceTransport, ReadEvent};
use crate::{HardwareError, Result};

const READ_BUFFER_SIZE: usize = 4096;

#[derive(Debug)]
pub struct TcpTransport {
    bind: SocketAddr,
    connect_timeout: Duration,
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
}

impl TcpTransport {
    pub fn new(bind: SocketAddr, config: &DeviceConfig) -> Self {
        Self {
            bind,
            connect_timeout: config.connect_timeout,
            listener: None,
            stream: None,
            peer: None,
        }
    }

    /// Address actually bound, which differs from the configured one when
    /// binding to port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Currently connected analyzer, if any.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn error(&self, message: impl Into<String>) -> HardwareError {
        HardwareError::transport(self.describe(), message)
    }

    async fn accept(&mut self, timeout: Duration) -> Result<ReadEvent> {
        let Some(listener) = self.listener.as_ref() else {
            return Err(HardwareError::disconnected(self.describe()));
        };
        match tokio::time::timeout(timeout, listener.accept()).await {
            Err(_) => Ok(ReadEvent::Idle),
            Ok(Ok((stream, peer))) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                }
                info!(bind = %self.bind, peer = %peer, "Analyzer connected");
                self.stream = Some(stream);
                self.peer = Some(peer);
                Ok(ReadEvent::Idle)
            }
            Ok(Err(e)) => Err(self.error(format!("accept failed: {e}"))),
        }
    }
}

impl DeviceTransport for TcpTransport {
    async fn open(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }
        let listener = tokio::time::timeout(self.connect_timeout, TcpListener::bind(self.bind))
            .await
            .map_err(|_| HardwareError::timeout(self.connect_timeout.as_millis() as u64))?
            .map_err(|e| self.error(format!("bind failed: {e}")))?;

        info!(
            bind = %self.bind,
            local_addr = ?listener.local_addr().ok(),
            "Listening for HL7 analyzers"
        );
        self.listener = Some(listener);
        Ok(())
    }

    async fn read_chunk(&mut self, timeout: Duration) -> Result<ReadEvent> {
        let Some(stream) = self.stream.as_mut() else {
            return self.accept(timeout).await;
        };

        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        match tokio::time::timeout(timeout, stream.read_buf(&mut buf)).await {
            Err(_) => Ok(ReadEvent::Idle),
            Ok(Ok(0)) => {
                info!(bind = %self.bind, peer = ?self.peer, "Analyzer disconnected");
                self.stream = None;
                self.peer = None;
                Ok(ReadEvent::PeerClosed)
            }
            Ok(Ok(n)) => {
                debug!(bind = %self.bind, bytes = n, "Received from analyzer");
                Ok(ReadEvent::Data(buf.freeze()))
            }
            Ok(Err(e)) => {
                self.stream = None;
                self.peer = None;
                Err(self.error(e.to_string()))
            }
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(HardwareError::disconnected(self.describe()));
        };
        if let Err(e) = stream.write_all(data).await {
            self.stream = None;
            self.peer = None;
            return Err(self.error(e.to_string()));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.peer = None;
        if self.listener.take().is_some() {
            info!(bind = %self.bind, "Listener closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.listener.is_some()
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.bind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn listening() -> TcpTransport {
        let mut t = TcpTransport::new("127.0.0.1:0".parse().unwrap(), &DeviceConfig::default());
        t.open().await.unwrap();
        t
    }

    async fn next_data(t: &mut TcpTransport) -> Vec<u8> {
        for _ in 0..50 {
            if let ReadEvent::Data(b) = t.read_chunk(Duration::from_millis(100)).await.unwrap() {
                return b.to_vec();
            }
        }
        panic!("no data");
    }

    #[tokio::test]
    async fn test_accept_read_and_reply() {
        let mut t = listening().await;
        let addr = t.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"\x0bMSH|^~\\&\r\x1c\r").await.unwrap();

        assert_eq!(next_data(&mut t).await, b"\x0bMSH|^~\\&\r\x1c\r");
        assert!(t.peer().is_some());

        t.write_all(b"ACK").await.unwrap();
        let mut reply = [0u8; 3];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"ACK");
    }

    #[tokio::test]
    async fn test_peer_close_returns_to_accepting() {
        let mut t = listening().await;
        let addr = t.local_addr().unwrap();

        let mut first = TcpStream::connect(addr).await.unwrap();
        first.write_all(b"one").await.unwrap();
        assert_eq!(next_data(&mut t).await, b"one");
        drop(first);

        let mut closed = false;
        for _ in 0..50 {
            if t.read_chunk(Duration::from_millis(100)).await.unwrap() == ReadEvent::PeerClosed {
                closed = true;
                break;
            }
        }
        assert!(closed);
        assert!(t.is_open());

        let mut second = TcpStream::connect(addr).await.unwrap();
        second.write_all(b"two").await.unwrap();
        assert_eq!(next_data(&mut t).await, b"two");
    }

    #[tokio::test]
    async fn test_write_without_peer_fails() {
        let mut t = listening().await;
        let err = t.write_all(b"x").await.unwrap_err();
        assert!(matches!(err, HardwareError::Disconnected { .. }));
    }

    #[tokio::test]
    async fn test_idle_without_peer() {
        let mut t = listening().await;
        let event = t.read_chunk(Duration::from_millis(20)).await.unwrap();
        assert_eq!(event, ReadEvent::Idle);
        t.close().await.unwrap();
        assert!(!t.is_open());
    }
}
