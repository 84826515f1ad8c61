//! Serial port transport for CSV analyzers.
//!
//! `serialport` is blocking, so every call runs on the blocking pool. The
//! port is moved into the blocking task and handed back with the result,
//! which keeps it owned by exactly one place at a time.

use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

use bytes::Bytes;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};
use vitalgate_core::DeviceConfig;

use crate::traits::{DeviceTransport, ReadEvent};
use crate::{HardwareError, Result};

const READ_BUFFER_SIZE: usize = 1024;

/// 8N1 serial port at the configured baud rate.
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    connect_timeout: Duration,
    read_timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>, config: &DeviceConfig) -> Self {
        Self {
            path: path.into(),
            baud_rate: config.baud_rate,
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            port: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn take_port(&mut self) -> Result<Box<dyn SerialPort>> {
        self.port
            .take()
            .ok_or_else(|| HardwareError::disconnected(self.path.clone()))
    }

    fn io_error(&self, error: io::Error) -> HardwareError {
        HardwareError::transport(self.path.clone(), error.to_string())
    }
}

impl fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialTransport")
            .field("path", &self.path)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl DeviceTransport for SerialTransport {
    async fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let builder = serialport::new(self.path.clone(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout);

        let opening = tokio::task::spawn_blocking(move || builder.open());
        let port = tokio::time::timeout(self.connect_timeout, opening)
            .await
            .map_err(|_| HardwareError::timeout(self.connect_timeout.as_millis() as u64))?
            .map_err(|e| HardwareError::transport(self.path.clone(), e.to_string()))?
            .map_err(|e| HardwareError::transport(self.path.clone(), e.to_string()))?;

        info!(path = %self.path, baud_rate = self.baud_rate, "Serial port opened");
        self.port = Some(port);
        Ok(())
    }

    async fn read_chunk(&mut self, timeout: Duration) -> Result<ReadEvent> {
        let mut port = self.take_port()?;
        let retime = timeout != self.read_timeout;

        let (port, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = (|| {
                if retime {
                    port.set_timeout(timeout)?;
                }
                let mut buf = vec![0u8; READ_BUFFER_SIZE];
                let n = port.read(&mut buf)?;
                buf.truncate(n);
                Ok::<_, io::Error>(buf)
            })();
            (port, outcome)
        })
        .await
        .map_err(|e| HardwareError::transport(self.path.clone(), format!("read task: {e}")))?;

        self.read_timeout = timeout;
        match outcome {
            Ok(buf) => {
                self.port = Some(port);
                if buf.is_empty() {
                    return Ok(ReadEvent::Idle);
                }
                Ok(ReadEvent::Data(Bytes::from(buf)))
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                self.port = Some(port);
                Ok(ReadEvent::Idle)
            }
            Err(e) => {
                debug!(path = %self.path, error = %e, "Serial read failed, dropping port");
                Err(self.io_error(e))
            }
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut port = self.take_port()?;
        let data = data.to_vec();
        let (port, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = port.write_all(&data).and_then(|()| port.flush());
            (port, outcome)
        })
        .await
        .map_err(|e| HardwareError::transport(self.path.clone(), format!("write task: {e}")))?;

        match outcome {
            Ok(()) => {
                self.port = Some(port);
                Ok(())
            }
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            info!(path = %self.path, "Serial port closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}
