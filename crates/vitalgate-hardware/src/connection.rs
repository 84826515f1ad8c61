//! One analyzer endpoint and its read loop.
//!
//! A [`DeviceConnection`] runs as its own task. It owns the transport, the
//! frame splitter and the state machine, and talks to the manager only
//! through two channels:
//!
//! ```text
//!               ConnectionCommand (Trigger, Stop)
//!   Manager ───────────────────────────────────────► Connection task
//!      ▲                                                   │
//!      └───────────────────────────────────────────────────┘
//!        ConnectionEvent (StateChanged, Heartbeat, DecodeFailed,
//!                         TransportFailed, Measurement)
//! ```
//!
//! Decode errors are reported and the loop keeps reading. Transport errors
//! move the connection to `Error`, and after `reconnect_backoff` it reopens
//! the transport. It never gives up on its own; only `Stop` ends the task.
//!
//! Serial reads are not cancel-safe, so commands are polled between reads
//! rather than raced against them. Stop latency is bounded by `read_timeout`.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::Instant;
use tokio_util::codec::Decoder;
use tracing::{debug, error, info, warn};
use vitalgate_core::{DeviceConfig, DeviceId, DeviceRecord, DeviceState, DeviceType, Measurement};
use vitalgate_protocol::{ChecksumPolicy, DecodeContext, FrameSplitter, decode, hl7};

use crate::state::ConnectionStateMachine;
use crate::traits::{DeviceTransport, ReadEvent};
use crate::transport::AnyTransport;
use crate::{HardwareError, Result};

/// Report from a connection task to the manager.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    StateChanged {
        device_id: DeviceId,
        from: DeviceState,
        to: DeviceState,
    },
    /// Bytes arrived or the transport opened.
    Heartbeat {
        device_id: DeviceId,
        at: DateTime<Utc>,
    },
    /// A complete frame failed to decode. The connection stays up.
    DecodeFailed { device_id: DeviceId, error: String },
    /// The transport failed and a reconnect is pending.
    TransportFailed { device_id: DeviceId, error: String },
    Measurement(Box<Measurement>),
}

impl ConnectionEvent {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            Self::StateChanged { device_id, .. }
            | Self::Heartbeat { device_id, .. }
            | Self::DecodeFailed { device_id, .. }
            | Self::TransportFailed { device_id, .. } => device_id,
            Self::Measurement(m) => &m.device_id,
        }
    }
}

/// Instruction from the manager to a connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCommand {
    /// Ask a serial analyzer to start measuring, optionally pre-filling the
    /// customer id on the device.
    Trigger { customer_id: Option<String> },
    Stop,
}

/// Bytes written to a serial analyzer to start a measurement.
///
/// ```
/// use vitalgate_hardware::connection::trigger_command;
///
/// assert_eq!(trigger_command(None), b"MEASURE\r\n");
/// assert_eq!(trigger_command(Some("0965385123")), b"MEASURE,ID,0965385123\r\n");
/// ```
pub fn trigger_command(customer_id: Option<&str>) -> Vec<u8> {
    let id: Option<String> = customer_id
        .map(|raw| raw.chars().filter(char::is_ascii_alphanumeric).collect())
        .filter(|id: &String| !id.is_empty());
    match id {
        Some(id) => format!("MEASURE,ID,{id}\r\n").into_bytes(),
        None => b"MEASURE\r\n".to_vec(),
    }
}

enum Exit {
    /// Stop requested, or the manager went away.
    Stop,
    Transport(HardwareError),
}

pub struct DeviceConnection {
    device_id: DeviceId,
    device_type: DeviceType,
    config: DeviceConfig,
    checksum: ChecksumPolicy,
    transport: AnyTransport,
    machine: ConnectionStateMachine,
    framer: FrameSplitter,
    buffer: BytesMut,
    events: mpsc::Sender<ConnectionEvent>,
    commands: mpsc::Receiver<ConnectionCommand>,
}

impl DeviceConnection {
    pub fn new(
        record: &DeviceRecord,
        transport: AnyTransport,
        checksum: ChecksumPolicy,
        events: mpsc::Sender<ConnectionEvent>,
        commands: mpsc::Receiver<ConnectionCommand>,
    ) -> Self {
        Self {
            device_id: record.device_id.clone(),
            device_type: record.device_type,
            config: record.config.clone(),
            checksum,
            transport,
            machine: ConnectionStateMachine::new(),
            framer: FrameSplitter::for_device(record.device_type),
            buffer: BytesMut::new(),
            events,
            commands,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.machine.current()
    }

    /// Run until `Stop` arrives or the command channel closes.
    pub async fn run(mut self) -> Result<()> {
        info!(
            device_id = %self.device_id,
            endpoint = %self.transport.describe(),
            device_type = %self.device_type,
            "Connection task started"
        );

        loop {
            let exit = match self.connect().await {
                Ok(()) => self.read_loop().await,
                Err(e) => Exit::Transport(e),
            };

            let error = match exit {
                Exit::Stop => break,
                Exit::Transport(error) => error,
            };

            warn!(
                device_id = %self.device_id,
                error = %error,
                backoff = ?self.config.reconnect_backoff,
                "Transport failed, will reconnect"
            );
            let _ = self.transport.close().await;
            if !self.set_state(DeviceState::Error).await
                || !self
                    .emit(ConnectionEvent::TransportFailed {
                        device_id: self.device_id.clone(),
                        error: error.to_string(),
                    })
                    .await
                || !self.wait_backoff().await
                || !self.set_state(DeviceState::Reconnecting).await
            {
                break;
            }
        }

        let _ = self.transport.close().await;
        self.set_state(DeviceState::Disconnected).await;
        info!(device_id = %self.device_id, "Connection task stopped");
        Ok(())
    }

    async fn connect(&mut self) -> Result<()> {
        if matches!(
            self.machine.current(),
            DeviceState::Discovered | DeviceState::Disconnected
        ) {
            self.set_state(DeviceState::Connecting).await;
        }

        self.transport.open().await?;
        self.framer = FrameSplitter::for_device(self.device_type);
        self.buffer.clear();

        self.set_state(DeviceState::Connected).await;
        self.emit(ConnectionEvent::Heartbeat {
            device_id: self.device_id.clone(),
            at: Utc::now(),
        })
        .await;
        self.set_state(DeviceState::Reading).await;
        Ok(())
    }

    async fn read_loop(&mut self) -> Exit {
        loop {
            loop {
                match self.commands.try_recv() {
                    Ok(ConnectionCommand::Trigger { customer_id }) => {
                        if let Err(e) = self.trigger(customer_id.as_deref()).await {
                            return Exit::Transport(e);
                        }
                    }
                    Ok(ConnectionCommand::Stop) | Err(TryRecvError::Disconnected) => {
                        return Exit::Stop;
                    }
                    Err(TryRecvError::Empty) => break,
                }
            }

            let step = match self.transport.read_chunk(self.config.read_timeout).await {
                Ok(ReadEvent::Idle) => Ok(()),
                Ok(ReadEvent::Data(bytes)) => self.on_data(bytes).await,
                Ok(ReadEvent::PeerClosed) => {
                    debug!(device_id = %self.device_id, "Peer closed, flushing partial frame");
                    let flushed = self.drain_frames(true).await;
                    self.framer = FrameSplitter::for_device(self.device_type);
                    self.buffer.clear();
                    flushed
                }
                Err(e) => Err(Exit::Transport(e)),
            };
            if let Err(exit) = step {
                return exit;
            }
        }
    }

    async fn on_data(&mut self, bytes: Bytes) -> std::result::Result<(), Exit> {
        let beat = ConnectionEvent::Heartbeat {
            device_id: self.device_id.clone(),
            at: Utc::now(),
        };
        if !self.emit(beat).await {
            return Err(Exit::Stop);
        }
        self.buffer.extend_from_slice(&bytes);
        self.drain_frames(false).await
    }

    async fn drain_frames(&mut self, eof: bool) -> std::result::Result<(), Exit> {
        loop {
            let next = if eof {
                self.framer.decode_eof(&mut self.buffer)
            } else {
                self.framer.decode(&mut self.buffer)
            };
            match next {
                Ok(Some(frame)) => self.handle_frame(frame).await?,
                Ok(None) => return Ok(()),
                Err(e) => {
                    warn!(device_id = %self.device_id, error = %e, "Framing error");
                    let event = ConnectionEvent::DecodeFailed {
                        device_id: self.device_id.clone(),
                        error: e.to_string(),
                    };
                    if !self.emit(event).await {
                        return Err(Exit::Stop);
                    }
                    return Ok(());
                }
            }
        }
    }

    /// Decode one frame, hand the result to the manager, then reply to
    /// HL7 analyzers. The measurement is sent before the ACK so a failed
    /// write cannot lose it.
    async fn handle_frame(&mut self, frame: Bytes) -> std::result::Result<(), Exit> {
        let now = Utc::now();
        let ctx = DecodeContext::new(self.device_id.clone())
            .received_at(now)
            .checksum(self.checksum);

        let reply = match decode(&frame, self.device_type, &ctx) {
            Ok(measurement) => {
                info!(
                    device_id = %self.device_id,
                    measurement_id = %measurement.id(),
                    quality = %measurement.quality,
                    fields = measurement.fields.len(),
                    identified = measurement.customer_phone.is_some(),
                    "Measurement decoded"
                );
                if !self
                    .emit(ConnectionEvent::Measurement(Box::new(measurement)))
                    .await
                {
                    return Err(Exit::Stop);
                }
                (self.device_type == DeviceType::InbodyHl7).then(|| hl7::ack_for(&frame, now))
            }
            Err(e) => {
                warn!(
                    device_id = %self.device_id,
                    error = %e,
                    bytes = frame.len(),
                    "Frame rejected"
                );
                let event = ConnectionEvent::DecodeFailed {
                    device_id: self.device_id.clone(),
                    error: e.to_string(),
                };
                if !self.emit(event).await {
                    return Err(Exit::Stop);
                }
                (self.device_type == DeviceType::InbodyHl7).then(|| hl7::nak_for(&frame, &e, now))
            }
        };

        if let Some(reply) = reply {
            self.transport
                .write_all(&reply)
                .await
                .map_err(Exit::Transport)?;
        }
        Ok(())
    }

    async fn trigger(&mut self, customer_id: Option<&str>) -> Result<()> {
        if self.device_type == DeviceType::InbodyHl7 {
            warn!(device_id = %self.device_id, "Ignoring trigger for push-only analyzer");
            return Ok(());
        }
        self.set_state(DeviceState::Connected).await;
        self.transport
            .write_all(&trigger_command(customer_id))
            .await?;
        info!(device_id = %self.device_id, "Measurement triggered");
        self.set_state(DeviceState::Reading).await;
        Ok(())
    }

    /// Sleep for the reconnect backoff while still honouring `Stop`.
    /// Returns `false` when the task should end.
    async fn wait_backoff(&mut self) -> bool {
        let deadline = Instant::now() + self.config.reconnect_backoff;
        loop {
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => return true,
                command = self.commands.recv() => match command {
                    Some(ConnectionCommand::Trigger { .. }) => {
                        debug!(device_id = %self.device_id, "Trigger dropped while reconnecting");
                    }
                    Some(ConnectionCommand::Stop) | None => return false,
                },
            }
        }
    }

    /// Returns `false` when the manager is gone.
    async fn set_state(&mut self, to: DeviceState) -> bool {
        match self.machine.transition_to(to) {
            Ok(transition) => {
                debug!(
                    device_id = %self.device_id,
                    from = %transition.from,
                    to = %transition.to,
                    "State changed"
                );
                let event = ConnectionEvent::StateChanged {
                    device_id: self.device_id.clone(),
                    from: transition.from,
                    to: transition.to,
                };
                self.emit(event).await
            }
            Err(e) => {
                error!(device_id = %self.device_id, error = %e, "Rejected state change");
                true
            }
        }
    }

    /// Returns `false` when the manager is gone.
    async fn emit(&mut self, event: ConnectionEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}
