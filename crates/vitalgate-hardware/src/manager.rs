//! Device manager.
//!
//! The `DeviceManager` owns every [`DeviceRecord`], supervises one
//! [`DeviceConnection`] task per endpoint and fans their events into a
//! single stream of measurements.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐
//! │ ttyUSB0    │──────►┌─────────────────┐
//! │ connection │       │                 │       ┌──────────────┐
//! └────────────┘       │  Event channel  │──────►│ DeviceManager│──► next_measurement()
//! ┌────────────┐       │  (mpsc)         │       │  records     │
//! │ tcp:2575   │──────►│                 │       │  sink        │──► MeasurementSink
//! │ connection │       └─────────────────┘       └──────────────┘
//! └────────────┘
//! ```
//!
//! Records are mutated only here, from connection events. Ordering across
//! devices is arbitrary; per device it follows the channel, so it matches
//! the order frames were decoded.
//!
//! A measurement is released by [`DeviceManager::next_measurement`] only
//! after the [`MeasurementSink`] accepted it. Rejected measurements stay
//! buffered, are retried with backoff, and get a last chance during
//! [`DeviceManager::shutdown`].
//!
//! # Examples
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use vitalgate_hardware::discovery::DiscoveryConfig;
//! use vitalgate_hardware::manager::{DeviceManager, ManagerConfig};
//! use vitalgate_hardware::traits::DiscardSink;
//!
//! #[tokio::main]
//! async fn main() -> vitalgate_hardware::Result<()> {
//!     let mut manager = DeviceManager::new(ManagerConfig::default(), DiscardSink);
//!     manager.discover(&DiscoveryConfig::default()).await?;
//!     manager.connect_all();
//!
//!     let cancel = CancellationToken::new();
//!     while let Some(measurement) = manager.next_measurement(&cancel).await {
//!         println!("{} from {}", measurement.id(), measurement.device_id);
//!     }
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vitalgate_core::constants::{DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_MEASUREMENT_TIMEOUT};
use vitalgate_core::{DeviceId, DeviceRecord, DeviceState, DeviceStatus, DeviceType, Measurement};
use vitalgate_protocol::ChecksumPolicy;

use crate::connection::{ConnectionCommand, ConnectionEvent, DeviceConnection};
use crate::discovery::{self, DiscoveryConfig};
use crate::traits::MeasurementSink;
use crate::transport::AnyTransport;
use crate::{HardwareError, Result};

const COMMAND_CHANNEL_CAPACITY: usize = 8;
/// How often shutdown re-checks whether connection tasks have exited.
const SHUTDOWN_POLL: Duration = Duration::from_millis(20);
/// First retry delay after the sink rejects a measurement. Doubles per failure.
const PERSIST_RETRY_INITIAL: Duration = Duration::from_millis(250);
const PERSIST_RETRY_MAX: Duration = Duration::from_secs(30);

/// Manager settings. The `manager` section of the gateway config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Capacity of the fan-in event channel.
    pub channel_capacity: usize,
    /// A device silent for longer than this reads as disconnected.
    #[serde(with = "vitalgate_core::duration")]
    pub heartbeat_timeout: Duration,
    #[serde(with = "vitalgate_core::duration")]
    pub heartbeat_check_interval: Duration,
    /// Upper bound on waiting for connection tasks to stop.
    #[serde(with = "vitalgate_core::duration")]
    pub shutdown_timeout: Duration,
    /// A triggered measurement that produces nothing within this window is
    /// abandoned and the device accepts triggers again.
    #[serde(with = "vitalgate_core::duration")]
    pub measurement_timeout: Duration,
    pub checksum: ChecksumPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            heartbeat_timeout: Duration::from_millis(DEFAULT_HEARTBEAT_TIMEOUT),
            heartbeat_check_interval: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            measurement_timeout: Duration::from_millis(DEFAULT_MEASUREMENT_TIMEOUT),
            checksum: ChecksumPolicy::default(),
        }
    }
}

impl ManagerConfig {
    #[must_use]
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    #[must_use]
    pub fn heartbeat_check_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_check_interval = interval;
        self
    }

    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn measurement_timeout(mut self, timeout: Duration) -> Self {
        self.measurement_timeout = timeout;
        self
    }

    #[must_use]
    pub fn checksum(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum = policy;
        self
    }
}

/// Counters since the manager was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub devices_known: usize,
    pub devices_connected: usize,
    pub measurements_received: u64,
    pub decode_failures: u64,
    pub transport_failures: u64,
    pub reconnects: u64,
    pub sink_failures: u64,
    /// Measurements waiting for the sink to accept them.
    pub unsaved: usize,
}

/// What [`DeviceManager::shutdown`] could not hand over cleanly.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Persisted but never taken with `next_measurement`.
    pub pending: Vec<Measurement>,
    /// Still rejected by the sink when the shutdown deadline passed.
    pub unsaved: Vec<Measurement>,
}

#[derive(Debug)]
struct Tracked {
    record: DeviceRecord,
    triggered_at: Option<Instant>,
}

#[derive(Debug)]
struct RunningConnection {
    commands: mpsc::Sender<ConnectionCommand>,
    task: JoinHandle<Result<()>>,
}

/// Supervises all device connections.
pub struct DeviceManager<S: MeasurementSink> {
    config: ManagerConfig,
    sink: S,
    devices: BTreeMap<DeviceId, Tracked>,
    running: HashMap<DeviceId, RunningConnection>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    event_rx: mpsc::Receiver<ConnectionEvent>,
    ready: VecDeque<Measurement>,
    unsaved: VecDeque<Measurement>,
    persist_failures: u32,
    persist_retry_at: Option<Instant>,
    stats: ManagerStats,
    last_sweep: Instant,
}

impl<S: MeasurementSink> DeviceManager<S> {
    pub fn new(config: ManagerConfig, sink: S) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity.max(1));
        Self {
            config,
            sink,
            devices: BTreeMap::new(),
            running: HashMap::new(),
            event_tx,
            event_rx,
            ready: VecDeque::new(),
            unsaved: VecDeque::new(),
            persist_failures: 0,
            persist_retry_at: None,
            stats: ManagerStats::default(),
            last_sweep: Instant::now(),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Track a device. Returns `false` if it was already known, in which
    /// case the existing record is kept untouched.
    pub fn register(&mut self, record: DeviceRecord) -> bool {
        if self.devices.contains_key(&record.device_id) {
            return false;
        }
        info!(
            device_id = %record.device_id,
            endpoint = %record.endpoint,
            device_type = %record.device_type,
            "Device registered"
        );
        self.devices.insert(
            record.device_id.clone(),
            Tracked {
                record,
                triggered_at: None,
            },
        );
        true
    }

    /// Scan for endpoints and register the new ones.
    ///
    /// Devices found by earlier scans are never dropped, even if this scan
    /// does not see them. Returns every known device.
    ///
    /// # Errors
    ///
    /// Propagates serial enumeration failures.
    pub async fn discover(&mut self, config: &DiscoveryConfig) -> Result<Vec<DeviceRecord>> {
        let found = discovery::discover(config).await?;
        let added = found
            .into_iter()
            .filter(|record| self.register(record.clone()))
            .count();
        info!(added, known = self.devices.len(), "Devices discovered");
        Ok(self.status())
    }

    /// Start a connection task for every device that has none.
    /// Returns how many were started.
    pub fn connect_all(&mut self) -> usize {
        let idle: Vec<(DeviceId, AnyTransport)> = self
            .devices
            .iter()
            .filter(|(id, _)| !self.running.contains_key(*id))
            .map(|(id, t)| {
                (
                    id.clone(),
                    AnyTransport::for_endpoint(&t.record.endpoint, &t.record.config),
                )
            })
            .collect();
        let started = idle.len();
        for (id, transport) in idle {
            self.spawn_connection(&id, transport);
        }
        started
    }

    /// Start a device's connection over a caller-supplied transport.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` if the device was never registered.
    pub fn connect_with(&mut self, device_id: &DeviceId, transport: AnyTransport) -> Result<()> {
        if !self.devices.contains_key(device_id) {
            return Err(HardwareError::DeviceNotFound(device_id.clone()));
        }
        if self.running.contains_key(device_id) {
            debug!(device_id = %device_id, "Connection already running");
            return Ok(());
        }
        self.spawn_connection(device_id, transport);
        Ok(())
    }

    fn spawn_connection(&mut self, device_id: &DeviceId, transport: AnyTransport) {
        let Some(tracked) = self.devices.get(device_id) else {
            return;
        };
        let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let connection = DeviceConnection::new(
            &tracked.record,
            transport,
            self.config.checksum,
            self.event_tx.clone(),
            command_rx,
        );
        let task = tokio::spawn(connection.run());
        self.running
            .insert(device_id.clone(), RunningConnection { commands, task });
    }

    /// Wait for the next measurement from any device.
    ///
    /// Returns `None` once `cancel` fires. Device status bookkeeping and
    /// sink retries run while waiting. A measurement is only returned after
    /// the sink has accepted it.
    pub async fn next_measurement(&mut self, cancel: &CancellationToken) -> Option<Measurement> {
        loop {
            if let Some(measurement) = self.ready.pop_front() {
                return Some(measurement);
            }
            let next_sweep = self.last_sweep + self.config.heartbeat_check_interval;
            let retry_at = self.persist_retry_at;
            tokio::select! {
                () = cancel.cancelled() => return None,
                event = self.event_rx.recv() => {
                    if let Some(event) = event {
                        self.handle_event(event).await;
                    }
                }
                () = tokio::time::sleep_until(next_sweep) => self.sweep(),
                () = tokio::time::sleep_until(retry_at.unwrap_or(next_sweep)), if retry_at.is_some() => {
                    self.flush_unsaved().await;
                }
            }
        }
    }

    /// Apply every event already queued, without waiting.
    pub async fn refresh(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event).await;
        }
        if self
            .persist_retry_at
            .is_some_and(|at| at <= Instant::now())
        {
            self.flush_unsaved().await;
        }
        self.sweep();
    }

    /// Snapshot of every known device, with status recomputed for now.
    pub fn status(&self) -> Vec<DeviceRecord> {
        let now = Utc::now();
        self.devices
            .values()
            .map(|t| {
                let mut record = t.record.clone();
                record.refresh_status(now, self.config.heartbeat_timeout);
                record
            })
            .collect()
    }

    pub fn device(&self, device_id: &DeviceId) -> Option<DeviceRecord> {
        let mut record = self.devices.get(device_id)?.record.clone();
        record.refresh_status(Utc::now(), self.config.heartbeat_timeout);
        Some(record)
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            devices_known: self.devices.len(),
            devices_connected: self
                .devices
                .values()
                .filter(|t| t.record.state.is_connected())
                .count(),
            unsaved: self.unsaved.len(),
            ..self.stats.clone()
        }
    }

    /// Ask a serial analyzer to start measuring.
    ///
    /// # Errors
    ///
    /// - `DeviceNotFound` for an unknown id
    /// - `Unsupported` for push-only HL7 analyzers
    /// - `DeviceUnavailable` if the transport is not connected
    /// - `DeviceBusy` if a triggered measurement has not completed yet
    pub async fn start_measurement(
        &mut self,
        device_id: &DeviceId,
        customer_id: Option<String>,
    ) -> Result<()> {
        self.refresh().await;

        let tracked = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| HardwareError::DeviceNotFound(device_id.clone()))?;
        if tracked.record.device_type == DeviceType::InbodyHl7 {
            return Err(HardwareError::unsupported(
                "start_measurement on a push-only HL7 analyzer",
            ));
        }
        let connection = self
            .running
            .get(device_id)
            .filter(|_| tracked.record.state.is_connected())
            .ok_or_else(|| HardwareError::DeviceUnavailable(device_id.clone()))?;
        if tracked.record.measurement_in_progress {
            return Err(HardwareError::DeviceBusy(device_id.clone()));
        }

        connection
            .commands
            .try_send(ConnectionCommand::Trigger { customer_id })
            .map_err(|e| match e {
                TrySendError::Full(_) => HardwareError::DeviceBusy(device_id.clone()),
                TrySendError::Closed(_) => HardwareError::DeviceUnavailable(device_id.clone()),
            })?;

        tracked.record.measurement_in_progress = true;
        tracked.triggered_at = Some(Instant::now());
        info!(device_id = %device_id, "Measurement requested");
        Ok(())
    }

    /// Stop a device's connection and forget it.
    ///
    /// This is the only way a device leaves the manager.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` for an unknown id.
    pub async fn deregister(&mut self, device_id: &DeviceId) -> Result<DeviceRecord> {
        if !self.devices.contains_key(device_id) {
            return Err(HardwareError::DeviceNotFound(device_id.clone()));
        }
        if let Some(RunningConnection { commands, mut task }) = self.running.remove(device_id) {
            drop(commands);
            let deadline = Instant::now() + self.config.shutdown_timeout;
            while !task.is_finished() && Instant::now() < deadline {
                tokio::select! {
                    event = self.event_rx.recv() => {
                        if let Some(event) = event {
                            self.handle_event(event).await;
                        }
                    }
                    _ = &mut task => break,
                    () = tokio::time::sleep_until(deadline) => break,
                }
            }
            if !task.is_finished() {
                warn!(device_id = %device_id, "Connection did not stop in time, aborting");
                task.abort();
            }
        }
        self.refresh().await;

        let tracked = self
            .devices
            .remove(device_id)
            .ok_or_else(|| HardwareError::DeviceNotFound(device_id.clone()))?;
        info!(device_id = %device_id, "Device deregistered");
        Ok(tracked.record)
    }

    /// Stop every connection and hand back what consumers never saw.
    ///
    /// Waits at most `shutdown_timeout` for connections, then aborts them.
    /// Measurements the sink rejected earlier are retried until the same
    /// deadline; whatever is still rejected comes back in
    /// [`ShutdownReport::unsaved`].
    pub async fn shutdown(mut self) -> ShutdownReport {
        let mut tasks: Vec<(DeviceId, JoinHandle<Result<()>>)> = self
            .running
            .drain()
            .map(|(id, RunningConnection { commands, task })| {
                drop(commands);
                (id, task)
            })
            .collect();
        info!(connections = tasks.len(), "Shutting down device manager");

        let deadline = Instant::now() + self.config.shutdown_timeout;
        loop {
            tasks.retain(|(_, task)| !task.is_finished());
            if tasks.is_empty() || Instant::now() >= deadline {
                break;
            }
            tokio::select! {
                event = self.event_rx.recv() => {
                    if let Some(event) = event {
                        self.handle_event(event).await;
                    }
                }
                () = tokio::time::sleep(SHUTDOWN_POLL) => {}
            }
        }

        for (device_id, task) in &tasks {
            warn!(device_id = %device_id, "Connection did not stop in time, aborting");
            task.abort();
        }
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event).await;
        }

        while !self.flush_unsaved().await {
            let Some(retry_at) = self.persist_retry_at.filter(|at| *at < deadline) else {
                break;
            };
            tokio::time::sleep_until(retry_at).await;
        }

        let report = ShutdownReport {
            pending: self.ready.drain(..).collect(),
            unsaved: self.unsaved.drain(..).collect(),
        };
        for measurement in &report.unsaved {
            error!(
                measurement_id = %measurement.id(),
                device_id = %measurement.device_id,
                "Measurement was never persisted"
            );
        }
        info!(
            pending = report.pending.len(),
            unsaved = report.unsaved.len(),
            aborted = tasks.len(),
            measurements = self.stats.measurements_received,
            "Device manager stopped"
        );
        report
    }

    async fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Measurement(measurement) => self.accept(*measurement).await,
            other => self.apply(other),
        }
    }

    async fn accept(&mut self, measurement: Measurement) {
        self.stats.measurements_received += 1;
        if let Some(tracked) = self.devices.get_mut(&measurement.device_id) {
            let record = &mut tracked.record;
            record.total_measurements += 1;
            record.last_measurement_at = Some(measurement.received_at);
            record.last_heartbeat = Some(measurement.received_at);
            record.consecutive_errors = 0;
            record.measurement_in_progress = false;
            tracked.triggered_at = None;
            record.refresh_status(Utc::now(), self.config.heartbeat_timeout);
        }

        // Queue behind earlier rejects so per-device order survives a retry.
        self.unsaved.push_back(measurement);
        if self.persist_retry_at.is_none() {
            self.flush_unsaved().await;
        }
    }

    /// Persist buffered measurements in order, moving each accepted one to
    /// `ready`. Stops at the first rejection and schedules the next attempt.
    /// Returns `true` once the buffer is empty.
    async fn flush_unsaved(&mut self) -> bool {
        while let Some(measurement) = self.unsaved.front() {
            let outcome = self.sink.persist(measurement).await;
            let measurement_id = measurement.id();
            let device_id = measurement.device_id.clone();
            match outcome {
                Ok(()) => {
                    if self.persist_failures > 0 {
                        info!(
                            %measurement_id,
                            %device_id,
                            failures = self.persist_failures,
                            "Measurement persisted after retry"
                        );
                    }
                    self.persist_failures = 0;
                    self.ready.extend(self.unsaved.pop_front());
                }
                Err(e) => {
                    self.stats.sink_failures += 1;
                    self.persist_failures += 1;
                    let delay = persist_retry_delay(self.persist_failures);
                    self.persist_retry_at = Some(Instant::now() + delay);
                    error!(
                        %measurement_id,
                        %device_id,
                        error = %e,
                        retry_in = ?delay,
                        unsaved = self.unsaved.len(),
                        "Failed to persist measurement"
                    );
                    return false;
                }
            }
        }
        self.persist_retry_at = None;
        true
    }

    fn apply(&mut self, event: ConnectionEvent) {
        let Some(tracked) = self.devices.get_mut(event.device_id()) else {
            debug!(device_id = %event.device_id(), "Event for unknown device dropped");
            return;
        };
        let record = &mut tracked.record;
        match event {
            ConnectionEvent::StateChanged { from, to, .. } => {
                record.state = to;
                if to == DeviceState::Reconnecting {
                    self.stats.reconnects += 1;
                }
                if !to.is_connected() {
                    record.measurement_in_progress = false;
                    tracked.triggered_at = None;
                }
                debug!(device_id = %record.device_id, %from, %to, "Device state changed");
            }
            ConnectionEvent::Heartbeat { at, .. } => {
                record.last_heartbeat = Some(at);
            }
            ConnectionEvent::DecodeFailed { error, .. } => {
                self.stats.decode_failures += 1;
                record.consecutive_errors += 1;
                record.total_errors += 1;
                record.last_error = Some(error);
            }
            ConnectionEvent::TransportFailed { error, .. } => {
                self.stats.transport_failures += 1;
                record.consecutive_errors += 1;
                record.total_errors += 1;
                record.last_error = Some(error);
            }
            ConnectionEvent::Measurement(_) => {}
        }
        record.refresh_status(Utc::now(), self.config.heartbeat_timeout);
    }

    /// Expire abandoned triggers and log status changes.
    fn sweep(&mut self) {
        self.last_sweep = Instant::now();
        let now = Utc::now();
        for tracked in self.devices.values_mut() {
            if let Some(started) = tracked.triggered_at
                && started.elapsed() >= self.config.measurement_timeout
            {
                warn!(device_id = %tracked.record.device_id, "Triggered measurement timed out");
                tracked.triggered_at = None;
                tracked.record.measurement_in_progress = false;
            }

            let before = tracked.record.status;
            tracked
                .record
                .refresh_status(now, self.config.heartbeat_timeout);
            let after = tracked.record.status;
            if before != after {
                match after {
                    DeviceStatus::Online => {
                        info!(device_id = %tracked.record.device_id, %before, %after, "Device status changed");
                    }
                    _ => {
                        warn!(device_id = %tracked.record.device_id, %before, %after, "Device status changed");
                    }
                }
            }
        }
    }
}

fn persist_retry_delay(failures: u32) -> Duration {
    let doublings = failures.saturating_sub(1).min(16);
    PERSIST_RETRY_INITIAL
        .saturating_mul(1_u32 << doublings)
        .min(PERSIST_RETRY_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::DiscardSink;
    use vitalgate_core::{DeviceConfig, Endpoint};

    fn record(path: &str, device_type: DeviceType) -> DeviceRecord {
        DeviceRecord::new(
            device_type,
            Endpoint::Serial { path: path.into() },
            DeviceConfig::default(),
        )
    }

    #[test]
    fn test_config_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(120));
        assert_eq!(config.measurement_timeout, Duration::from_secs(90));
        assert_eq!(config.checksum, ChecksumPolicy::Ignore);
    }

    #[test]
    fn test_config_humantime() {
        let config: ManagerConfig =
            serde_json::from_str(r#"{"heartbeat_timeout": "30s", "checksum": "verify"}"#).unwrap();
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(30));
        assert_eq!(config.checksum, ChecksumPolicy::Verify);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_register_keeps_first_record() {
        let mut manager = DeviceManager::new(ManagerConfig::default(), DiscardSink);
        let first = record("/dev/ttyUSB0", DeviceType::TanitaCsv);
        let id = first.device_id.clone();
        assert!(manager.register(first));
        assert!(!manager.register(record("/dev/ttyUSB0", DeviceType::TanitaCsv)));
        assert_eq!(manager.status().len(), 1);
        assert_eq!(manager.device(&id).unwrap().state, DeviceState::Discovered);
    }

    #[tokio::test]
    async fn test_deregister_unknown() {
        let mut manager = DeviceManager::new(ManagerConfig::default(), DiscardSink);
        let id = DeviceId::new("nobody").unwrap();
        assert!(matches!(
            manager.deregister(&id).await,
            Err(HardwareError::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_start_measurement_requires_connection() {
        let mut manager = DeviceManager::new(ManagerConfig::default(), DiscardSink);
        let tanita = record("/dev/ttyUSB0", DeviceType::TanitaCsv);
        let inbody = record("/dev/ttyUSB1", DeviceType::InbodyHl7);
        let (tanita_id, inbody_id) = (tanita.device_id.clone(), inbody.device_id.clone());
        manager.register(tanita);
        manager.register(inbody);

        assert!(matches!(
            manager.start_measurement(&tanita_id, None).await,
            Err(HardwareError::DeviceUnavailable(_))
        ));
        assert!(matches!(
            manager.start_measurement(&inbody_id, None).await,
            Err(HardwareError::Unsupported { .. })
        ));
        let unknown = DeviceId::new("ghost").unwrap();
        assert!(matches!(
            manager.start_measurement(&unknown, None).await,
            Err(HardwareError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_persist_retry_delay_doubles_to_cap() {
        assert_eq!(persist_retry_delay(1), Duration::from_millis(250));
        assert_eq!(persist_retry_delay(2), Duration::from_millis(500));
        assert_eq!(persist_retry_delay(4), Duration::from_secs(2));
        assert_eq!(persist_retry_delay(9), PERSIST_RETRY_MAX);
        assert_eq!(persist_retry_delay(u32::MAX), PERSIST_RETRY_MAX);
    }
}
