//! Device lifecycle types.
//!
//! # Valid Transitions
//!
//! - Discovered → Connecting → Connected → Reading
//! - Connecting / Connected / Reading → Error → Reconnecting → Connected | Error
//! - Reading → Connected (read loop paused, e.g. while a command is written)
//! - any state → Disconnected (explicit stop or deregistration)
//! - Disconnected → Connecting (explicit restart)
//!
//! ```
//! use vitalgate_core::DeviceState;
//!
//! assert!(DeviceState::Error.can_transition_to(&DeviceState::Reconnecting));
//! assert!(!DeviceState::Error.can_transition_to(&DeviceState::Reading));
//! ```

use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_CONNECT_TIMEOUT, DEFAULT_ERROR_CEILING, DEFAULT_READ_TIMEOUT,
    DEFAULT_RECONNECT_BACKOFF,
};
use crate::types::{DeviceId, DeviceType, Endpoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Connection lifecycle state of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Seen by discovery, never opened.
    Discovered,
    /// Opening the transport.
    Connecting,
    /// Transport open, read loop not running.
    Connected,
    /// Read loop running.
    Reading,
    /// Transport failed; waiting for the reconnect backoff.
    Error,
    /// Re-opening the transport after an error.
    Reconnecting,
    /// Stopped by the operator. Terminal until explicitly restarted.
    Disconnected,
}

impl DeviceState {
    pub fn can_transition_to(&self, target: &DeviceState) -> bool {
        use DeviceState::*;
        matches!(
            (self, target),
            (Discovered, Connecting)
                | (Connecting, Connected | Error)
                | (Connected, Reading | Error)
                | (Reading, Connected | Error)
                | (Error, Reconnecting)
                | (Reconnecting, Connected | Error)
                | (Disconnected, Connecting)
                | (Discovered | Connecting | Connected | Reading | Error | Reconnecting, Disconnected)
        )
    }

    /// Transport is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, DeviceState::Connected | DeviceState::Reading)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Discovered => "discovered",
            DeviceState::Connecting => "connecting",
            DeviceState::Connected => "connected",
            DeviceState::Reading => "reading",
            DeviceState::Error => "error",
            DeviceState::Reconnecting => "reconnecting",
            DeviceState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health reported to operators, derived from state, error count and heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    /// Connected but recent frames failed to decode.
    Degraded,
    Error,
    Disconnected,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Degraded => "degraded",
            DeviceStatus::Error => "error",
            DeviceStatus::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Per-device transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub baud_rate: u32,
    #[serde(with = "crate::duration")]
    pub read_timeout: Duration,
    #[serde(with = "crate::duration")]
    pub connect_timeout: Duration,
    #[serde(with = "crate::duration")]
    pub reconnect_backoff: Duration,
    /// Consecutive errors above which the device is reported as `error`.
    pub error_ceiling: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT),
            reconnect_backoff: Duration::from_millis(DEFAULT_RECONNECT_BACKOFF),
            error_ceiling: DEFAULT_ERROR_CEILING,
        }
    }
}

impl DeviceConfig {
    #[must_use]
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    #[must_use]
    pub fn error_ceiling(mut self, ceiling: u32) -> Self {
        self.error_ceiling = ceiling;
        self
    }
}

/// Everything the gateway knows about one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    pub device_type: DeviceType,
    pub endpoint: Endpoint,
    pub state: DeviceState,
    pub status: DeviceStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    pub total_errors: u64,
    pub total_measurements: u64,
    pub last_error: Option<String>,
    pub last_measurement_at: Option<DateTime<Utc>>,
    pub measurement_in_progress: bool,
    pub first_seen: DateTime<Utc>,
    pub config: DeviceConfig,
}

impl DeviceRecord {
    #[must_use]
    pub fn new(device_type: DeviceType, endpoint: Endpoint, config: DeviceConfig) -> Self {
        Self {
            device_id: DeviceId::derive(device_type, &endpoint),
            device_type,
            endpoint,
            state: DeviceState::Discovered,
            status: DeviceStatus::Disconnected,
            last_heartbeat: None,
            consecutive_errors: 0,
            total_errors: 0,
            total_measurements: 0,
            last_error: None,
            last_measurement_at: None,
            measurement_in_progress: false,
            first_seen: Utc::now(),
            config,
        }
    }

    /// Whether the last heartbeat is older than `window` at `now`.
    #[must_use]
    pub fn heartbeat_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.last_heartbeat {
            Some(beat) => now
                .signed_duration_since(beat)
                .to_std()
                .is_ok_and(|age| age > window),
            None => true,
        }
    }

    /// Recompute `status` from the other fields.
    ///
    /// While the transport is open, decode errors only degrade the device.
    /// While it is down, the device reads as disconnected until the error
    /// count passes the ceiling, after which it reads as `error`.
    pub fn refresh_status(&mut self, now: DateTime<Utc>, heartbeat_window: Duration) {
        self.status = if self.state.is_connected() {
            if self.heartbeat_stale(now, heartbeat_window) {
                DeviceStatus::Disconnected
            } else if self.consecutive_errors > 0 {
                DeviceStatus::Degraded
            } else {
                DeviceStatus::Online
            }
        } else if self.state != DeviceState::Disconnected
            && self.consecutive_errors > self.config.error_ceiling
        {
            DeviceStatus::Error
        } else {
            DeviceStatus::Disconnected
        };
    }
}
