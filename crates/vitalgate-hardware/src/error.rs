//! Error types for device transports and the device manager.
//!
//! Transport failures move a connection into `Error` and trigger a reconnect.
//! `DeviceBusy`, `DeviceUnavailable` and `Unsupported` are returned to the
//! caller of the manager and are never retried by the manager itself.

use vitalgate_core::DeviceId;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while talking to an analyzer.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The port or socket failed (closed, reset, unplugged).
    #[error("Transport error on {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The transport is not open.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// A measurement is already running on this device.
    #[error("Device busy: {0}")]
    DeviceBusy(DeviceId),

    /// The device is known but its transport is not connected.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(DeviceId),

    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    /// Operation is not supported by this device family.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] vitalgate_core::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether a reconnect may clear the error.
    ///
    /// Caller-facing errors (busy, unavailable, unsupported, unknown device,
    /// bad configuration) are not retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::Disconnected { .. } | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn id() -> DeviceId {
        DeviceId::new("tanita_ttyUSB0").unwrap()
    }

    #[test]
    fn test_transport_error_display() {
        let error = HardwareError::transport("/dev/ttyUSB0", "port closed");
        assert_eq!(
            error.to_string(),
            "Transport error on /dev/ttyUSB0: port closed"
        );
    }

    #[test]
    fn test_timeout_error() {
        let error = HardwareError::timeout(5000);
        assert!(matches!(error, HardwareError::Timeout { .. }));
        assert_eq!(error.to_string(), "Operation timeout after 5000ms");
    }

    #[rstest]
    #[case(HardwareError::transport("tcp://0.0.0.0:2575", "reset"), true)]
    #[case(HardwareError::timeout(10), true)]
    #[case(HardwareError::disconnected("x"), true)]
    #[case(HardwareError::Io(std::io::Error::other("x")), true)]
    #[case(HardwareError::DeviceBusy(id()), false)]
    #[case(HardwareError::DeviceUnavailable(id()), false)]
    #[case(HardwareError::DeviceNotFound(id()), false)]
    #[case(HardwareError::unsupported("trigger"), false)]
    #[case(HardwareError::configuration("bad baud"), false)]
    fn test_is_retryable(#[case] error: HardwareError, #[case] retryable: bool) {
        assert_eq!(error.is_retryable(), retryable, "{error}");
    }

    #[test]
    fn test_busy_names_device() {
        assert_eq!(
            HardwareError::DeviceBusy(id()).to_string(),
            "Device busy: tanita_ttyUSB0"
        );
    }
}
