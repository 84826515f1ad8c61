//! Endpoint discovery.
//!
//! Serial analyzers are found by scanning the system's serial ports and
//! keeping those under the configured path prefixes. Network analyzers
//! cannot be scanned; they connect to us, so each configured listen
//! address becomes one endpoint.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vitalgate_core::{DeviceConfig, DeviceRecord, DeviceType, Endpoint};

use crate::{HardwareError, Result};

/// Where to look for analyzers. The `devices` section of the gateway config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Serial paths under these prefixes are treated as analyzers.
    pub serial_prefixes: Vec<String>,
    /// Serial paths added even when the scan does not report them.
    pub serial_paths: Vec<String>,
    /// Addresses to listen on for HL7 analyzers.
    pub listen: Vec<SocketAddr>,
    /// Family assumed for every discovered serial port.
    pub serial_device_type: DeviceType,
    /// Family assumed for every listen address.
    pub network_device_type: DeviceType,
    /// Skip the system scan and use only `serial_paths`.
    pub scan_serial: bool,
    /// Transport settings applied to discovered devices.
    pub device: DeviceConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            serial_prefixes: vec![
                "/dev/ttyUSB".to_string(),
                "/dev/ttyACM".to_string(),
                "/dev/ttyS".to_string(),
            ],
            serial_paths: Vec::new(),
            listen: Vec::new(),
            serial_device_type: DeviceType::TanitaCsv,
            network_device_type: DeviceType::InbodyHl7,
            scan_serial: true,
            device: DeviceConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    #[must_use]
    pub fn listen_on(mut self, addr: SocketAddr) -> Self {
        self.listen.push(addr);
        self
    }

    #[must_use]
    pub fn serial_path(mut self, path: impl Into<String>) -> Self {
        self.serial_paths.push(path.into());
        self
    }

    #[must_use]
    pub fn scan_serial(mut self, scan: bool) -> Self {
        self.scan_serial = scan;
        self
    }
}

/// Keep the ports under one of `prefixes`, sorted and without duplicates.
pub fn filter_ports<I, S>(ports: I, prefixes: &[String]) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut kept: Vec<String> = ports
        .into_iter()
        .map(Into::into)
        .filter(|path| prefixes.iter().any(|p| path.starts_with(p.as_str())))
        .collect();
    kept.sort();
    kept.dedup();
    kept
}

/// List serial ports that look like analyzers.
///
/// # Errors
///
/// `HardwareError::Transport` if the operating system refuses enumeration.
pub async fn scan_serial_ports(prefixes: &[String]) -> Result<Vec<String>> {
    let ports = tokio::task::spawn_blocking(serialport::available_ports)
        .await
        .map_err(|e| HardwareError::transport("serial", format!("scan task: {e}")))?
        .map_err(|e| HardwareError::transport("serial", e.to_string()))?;

    debug!(found = ports.len(), "Serial ports enumerated");
    Ok(filter_ports(ports.into_iter().map(|p| p.port_name), prefixes))
}

/// Build a fresh record for every endpoint the configuration points at.
///
/// # Errors
///
/// Propagates serial enumeration failures.
pub async fn discover(config: &DiscoveryConfig) -> Result<Vec<DeviceRecord>> {
    let mut paths = if config.scan_serial {
        scan_serial_ports(&config.serial_prefixes).await?
    } else {
        Vec::new()
    };
    paths.extend(config.serial_paths.iter().cloned());
    paths.sort();
    paths.dedup();

    let serial = paths.into_iter().map(|path| {
        DeviceRecord::new(
            config.serial_device_type,
            Endpoint::Serial { path },
            config.device.clone(),
        )
    });
    let network = config.listen.iter().map(|bind| {
        DeviceRecord::new(
            config.network_device_type,
            Endpoint::Tcp { bind: *bind },
            config.device.clone(),
        )
    });
    let records: Vec<DeviceRecord> = serial.chain(network).collect();

    info!(endpoints = records.len(), "Discovery finished");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_ports_by_prefix() {
        let prefixes = DiscoveryConfig::default().serial_prefixes;
        let kept = filter_ports(
            [
                "/dev/ttyUSB1",
                "/dev/ttyACM0",
                "/dev/ttyUSB0",
                "/dev/cu.Bluetooth",
                "/dev/ttyUSB0",
                "COM3",
            ],
            &prefixes,
        );
        assert_eq!(kept, vec!["/dev/ttyACM0", "/dev/ttyUSB0", "/dev/ttyUSB1"]);
    }

    #[tokio::test]
    async fn test_discover_configured_endpoints() {
        let config = DiscoveryConfig::default()
            .scan_serial(false)
            .serial_path("/dev/ttyUSB3")
            .listen_on("0.0.0.0:2575".parse().unwrap());

        let records = discover(&config).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].device_id.as_str(), "tanita_ttyUSB3");
        assert_eq!(records[0].device_type, DeviceType::TanitaCsv);
        assert_eq!(records[1].device_id.as_str(), "inbody_0.0.0.0_2575");
        assert_eq!(records[1].device_type, DeviceType::InbodyHl7);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: DiscoveryConfig =
            serde_json::from_str(r#"{"listen": ["127.0.0.1:2575"]}"#).unwrap();
        assert_eq!(config.listen.len(), 1);
        assert_eq!(config.serial_prefixes.len(), 3);
        assert_eq!(config.serial_device_type, DeviceType::TanitaCsv);
    }
}
