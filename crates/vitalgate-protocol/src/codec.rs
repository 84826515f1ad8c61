//! Entry point for turning one raw frame into a [`Measurement`].
//!
//! Decoding is a pure function of the frame bytes and the [`DecodeContext`]:
//! no I/O, no shared state. Connections call it concurrently.
//!
//! ```
//! use chrono::Utc;
//! use vitalgate_core::{DeviceId, DeviceType};
//! use vitalgate_protocol::{DecodeContext, decode};
//!
//! let ctx = DecodeContext::new(DeviceId::new("tanita_ttyUSB0").unwrap())
//!     .received_at(Utc::now());
//! let raw = br#"{0,16,~0,1,~1,1,~2,1,MO,"MC-780",ID,"0965385123",Wk,76.6,FW,18.2"#;
//! let m = decode(raw, DeviceType::TanitaCsv, &ctx).unwrap();
//! assert_eq!(m.number("weight_kg"), Some(76.6));
//! assert_eq!(m.customer_phone.as_deref(), Some("0965385123"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vitalgate_core::{DeviceId, DeviceType, Measurement, Result};

use crate::{hl7, tanita};

/// What to do with the trailing `CS` field of a Tanita packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumPolicy {
    /// Capture the checksum as a field, never reject on it.
    #[default]
    Ignore,
    /// Reject packets whose checksum does not match.
    Verify,
}

/// Per-call inputs that do not come from the frame itself.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    pub device_id: DeviceId,
    pub received_at: DateTime<Utc>,
    pub checksum: ChecksumPolicy,
}

impl DecodeContext {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            received_at: Utc::now(),
            checksum: ChecksumPolicy::default(),
        }
    }

    #[must_use]
    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }

    #[must_use]
    pub fn checksum(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum = policy;
        self
    }
}

/// Decode one complete frame.
///
/// # Errors
/// - `Error::MalformedPacket` when the frame violates its family's format
/// - `Error::IncompleteFrame` for an HL7 frame without its block trailer
/// - `Error::ChecksumMismatch` when checksum verification is enabled and fails
pub fn decode(raw: &[u8], device_type: DeviceType, ctx: &DecodeContext) -> Result<Measurement> {
    match device_type {
        DeviceType::TanitaCsv => tanita::decode(raw, ctx),
        DeviceType::InbodyHl7 => hl7::decode(raw, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitalgate_core::Error;

    fn ctx() -> DecodeContext {
        DecodeContext::new(DeviceId::new("test_device").unwrap())
    }

    #[test]
    fn test_dispatch_by_device_type() {
        let csv = br#"{0,16,~0,1,~1,1,~2,1,MO,"MC-780",Wk,70.0"#;
        assert!(decode(csv, DeviceType::TanitaCsv, &ctx()).is_ok());
        // The same bytes are not an HL7 frame.
        assert!(matches!(
            decode(csv, DeviceType::InbodyHl7, &ctx()),
            Err(Error::IncompleteFrame(_))
        ));
    }

    #[test]
    fn test_context_builder() {
        let at = Utc::now();
        let c = ctx().received_at(at).checksum(ChecksumPolicy::Verify);
        assert_eq!(c.received_at, at);
        assert_eq!(c.checksum, ChecksumPolicy::Verify);
    }
}
