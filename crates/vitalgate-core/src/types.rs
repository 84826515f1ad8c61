use crate::{Result, error::Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Identifier assigned to a measurement at decode time.
///
/// The id is the idempotency key for delivery, so it never changes once
/// created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasurementId(Uuid);

impl MeasurementId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        MeasurementId(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        MeasurementId(uuid)
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MeasurementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MeasurementId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(MeasurementId)
            .map_err(|e| Error::InvalidMeasurementId(format!("'{s}': {e}")))
    }
}

/// Stable device identifier derived from its endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device ID with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidDeviceId` if the id is empty or contains
    /// characters outside `[A-Za-z0-9_.:-]`.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidDeviceId("device ID cannot be empty".to_string()));
        }
        if let Some(c) = id.chars().find(|c| !Self::is_allowed(*c)) {
            return Err(Error::InvalidDeviceId(format!(
                "illegal character '{c}' in '{id}'"
            )));
        }
        Ok(DeviceId(id))
    }

    /// Derive an id from a device family and an endpoint label, replacing
    /// anything that is not allowed in an id.
    ///
    /// `("/dev/ttyUSB0", TanitaCsv)` becomes `tanita_ttyUSB0`.
    #[must_use]
    pub fn derive(device_type: DeviceType, endpoint: &Endpoint) -> Self {
        let label = match endpoint {
            Endpoint::Serial { path } => path
                .rsplit(['/', '\\'])
                .find(|part| !part.is_empty())
                .unwrap_or(path.as_str())
                .to_string(),
            Endpoint::Tcp { bind } => format!("{}_{}", bind.ip(), bind.port()),
        };
        let label: String = label
            .chars()
            .map(|c| if Self::is_allowed(c) && c != ':' { c } else { '_' })
            .collect();
        DeviceId(format!("{}_{}", device_type.short_name(), label))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_allowed(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-')
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DeviceId::new(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        DeviceId::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

/// Supported device families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Serial analyzer emitting key/value CSV packets.
    TanitaCsv,
    /// Network analyzer emitting MLLP wrapped HL7 messages.
    InbodyHl7,
}

impl DeviceType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceType::TanitaCsv => "tanita_csv",
            DeviceType::InbodyHl7 => "inbody_hl7",
        }
    }

    /// Prefix used when deriving device ids.
    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            DeviceType::TanitaCsv => "tanita",
            DeviceType::InbodyHl7 => "inbody",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tanita_csv" | "tanita" => Ok(DeviceType::TanitaCsv),
            "inbody_hl7" | "inbody" => Ok(DeviceType::InbodyHl7),
            other => Err(Error::UnknownDeviceType(other.to_string())),
        }
    }
}

/// Where a device is reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    Serial { path: String },
    Tcp { bind: std::net::SocketAddr },
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Endpoint::Serial { path } => f.write_str(path),
            Endpoint::Tcp { bind } => write!(f, "tcp://{bind}"),
        }
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Parse a raw token: numeric when it parses as a finite number, text otherwise.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => FieldValue::Number(n),
            _ => FieldValue::Text(raw.to_string()),
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// A key the field tables did not recognize, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmappedField {
    pub key: String,
    pub value: String,
}

impl UnmappedField {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Measurement quality derived from completeness and impedance stability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl Quality {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Excellent => "excellent",
            Quality::Good => "good",
            Quality::Fair => "fair",
            Quality::Poor => "poor",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "excellent" => Ok(Quality::Excellent),
            "good" => Ok(Quality::Good),
            "fair" => Ok(Quality::Fair),
            "poor" => Ok(Quality::Poor),
            other => Err(Error::Config(format!("unknown quality '{other}'"))),
        }
    }
}

/// Canonical record produced by decoding a frame from any device family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    id: MeasurementId,
    pub device_id: DeviceId,
    pub device_type: DeviceType,
    pub customer_phone: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldValue>,
    pub raw_unmapped: Vec<UnmappedField>,
    pub raw: Vec<u8>,
    pub quality: Quality,
}

impl Measurement {
    /// Start a new measurement with a fresh id. `captured_at` defaults to
    /// the receipt time until the payload supplies one.
    #[must_use]
    pub fn new(
        device_id: DeviceId,
        device_type: DeviceType,
        raw: Vec<u8>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self::with_id(MeasurementId::new(), device_id, device_type, raw, received_at)
    }

    /// Rebuild a measurement around an existing id, e.g. when loading from storage.
    #[must_use]
    pub fn with_id(
        id: MeasurementId,
        device_id: DeviceId,
        device_type: DeviceType,
        raw: Vec<u8>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            device_id,
            device_type,
            customer_phone: None,
            captured_at: received_at,
            received_at,
            fields: BTreeMap::new(),
            raw_unmapped: Vec::new(),
            raw,
            quality: Quality::Poor,
        }
    }

    #[must_use]
    pub fn id(&self) -> MeasurementId {
        self.id
    }

    /// Numeric value of a field, if present and numeric.
    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(FieldValue::as_f64)
    }

    /// Number of key/value associations carried, mapped and unmapped.
    #[must_use]
    pub fn association_count(&self) -> usize {
        self.fields.len() + self.raw_unmapped.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("tanita_ttyUSB0")]
    #[case("inbody_0.0.0.0_2575")]
    #[case("bench-1:a")]
    fn test_device_id_valid(#[case] input: &str) {
        let id: DeviceId = input.parse().unwrap();
        assert_eq!(id.as_str(), input);
    }

    #[rstest]
    #[case("")]
    #[case("has space")]
    #[case("slash/inside")]
    fn test_device_id_invalid(#[case] input: &str) {
        assert!(DeviceId::new(input).is_err());
    }

    #[rstest]
    #[case(DeviceType::TanitaCsv, Endpoint::Serial { path: "/dev/ttyUSB0".into() }, "tanita_ttyUSB0")]
    #[case(DeviceType::TanitaCsv, Endpoint::Serial { path: "COM3".into() }, "tanita_COM3")]
    #[case(DeviceType::InbodyHl7, Endpoint::Tcp { bind: "0.0.0.0:2575".parse().unwrap() }, "inbody_0.0.0.0_2575")]
    fn test_device_id_derive(
        #[case] device_type: DeviceType,
        #[case] endpoint: Endpoint,
        #[case] expected: &str,
    ) {
        let id = DeviceId::derive(device_type, &endpoint);
        assert_eq!(id.as_str(), expected);
        assert!(DeviceId::new(id.as_str()).is_ok());
    }

    #[rstest]
    #[case("tanita_csv", DeviceType::TanitaCsv)]
    #[case("TANITA", DeviceType::TanitaCsv)]
    #[case("inbody_hl7", DeviceType::InbodyHl7)]
    fn test_device_type_parse(#[case] input: &str, #[case] expected: DeviceType) {
        assert_eq!(input.parse::<DeviceType>().unwrap(), expected);
    }

    #[test]
    fn test_device_type_serde_names() {
        let json = serde_json::to_string(&DeviceType::InbodyHl7).unwrap();
        assert_eq!(json, "\"inbody_hl7\"");
    }

    #[rstest]
    #[case("76.6", FieldValue::Number(76.6))]
    #[case("-2.5", FieldValue::Number(-2.5))]
    #[case("01/01/2024", FieldValue::Text("01/01/2024".into()))]
    #[case("NaN", FieldValue::Text("NaN".into()))]
    fn test_field_value_parse(#[case] raw: &str, #[case] expected: FieldValue) {
        assert_eq!(FieldValue::parse(raw), expected);
    }

    #[test]
    fn test_measurement_id_roundtrip() {
        let id = MeasurementId::new();
        let parsed: MeasurementId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<MeasurementId>().is_err());
    }

    #[test]
    fn test_measurement_defaults() {
        let now = Utc::now();
        let m = Measurement::new(
            DeviceId::new("tanita_ttyUSB0").unwrap(),
            DeviceType::TanitaCsv,
            b"raw".to_vec(),
            now,
        );
        assert_eq!(m.captured_at, now);
        assert_eq!(m.quality, Quality::Poor);
        assert_eq!(m.association_count(), 0);
    }

    #[test]
    fn test_quality_ordering() {
        assert!(Quality::Excellent > Quality::Good);
        assert!(Quality::Fair > Quality::Poor);
    }
}
