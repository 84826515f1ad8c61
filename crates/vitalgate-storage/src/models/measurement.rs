use super::{from_db_time, to_db_time};
use crate::error::{StorageError, StorageResult};
use std::str::FromStr;
use vitalgate_core::{DeviceId, DeviceType, Measurement, MeasurementId, Quality};

/// A `measurements` row.
///
/// `fields` and `raw_unmapped` are JSON documents; `raw` keeps the frame
/// bytes exactly as they arrived so a measurement can always be re-decoded.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MeasurementRow {
    pub id: String,
    pub device_id: String,
    pub device_type: String,
    pub customer_phone: Option<String>,
    pub captured_at: String,
    pub received_at: String,
    pub quality: String,
    pub fields: String,
    pub raw_unmapped: String,
    pub raw: Vec<u8>,
}

impl MeasurementRow {
    pub fn from_measurement(m: &Measurement) -> StorageResult<Self> {
        Ok(Self {
            id: m.id().to_string(),
            device_id: m.device_id.to_string(),
            device_type: m.device_type.as_str().to_string(),
            customer_phone: m.customer_phone.clone(),
            captured_at: to_db_time(m.captured_at),
            received_at: to_db_time(m.received_at),
            quality: m.quality.as_str().to_string(),
            fields: serde_json::to_string(&m.fields)?,
            raw_unmapped: serde_json::to_string(&m.raw_unmapped)?,
            raw: m.raw.clone(),
        })
    }

    pub fn into_measurement(self) -> StorageResult<Measurement> {
        let id = MeasurementId::from_str(&self.id)
            .map_err(|e| StorageError::invalid_data("id", e))?;
        let device_id =
            DeviceId::new(self.device_id).map_err(|e| StorageError::invalid_data("device_id", e))?;
        let device_type = DeviceType::from_str(&self.device_type)
            .map_err(|e| StorageError::invalid_data("device_type", e))?;
        let received_at = from_db_time("received_at", &self.received_at)?;

        let mut m = Measurement::with_id(id, device_id, device_type, self.raw, received_at);
        m.customer_phone = self.customer_phone;
        m.captured_at = from_db_time("captured_at", &self.captured_at)?;
        m.quality =
            Quality::from_str(&self.quality).map_err(|e| StorageError::invalid_data("quality", e))?;
        m.fields = serde_json::from_str(&self.fields)?;
        m.raw_unmapped = serde_json::from_str(&self.raw_unmapped)?;
        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use vitalgate_core::{FieldValue, UnmappedField};

    fn sample() -> Measurement {
        let received = Utc.with_ymd_and_hms(2026, 5, 4, 8, 30, 0).unwrap();
        let mut m = Measurement::new(
            DeviceId::new("tanita_ttyUSB0").unwrap(),
            DeviceType::TanitaCsv,
            b"{0,16,~0,1,~1,1,~2,1,MO,\"MC-780\",Wk,76.6".to_vec(),
            received,
        );
        m.customer_phone = Some("0965385123".into());
        m.captured_at = Utc.with_ymd_and_hms(2026, 5, 4, 8, 29, 0).unwrap();
        m.fields.insert("weight_kg".into(), FieldValue::Number(76.6));
        m.fields.insert("model".into(), FieldValue::Text("MC-780".into()));
        m.raw_unmapped.push(UnmappedField::new("Zz", "1"));
        m.raw_unmapped.push(UnmappedField::new("Zz", "2"));
        m.quality = Quality::Fair;
        m
    }

    #[test]
    fn test_row_preserves_every_column() {
        let m = sample();
        let back = MeasurementRow::from_measurement(&m)
            .unwrap()
            .into_measurement()
            .unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_unknown_device_type_is_invalid_data() {
        let mut row = MeasurementRow::from_measurement(&sample()).unwrap();
        row.device_type = "omron_ble".into();
        assert!(matches!(
            row.into_measurement(),
            Err(StorageError::InvalidData { ref column, .. }) if column == "device_type"
        ));
    }
}
