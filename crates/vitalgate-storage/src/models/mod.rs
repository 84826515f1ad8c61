//! Row types and their mapping onto domain types.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text so that SQL string
//! comparison orders them chronologically.

pub mod measurement;
pub mod sync_job;

pub use measurement::MeasurementRow;
pub use sync_job::{SyncCounts, SyncJobRow};

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, SecondsFormat, Utc};

/// Render a timestamp the way every column stores it.
pub fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_db_time(column: &str, raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::invalid_data(column, format!("'{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_db_time_is_fixed_width_and_ordered() {
        let a = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(5);
        let (sa, sb) = (to_db_time(a), to_db_time(b));
        assert_eq!(sa, "2026-03-01T09:00:00.000000Z");
        assert_eq!(sa.len(), sb.len());
        assert!(sa < sb);
        assert_eq!(from_db_time("t", &sb).unwrap(), b);
    }

    #[test]
    fn test_bad_db_time_names_column() {
        let err = from_db_time("captured_at", "yesterday").unwrap_err();
        assert!(err.to_string().contains("captured_at"));
    }
}
