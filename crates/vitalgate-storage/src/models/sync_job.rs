use super::from_db_time;
use crate::error::{StorageError, StorageResult};
use serde::Serialize;
use std::str::FromStr;
use vitalgate_core::{MeasurementId, SyncJob, SyncStatus};

/// A `sync_jobs` row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SyncJobRow {
    pub measurement_id: String,
    pub status: String,
    pub attempts: i64,
    pub next_attempt_at: String,
    pub last_error: Option<String>,
    pub remote_id: Option<String>,
    pub claimed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SyncJobRow {
    pub fn into_job(self) -> StorageResult<SyncJob> {
        Ok(SyncJob {
            measurement_id: MeasurementId::from_str(&self.measurement_id)
                .map_err(|e| StorageError::invalid_data("measurement_id", e))?,
            status: SyncStatus::from_str(&self.status)
                .map_err(|e| StorageError::invalid_data("status", e))?,
            attempts: u32::try_from(self.attempts)
                .map_err(|e| StorageError::invalid_data("attempts", e))?,
            next_attempt_at: from_db_time("next_attempt_at", &self.next_attempt_at)?,
            last_error: self.last_error,
            remote_id: self.remote_id,
            claimed_at: self
                .claimed_at
                .as_deref()
                .map(|raw| from_db_time("claimed_at", raw))
                .transpose()?,
            created_at: from_db_time("created_at", &self.created_at)?,
            updated_at: from_db_time("updated_at", &self.updated_at)?,
        })
    }
}

/// Number of jobs per status, for the sync dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    pub pending: u64,
    pub in_flight: u64,
    pub delivered: u64,
    pub permanently_failed: u64,
}

impl SyncCounts {
    pub(crate) fn add(&mut self, status: SyncStatus, count: u64) {
        match status {
            SyncStatus::Pending => self.pending += count,
            SyncStatus::InFlight => self.in_flight += count,
            SyncStatus::Delivered => self.delivered += count,
            SyncStatus::PermanentlyFailed => self.permanently_failed += count,
        }
    }

    /// Jobs still owed to the remote side.
    pub fn open(&self) -> u64 {
        self.pending + self.in_flight
    }

    pub fn total(&self) -> u64 {
        self.open() + self.delivered + self.permanently_failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> SyncJobRow {
        SyncJobRow {
            measurement_id: "6f1c1c2e-3c4b-4b8e-9d3a-0d0f6a1b2c3d".into(),
            status: "in_flight".into(),
            attempts: 3,
            next_attempt_at: "2026-05-04T08:30:00.000000Z".into(),
            last_error: Some("HTTP 503".into()),
            remote_id: None,
            claimed_at: Some("2026-05-04T08:31:00.000000Z".into()),
            created_at: "2026-05-04T08:00:00.000000Z".into(),
            updated_at: "2026-05-04T08:31:00.000000Z".into(),
        }
    }

    #[test]
    fn test_row_into_job() {
        let job = row().into_job().unwrap();
        assert_eq!(job.status, SyncStatus::InFlight);
        assert_eq!(job.attempts, 3);
        assert!(job.claimed_at.is_some());
        assert_eq!(job.last_error.as_deref(), Some("HTTP 503"));
    }

    #[test]
    fn test_negative_attempts_rejected() {
        let mut bad = row();
        bad.attempts = -1;
        assert!(matches!(
            bad.into_job(),
            Err(StorageError::InvalidData { ref column, .. }) if column == "attempts"
        ));
    }

    #[test]
    fn test_counts() {
        let mut counts = SyncCounts::default();
        counts.add(SyncStatus::Pending, 2);
        counts.add(SyncStatus::InFlight, 1);
        counts.add(SyncStatus::PermanentlyFailed, 4);
        assert_eq!(counts.open(), 3);
        assert_eq!(counts.total(), 7);
    }
}
