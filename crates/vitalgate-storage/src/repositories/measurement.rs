#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::{MeasurementRow, to_db_time};
use crate::transaction;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use vitalgate_core::{DeviceId, Measurement, MeasurementId};

/// Repository trait for decoded measurements.
///
/// Measurements are append-only: nothing here updates or deletes a row.
pub trait MeasurementRepository: Send + Sync {
    /// Store a measurement and queue it for sync in one transaction.
    ///
    /// Returns `true` when the measurement was new. Saving the same
    /// measurement twice is harmless.
    async fn save_and_enqueue(&self, measurement: &Measurement) -> StorageResult<bool>;

    /// Find a measurement by id
    async fn find(&self, id: MeasurementId) -> StorageResult<Option<Measurement>>;

    /// Most recently received measurements, newest first
    async fn recent(&self, limit: i64) -> StorageResult<Vec<Measurement>>;

    /// Measurements from one device received at or after `since`, oldest first
    async fn find_by_device(
        &self,
        device_id: &DeviceId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Measurement>>;

    /// Total number of stored measurements
    async fn count(&self) -> StorageResult<i64>;
}

/// SQLite implementation of MeasurementRepository
#[derive(Debug, Clone)]
pub struct SqliteMeasurementRepository {
    pool: SqlitePool,
}

impl SqliteMeasurementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_MEASUREMENT: &str = r#"
    SELECT id, device_id, device_type, customer_phone,
           captured_at, received_at, quality,
           fields, raw_unmapped, raw
    FROM measurements
"#;

impl MeasurementRepository for SqliteMeasurementRepository {
    async fn save_and_enqueue(&self, measurement: &Measurement) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await?;
        let inserted = transaction::insert_measurement(&mut tx, measurement).await?;
        let enqueued = transaction::enqueue_sync(&mut tx, measurement.id(), Utc::now()).await?;
        tx.commit().await?;

        debug!(
            measurement_id = %measurement.id(),
            device_id = %measurement.device_id,
            inserted,
            enqueued,
            "Measurement stored"
        );
        Ok(inserted)
    }

    async fn find(&self, id: MeasurementId) -> StorageResult<Option<Measurement>> {
        sqlx::query_as::<_, MeasurementRow>(&format!("{SELECT_MEASUREMENT} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(MeasurementRow::into_measurement)
            .transpose()
    }

    async fn recent(&self, limit: i64) -> StorageResult<Vec<Measurement>> {
        sqlx::query_as::<_, MeasurementRow>(&format!(
            "{SELECT_MEASUREMENT} ORDER BY received_at DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(MeasurementRow::into_measurement)
        .collect()
    }

    async fn find_by_device(
        &self,
        device_id: &DeviceId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Measurement>> {
        sqlx::query_as::<_, MeasurementRow>(&format!(
            "{SELECT_MEASUREMENT} WHERE device_id = ? AND received_at >= ? ORDER BY received_at"
        ))
        .bind(device_id.as_str())
        .bind(to_db_time(since))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(MeasurementRow::into_measurement)
        .collect()
    }

    async fn count(&self) -> StorageResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM measurements")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
