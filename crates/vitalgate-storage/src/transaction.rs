//! Transaction-aware operations for atomic multistep writes.
//!
//! These functions accept a SQLite transaction reference so several of
//! them can be grouped into one atomic unit. The persistence contract needs
//! exactly that: a measurement row must never exist without its sync job.
//!
//! ```no_run
//! use vitalgate_storage::{Database, transaction};
//! # use vitalgate_core::Measurement;
//!
//! # async fn example(db: Database, measurement: Measurement) -> Result<(), Box<dyn std::error::Error>> {
//! let mut tx = db.pool().begin().await?;
//! transaction::insert_measurement(&mut tx, &measurement).await?;
//! transaction::enqueue_sync(&mut tx, measurement.id(), chrono::Utc::now()).await?;
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Dropping the transaction without `commit()` rolls everything back.

use crate::error::{StorageError, StorageResult};
use crate::models::{MeasurementRow, SyncJobRow, to_db_time};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use vitalgate_core::{MeasurementId, SyncJob};

/// Insert a measurement row.
///
/// Returns `false` when a row with the same id already exists; the stored
/// row is left untouched because ids are immutable.
pub async fn insert_measurement(
    tx: &mut Transaction<'_, Sqlite>,
    measurement: &vitalgate_core::Measurement,
) -> StorageResult<bool> {
    let row = MeasurementRow::from_measurement(measurement)?;
    let result = sqlx::query(
        r#"
        INSERT INTO measurements (
            id, device_id, device_type, customer_phone,
            captured_at, received_at, quality,
            fields, raw_unmapped, raw
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(&row.id)
    .bind(&row.device_id)
    .bind(&row.device_type)
    .bind(&row.customer_phone)
    .bind(&row.captured_at)
    .bind(&row.received_at)
    .bind(&row.quality)
    .bind(&row.fields)
    .bind(&row.raw_unmapped)
    .bind(&row.raw)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Create a pending sync job due at `now`.
///
/// Idempotent: when a job for the measurement already exists, whatever its
/// status, nothing changes and `false` is returned.
pub async fn enqueue_sync(
    tx: &mut Transaction<'_, Sqlite>,
    measurement_id: MeasurementId,
    now: DateTime<Utc>,
) -> StorageResult<bool> {
    let now = to_db_time(now);
    let result = sqlx::query(
        r#"
        INSERT INTO sync_jobs (
            measurement_id, status, attempts, next_attempt_at, created_at, updated_at
        )
        VALUES (?, 'pending', 0, ?, ?, ?)
        ON CONFLICT (measurement_id) DO NOTHING
        "#,
    )
    .bind(measurement_id.to_string())
    .bind(&now)
    .bind(&now)
    .bind(&now)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Load a sync job inside the transaction.
pub async fn find_sync_job(
    tx: &mut Transaction<'_, Sqlite>,
    measurement_id: MeasurementId,
) -> StorageResult<Option<SyncJob>> {
    sqlx::query_as::<_, SyncJobRow>(
        r#"
        SELECT measurement_id, status, attempts, next_attempt_at,
               last_error, remote_id, claimed_at, created_at, updated_at
        FROM sync_jobs
        WHERE measurement_id = ?
        "#,
    )
    .bind(measurement_id.to_string())
    .fetch_optional(&mut **tx)
    .await?
    .map(SyncJobRow::into_job)
    .transpose()
}

/// Overwrite a sync job with `job`.
///
/// The stored status may only move along the forward edges of
/// [`vitalgate_core::SyncStatus::can_transition_to`] (or stay put).
///
/// # Errors
///
/// - `StorageError::NotFound` if no job exists for the measurement
/// - `StorageError::InvalidTransition` for a backward move
pub async fn update_sync_job(tx: &mut Transaction<'_, Sqlite>, job: &SyncJob) -> StorageResult<()> {
    let current = find_sync_job(tx, job.measurement_id)
        .await?
        .ok_or_else(|| StorageError::not_found("sync_job", "measurement_id", job.measurement_id))?;

    if current.status != job.status && !current.status.can_transition_to(&job.status) {
        return Err(StorageError::InvalidTransition {
            measurement_id: job.measurement_id.to_string(),
            from: current.status.to_string(),
            to: job.status.to_string(),
        });
    }

    sqlx::query(
        r#"
        UPDATE sync_jobs
        SET status = ?, attempts = ?, next_attempt_at = ?, last_error = ?,
            remote_id = ?, claimed_at = ?, updated_at = ?
        WHERE measurement_id = ?
        "#,
    )
    .bind(job.status.as_str())
    .bind(i64::from(job.attempts))
    .bind(to_db_time(job.next_attempt_at))
    .bind(&job.last_error)
    .bind(&job.remote_id)
    .bind(job.claimed_at.map(to_db_time))
    .bind(to_db_time(job.updated_at))
    .bind(job.measurement_id.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(())
}
