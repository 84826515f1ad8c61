#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use crate::models::{SyncCounts, SyncJobRow, to_db_time};
use crate::transaction;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info, warn};
use vitalgate_core::{MeasurementId, SyncJob, SyncStatus};

/// Durable queue of measurements awaiting delivery.
///
/// Every state change is a single conditional `UPDATE`, so several workers
/// can share one queue: a job is only ever claimed by one of them.
pub trait SyncQueue: Send + Sync {
    /// Queue a measurement for delivery. A no-op when a job already exists.
    async fn enqueue(&self, measurement_id: MeasurementId) -> StorageResult<bool>;

    /// Claim the job with the earliest `next_attempt_at <= now`, moving it
    /// to `in_flight` and counting the attempt.
    async fn claim_next(&self, now: DateTime<Utc>) -> StorageResult<Option<SyncJob>>;

    /// `in_flight` → `delivered`.
    async fn mark_delivered(
        &self,
        measurement_id: MeasurementId,
        remote_id: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// `in_flight` → `pending`, due again at `next_attempt_at`.
    async fn reschedule(
        &self,
        measurement_id: MeasurementId,
        error: &str,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// `in_flight` → `permanently_failed`.
    async fn mark_permanently_failed(
        &self,
        measurement_id: MeasurementId,
        error: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Return `in_flight` jobs claimed before `claimed_before` to `pending`.
    async fn reset_stale_in_flight(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<u64>;

    /// Operator action: `permanently_failed` → `pending` with zero attempts.
    async fn requeue_failed(
        &self,
        measurement_id: MeasurementId,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    async fn get(&self, measurement_id: MeasurementId) -> StorageResult<Option<SyncJob>>;

    /// Jobs still owed to the remote side, earliest due first.
    async fn load_pending(&self) -> StorageResult<Vec<SyncJob>>;

    /// Overwrite a job, refusing backward status moves.
    async fn update(&self, job: &SyncJob) -> StorageResult<()>;

    async fn counts(&self) -> StorageResult<SyncCounts>;

    /// Most recently updated jobs, optionally filtered by status.
    async fn list(&self, status: Option<SyncStatus>, limit: i64) -> StorageResult<Vec<SyncJob>>;
}

/// SQLite implementation of SyncQueue
#[derive(Debug, Clone)]
pub struct SqliteSyncQueue {
    pool: SqlitePool,
}

impl SqliteSyncQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Explain why a conditional update touched no row.
    async fn transition_error(
        &self,
        measurement_id: MeasurementId,
        target: SyncStatus,
    ) -> StorageError {
        match self.get(measurement_id).await {
            Ok(Some(job)) => StorageError::InvalidTransition {
                measurement_id: measurement_id.to_string(),
                from: job.status.to_string(),
                to: target.to_string(),
            },
            Ok(None) => StorageError::not_found("sync_job", "measurement_id", measurement_id),
            Err(e) => e,
        }
    }

    /// Run a single-row status change whose `WHERE` clause pins the current
    /// status. The measurement id is bound last.
    async fn guarded_update(
        &self,
        sql: &str,
        measurement_id: MeasurementId,
        target: SyncStatus,
        binds: &[Option<String>],
    ) -> StorageResult<()> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(value.clone());
        }
        let result = query
            .bind(measurement_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(measurement_id, target).await);
        }
        Ok(())
    }
}

const JOB_COLUMNS: &str = "measurement_id, status, attempts, next_attempt_at, \
     last_error, remote_id, claimed_at, created_at, updated_at";

impl SyncQueue for SqliteSyncQueue {
    async fn enqueue(&self, measurement_id: MeasurementId) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await?;
        let created = transaction::enqueue_sync(&mut tx, measurement_id, Utc::now()).await?;
        tx.commit().await?;
        if !created {
            debug!(measurement_id = %measurement_id, "Sync job already queued");
        }
        Ok(created)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> StorageResult<Option<SyncJob>> {
        let now = to_db_time(now);
        let sql = format!(
            r#"
            UPDATE sync_jobs
            SET status = 'in_flight', attempts = attempts + 1, claimed_at = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM sync_jobs
                WHERE status = 'pending' AND next_attempt_at <= ?
                ORDER BY next_attempt_at, id
                LIMIT 1
            )
            AND status = 'pending'
            RETURNING {JOB_COLUMNS}
            "#
        );
        sqlx::query_as::<_, SyncJobRow>(&sql)
            .bind(&now)
            .bind(&now)
            .bind(&now)
            .fetch_optional(&self.pool)
            .await?
            .map(SyncJobRow::into_job)
            .transpose()
    }

    async fn mark_delivered(
        &self,
        measurement_id: MeasurementId,
        remote_id: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.guarded_update(
            r#"
            UPDATE sync_jobs
            SET status = 'delivered', remote_id = ?, last_error = NULL,
                claimed_at = NULL, updated_at = ?
            WHERE measurement_id = ? AND status = 'in_flight'
            "#,
            measurement_id,
            SyncStatus::Delivered,
            &[Some(remote_id.to_string()), Some(to_db_time(now))],
        )
        .await
    }

    async fn reschedule(
        &self,
        measurement_id: MeasurementId,
        error: &str,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.guarded_update(
            r#"
            UPDATE sync_jobs
            SET status = 'pending', last_error = ?, next_attempt_at = ?,
                claimed_at = NULL, updated_at = ?
            WHERE measurement_id = ? AND status = 'in_flight'
            "#,
            measurement_id,
            SyncStatus::Pending,
            &[
                Some(error.to_string()),
                Some(to_db_time(next_attempt_at)),
                Some(to_db_time(now)),
            ],
        )
        .await
    }

    async fn mark_permanently_failed(
        &self,
        measurement_id: MeasurementId,
        error: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.guarded_update(
            r#"
            UPDATE sync_jobs
            SET status = 'permanently_failed', last_error = ?,
                claimed_at = NULL, updated_at = ?
            WHERE measurement_id = ? AND status = 'in_flight'
            "#,
            measurement_id,
            SyncStatus::PermanentlyFailed,
            &[Some(error.to_string()), Some(to_db_time(now))],
        )
        .await?;
        warn!(measurement_id = %measurement_id, error, "Sync job permanently failed");
        Ok(())
    }

    async fn reset_stale_in_flight(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let now = to_db_time(now);
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs
            SET status = 'pending', claimed_at = NULL, next_attempt_at = ?, updated_at = ?
            WHERE status = 'in_flight' AND (claimed_at IS NULL OR claimed_at <= ?)
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(to_db_time(claimed_before))
        .execute(&self.pool)
        .await?;

        let reset = result.rows_affected();
        if reset > 0 {
            info!(reset, "Stale in-flight sync jobs returned to pending");
        }
        Ok(reset)
    }

    async fn requeue_failed(
        &self,
        measurement_id: MeasurementId,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let now = to_db_time(now);
        self.guarded_update(
            r#"
            UPDATE sync_jobs
            SET status = 'pending', attempts = 0, next_attempt_at = ?,
                claimed_at = NULL, updated_at = ?
            WHERE measurement_id = ? AND status = 'permanently_failed'
            "#,
            measurement_id,
            SyncStatus::Pending,
            &[Some(now.clone()), Some(now)],
        )
        .await?;
        info!(measurement_id = %measurement_id, "Failed sync job requeued");
        Ok(())
    }

    async fn get(&self, measurement_id: MeasurementId) -> StorageResult<Option<SyncJob>> {
        sqlx::query_as::<_, SyncJobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM sync_jobs WHERE measurement_id = ?"
        ))
        .bind(measurement_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .map(SyncJobRow::into_job)
        .transpose()
    }

    async fn load_pending(&self) -> StorageResult<Vec<SyncJob>> {
        sqlx::query_as::<_, SyncJobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM sync_jobs \
             WHERE status IN ('pending', 'in_flight') \
             ORDER BY next_attempt_at, id"
        ))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(SyncJobRow::into_job)
        .collect()
    }

    async fn update(&self, job: &SyncJob) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        transaction::update_sync_job(&mut tx, job).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn counts(&self) -> StorageResult<SyncCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM sync_jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = SyncCounts::default();
        for (status, count) in rows {
            let status = SyncStatus::from_str(&status)
                .map_err(|e| StorageError::invalid_data("status", e))?;
            counts.add(status, u64::try_from(count).unwrap_or_default());
        }
        Ok(counts)
    }

    async fn list(&self, status: Option<SyncStatus>, limit: i64) -> StorageResult<Vec<SyncJob>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, SyncJobRow>(&format!(
                    "SELECT {JOB_COLUMNS} FROM sync_jobs WHERE status = ? \
                     ORDER BY updated_at DESC, id DESC LIMIT ?"
                ))
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, SyncJobRow>(&format!(
                    "SELECT {JOB_COLUMNS} FROM sync_jobs ORDER BY updated_at DESC, id DESC LIMIT ?"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(SyncJobRow::into_job).collect()
    }
}
