//! Drains the sync queue into the upstream API.
//!
//! A worker claims one due job at a time, submits its measurement and
//! records the outcome. Several workers may share a database; the queue's
//! atomic claim keeps them from submitting the same job concurrently.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vitalgate_core::{MeasurementId, SyncJob};
use vitalgate_storage::{
    Database, MeasurementRepository, SqliteMeasurementRepository, SqliteSyncQueue, SyncQueue,
};

use crate::api::SyncApi;
use crate::backoff::BackoffPolicy;
use crate::error::{Result, SyncError};

/// Worker timing. Part of the `sync` section of the gateway config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncWorkerConfig {
    /// Idle time between passes when nothing is due.
    #[serde(with = "vitalgate_core::duration")]
    pub poll_interval: Duration,
    /// In-flight jobs claimed longer ago than this are assumed abandoned.
    /// Checked at startup and then once per period.
    #[serde(with = "vitalgate_core::duration")]
    pub stale_after: Duration,
    /// Jobs processed per pass before the worker checks for cancellation.
    pub batch_size: usize,
}

impl Default for SyncWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(300),
            batch_size: 50,
        }
    }
}

impl SyncWorkerConfig {
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn stale_after(mut self, after: Duration) -> Self {
        self.stale_after = after;
        self
    }

    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }
}

/// Outcome counts of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub delivered: usize,
    pub retried: usize,
    pub failed: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.delivered + self.retried + self.failed
    }
}

enum Outcome {
    Delivered,
    Retried,
    Failed,
}

pub struct SyncWorker<A> {
    queue: SqliteSyncQueue,
    measurements: SqliteMeasurementRepository,
    api: A,
    backoff: BackoffPolicy,
    config: SyncWorkerConfig,
}

impl<A: SyncApi> SyncWorker<A> {
    pub fn new(db: &Database, api: A, backoff: BackoffPolicy, config: SyncWorkerConfig) -> Self {
        Self {
            queue: SqliteSyncQueue::new(db.pool().clone()),
            measurements: SqliteMeasurementRepository::new(db.pool().clone()),
            api,
            backoff,
            config,
        }
    }

    pub fn queue(&self) -> &SqliteSyncQueue {
        &self.queue
    }

    /// Return jobs abandoned by a previous run to `pending`.
    pub async fn reset_stale(&self) -> Result<u64> {
        let now = Utc::now();
        let Some(cutoff) = chrono::Duration::from_std(self.config.stale_after)
            .ok()
            .and_then(|d| now.checked_sub_signed(d))
        else {
            return Ok(0);
        };
        Ok(self.queue.reset_stale_in_flight(cutoff, now).await?)
    }

    /// Process every job that is due now.
    pub async fn drain_once(&self) -> Result<DrainReport> {
        self.drain(usize::MAX, &CancellationToken::new()).await
    }

    /// Reset stale jobs, then drain until `cancel` fires.
    ///
    /// A delivery interrupted by cancellation is released back to the queue
    /// instead of waiting for the stale threshold. Stale leases are swept
    /// again every `stale_after` while the worker runs.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let reset = self.reset_stale().await?;
        info!(
            reset,
            poll_interval = ?self.config.poll_interval,
            max_attempts = self.backoff.max_attempts,
            "Sync worker started"
        );
        let mut next_sweep = Instant::now() + self.config.stale_after;

        while !cancel.is_cancelled() {
            if Instant::now() >= next_sweep {
                match self.reset_stale().await {
                    Ok(0) => {}
                    Ok(reset) => warn!(reset, "Stale in-flight jobs returned to the queue"),
                    Err(e) => error!(error = %e, "Stale job sweep failed"),
                }
                next_sweep = Instant::now() + self.config.stale_after;
            }

            match self.drain(self.config.batch_size, &cancel).await {
                Ok(report) if report.total() >= self.config.batch_size => continue,
                Ok(report) => {
                    if report.total() > 0 {
                        info!(
                            delivered = report.delivered,
                            retried = report.retried,
                            failed = report.failed,
                            "Sync pass finished"
                        );
                    }
                }
                Err(e) => error!(error = %e, "Sync pass aborted"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("Sync worker stopped");
        Ok(())
    }

    async fn drain(&self, limit: usize, cancel: &CancellationToken) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        while report.total() < limit && !cancel.is_cancelled() {
            let Some(job) = self.queue.claim_next(Utc::now()).await? else {
                break;
            };
            let (id, attempts) = (job.measurement_id, job.attempts);
            match self.process(job, cancel).await {
                Ok(Some(Outcome::Delivered)) => report.delivered += 1,
                Ok(Some(Outcome::Retried)) => report.retried += 1,
                Ok(Some(Outcome::Failed)) => report.failed += 1,
                Ok(None) => break,
                Err(e) => {
                    self.release(id, attempts, &e).await;
                    return Err(e);
                }
            }
        }
        Ok(report)
    }

    /// Deliver one claimed job. `None` means the attempt was abandoned
    /// because of cancellation.
    async fn process(&self, job: SyncJob, cancel: &CancellationToken) -> Result<Option<Outcome>> {
        let id = job.measurement_id;

        let measurement = match self.measurements.find(id).await {
            Ok(Some(measurement)) => measurement,
            Ok(None) => {
                self.queue
                    .mark_permanently_failed(id, "measurement row missing", Utc::now())
                    .await?;
                return Ok(Some(Outcome::Failed));
            }
            Err(e) if e.is_corrupt_row() => {
                error!(measurement_id = %id, error = %e, "Stored measurement is unreadable");
                let reason = format!("measurement row unreadable: {e}");
                self.queue
                    .mark_permanently_failed(id, &reason, Utc::now())
                    .await?;
                return Ok(Some(Outcome::Failed));
            }
            Err(e) => return Err(e.into()),
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(measurement_id = %id, "Delivery interrupted; releasing job");
                self.queue.reschedule(id, "interrupted by shutdown", Utc::now(), Utc::now()).await?;
                return Ok(None);
            }
            result = self.api.submit(&measurement) => result,
        };

        let now = Utc::now();
        match result {
            Ok(receipt) => {
                self.queue.mark_delivered(id, &receipt.remote_id, now).await?;
                info!(
                    measurement_id = %id,
                    remote_id = %receipt.remote_id,
                    duplicate = receipt.duplicate,
                    attempt = job.attempts,
                    "Measurement delivered"
                );
                Ok(Some(Outcome::Delivered))
            }
            Err(e) if e.is_retryable() && !self.backoff.exhausted(job.attempts) => {
                let delay = self.backoff.delay(job.attempts);
                self.queue
                    .reschedule(id, &e.to_string(), retry_at(now, delay), now)
                    .await?;
                warn!(
                    measurement_id = %id,
                    attempt = job.attempts,
                    retry_in = ?delay,
                    error = %e,
                    "Delivery failed; will retry"
                );
                Ok(Some(Outcome::Retried))
            }
            Err(e) => {
                let reason = if e.is_retryable() {
                    format!("gave up after {} attempts: {e}", job.attempts)
                } else {
                    e.to_string()
                };
                self.queue.mark_permanently_failed(id, &reason, now).await?;
                Ok(Some(Outcome::Failed))
            }
        }
    }

    /// Hand a job back after `process` failed on local storage, so it does
    /// not stay leased until the next stale sweep. The attempt already
    /// counts against the retry budget.
    async fn release(&self, id: MeasurementId, attempts: u32, cause: &SyncError) {
        let now = Utc::now();
        let released = if self.backoff.exhausted(attempts) {
            let reason = format!("gave up after {attempts} attempts: {cause}");
            self.queue.mark_permanently_failed(id, &reason, now).await
        } else {
            let next = retry_at(now, self.backoff.delay(attempts));
            self.queue.reschedule(id, &cause.to_string(), next, now).await
        };
        match released {
            Ok(()) => warn!(measurement_id = %id, error = %cause, "Job released after storage failure"),
            Err(e) => error!(
                measurement_id = %id,
                error = %e,
                "Cannot release job; it stays in flight until the stale sweep"
            ),
        }
    }
}

fn retry_at(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now)
}
