//! `vitalgate queue` and `vitalgate requeue`: operator views of the sync
//! queue. Both work on the database alone and are safe to run next to a
//! live gateway.

use std::fmt::Write as _;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use vitalgate_core::{MeasurementId, SyncJob, SyncStatus};
use vitalgate_storage::{Database, DatabaseConfig, SqliteSyncQueue, SyncCounts, SyncQueue};

pub async fn show(
    config: &DatabaseConfig,
    status: Option<SyncStatus>,
    limit: i64,
) -> anyhow::Result<()> {
    let db = Database::new(config.clone()).await?;
    let queue = SqliteSyncQueue::new(db.pool().clone());
    let counts = queue.counts().await?;
    let jobs = queue.list(status, limit.max(1)).await?;
    db.close().await;

    print!("{}", render(&counts, &jobs));
    Ok(())
}

pub async fn requeue(config: &DatabaseConfig, measurement_id: &str) -> anyhow::Result<()> {
    let id: MeasurementId = measurement_id
        .parse()
        .with_context(|| format!("'{measurement_id}' is not a measurement id"))?;

    let db = Database::new(config.clone()).await?;
    let queue = SqliteSyncQueue::new(db.pool().clone());
    let result = queue.requeue_failed(id, Utc::now()).await;
    db.close().await;
    result.with_context(|| format!("cannot requeue {id}"))?;

    println!("{id} requeued");
    Ok(())
}

fn render(counts: &SyncCounts, jobs: &[SyncJob]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "pending: {}  in_flight: {}  delivered: {}  permanently_failed: {}",
        counts.pending, counts.in_flight, counts.delivered, counts.permanently_failed
    );
    if jobs.is_empty() {
        return out;
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<36}  {:<18}  {:>8}  {:<24}  LAST ERROR",
        "MEASUREMENT", "STATUS", "ATTEMPTS", "NEXT ATTEMPT"
    );
    for job in jobs {
        let next = match job.status {
            SyncStatus::Pending => job.next_attempt_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            _ => "-".to_string(),
        };
        let _ = writeln!(
            out,
            "{:<36}  {:<18}  {:>8}  {:<24}  {}",
            job.measurement_id.to_string(),
            job.status.as_str(),
            job.attempts,
            next,
            job.last_error.as_deref().unwrap_or("-")
        );
    }
    out
}
