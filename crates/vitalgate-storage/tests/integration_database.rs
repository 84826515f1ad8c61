//! Integration tests for database connection, migrations and atomic writes.

mod common;

use chrono::SubsecRound;
use common::{count, measurement};
use std::sync::Arc;
use tokio::sync::Barrier;
use vitalgate_core::MeasurementId;
use vitalgate_hardware::MeasurementSink;
use vitalgate_storage::connection::{Database, DatabaseConfig};
use vitalgate_storage::{
    MeasurementRepository, SqliteMeasurementRepository, StorageError, StorageSink, transaction,
};

#[tokio::test]
async fn test_in_memory_database() {
    let db = Database::in_memory().await.unwrap();
    db.health_check().await.unwrap();
    db.close().await;
}

#[tokio::test]
async fn test_migration_idempotency() {
    let db = Database::in_memory().await.unwrap();

    db.migrate().await.unwrap();
    db.migrate().await.unwrap();

    let result: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('measurements', 'sync_jobs')",
    )
    .fetch_one(db.pool())
    .await
    .unwrap();

    assert_eq!(result.0, 2);
    db.close().await;
}

#[tokio::test]
async fn test_file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("vitalgate.db");
    let config = DatabaseConfig::new(path.to_string_lossy()).max_connections(2);

    let m = measurement("tanita_ttyUSB0", 76.6);
    {
        let db = Database::new(config.clone()).await.unwrap();
        let repo = SqliteMeasurementRepository::new(db.pool().clone());
        assert!(repo.save_and_enqueue(&m).await.unwrap());
        db.close().await;
    }

    let db = Database::new(config).await.unwrap();
    let repo = SqliteMeasurementRepository::new(db.pool().clone());
    let loaded = repo.find(m.id()).await.unwrap().unwrap();
    assert_eq!(loaded, m);
    assert_eq!(count(&db, "sync_jobs").await, 1);
    db.close().await;
}

#[tokio::test]
async fn test_measurement_and_job_commit_together() {
    let db = Database::in_memory().await.unwrap();
    let repo = SqliteMeasurementRepository::new(db.pool().clone());

    let m = measurement("tanita_ttyUSB0", 70.0);
    assert!(repo.save_and_enqueue(&m).await.unwrap());
    // Saving again changes nothing.
    assert!(!repo.save_and_enqueue(&m).await.unwrap());

    assert_eq!(count(&db, "measurements").await, 1);
    assert_eq!(count(&db, "sync_jobs").await, 1);
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_enqueue_rolls_back_measurement() {
    let db = Database::in_memory().await.unwrap();

    let m = measurement("tanita_ttyUSB0", 70.0);
    {
        let mut tx = db.pool().begin().await.unwrap();
        assert!(transaction::insert_measurement(&mut tx, &m).await.unwrap());
        // A job for a measurement that does not exist violates the foreign key.
        let err = transaction::enqueue_sync(&mut tx, MeasurementId::new(), chrono::Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Database(_)));
        // Dropped without commit.
    }

    assert_eq!(count(&db, "measurements").await, 0);
    assert_eq!(count(&db, "sync_jobs").await, 0);
}

#[tokio::test]
async fn test_find_by_device_and_recent() {
    let db = Database::in_memory().await.unwrap();
    let repo = SqliteMeasurementRepository::new(db.pool().clone());
    let since = chrono::Utc::now() - chrono::Duration::seconds(1);

    for (device, weight) in [
        ("tanita_ttyUSB0", 70.0),
        ("tanita_ttyUSB1", 80.0),
        ("tanita_ttyUSB0", 71.0),
    ] {
        let mut m = measurement(device, weight);
        m.received_at = chrono::Utc::now().trunc_subsecs(6);
        repo.save_and_enqueue(&m).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let device = vitalgate_core::DeviceId::new("tanita_ttyUSB0").unwrap();
    let weights: Vec<f64> = repo
        .find_by_device(&device, since)
        .await
        .unwrap()
        .iter()
        .filter_map(|m| m.number("weight_kg"))
        .collect();
    assert_eq!(weights, vec![70.0, 71.0]);

    let recent = repo.recent(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].number("weight_kg"), Some(71.0));
}

#[tokio::test]
async fn test_sink_persists_and_queues() {
    let db = Database::in_memory().await.unwrap();
    let sink = StorageSink::new(&db);

    let m = measurement("inbody_0.0.0.0_2575", 64.2);
    sink.persist(&m).await.unwrap();
    sink.persist(&m).await.unwrap();

    assert_eq!(count(&db, "measurements").await, 1);
    let (status,): (String,) =
        sqlx::query_as("SELECT status FROM sync_jobs WHERE measurement_id = ?")
            .bind(m.id().to_string())
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(status, "pending");
}

#[tokio::test]
async fn test_concurrent_saves_on_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("concurrent.db");
    let db = Database::new(DatabaseConfig::new(path.to_string_lossy()).max_connections(4))
        .await
        .unwrap();

    const TASKS: usize = 8;
    let barrier = Arc::new(Barrier::new(TASKS));
    let mut handles = vec![];

    for i in 0..TASKS {
        let repo = SqliteMeasurementRepository::new(db.pool().clone());
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let m = measurement("tanita_ttyUSB0", 60.0 + i as f64);
            repo.save_and_enqueue(&m).await.unwrap()
        }));
    }

    let results = futures::future::join_all(handles).await;
    assert!(results.into_iter().all(|r| r.unwrap()));
    assert_eq!(count(&db, "measurements").await, TASKS as i64);
    assert_eq!(count(&db, "sync_jobs").await, TASKS as i64);
    db.close().await;
}
