//! Storage layer for the vitalgate gateway.
//!
//! SQLite-backed persistence for decoded measurements and the durable sync
//! queue that delivers them upstream.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool manager with embedded migrations
//! - [`MeasurementRepository`] - append-only measurement store
//! - [`SyncQueue`] - delivery jobs, one per measurement
//! - [`transaction`] - building blocks for atomic multi-table writes
//! - [`StorageSink`] - plugs the store into the device manager
//!
//! # Guarantees
//!
//! - A measurement row and its sync job are written in one transaction.
//! - `sync_jobs.measurement_id` is unique, so enqueue is idempotent.
//! - Jobs are claimed with a single conditional `UPDATE`; two workers never
//!   hold the same job.
//!
//! # Example
//!
//! ```no_run
//! use vitalgate_storage::{Database, DatabaseConfig, SqliteSyncQueue, SyncQueue};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("vitalgate.db")).await?;
//! let queue = SqliteSyncQueue::new(db.pool().clone());
//!
//! let counts = queue.counts().await?;
//! println!("{} jobs waiting, {} need attention", counts.open(), counts.permanently_failed);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;
pub mod sink;
pub mod transaction;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{MeasurementRow, SyncCounts, SyncJobRow};
pub use repositories::{
    MeasurementRepository, SqliteMeasurementRepository, SqliteSyncQueue, SyncQueue,
};
pub use sink::StorageSink;
