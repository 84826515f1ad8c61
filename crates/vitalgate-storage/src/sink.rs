//! [`MeasurementSink`] backed by the database.

use crate::Database;
use crate::error::StorageError;
use crate::repositories::{MeasurementRepository, SqliteMeasurementRepository};
use vitalgate_core::Measurement;
use vitalgate_hardware::MeasurementSink;

/// Saves every measurement the device manager accepts and queues it for
/// sync, atomically.
#[derive(Debug, Clone)]
pub struct StorageSink {
    measurements: SqliteMeasurementRepository,
}

impl StorageSink {
    pub fn new(db: &Database) -> Self {
        Self {
            measurements: SqliteMeasurementRepository::new(db.pool().clone()),
        }
    }
}

impl MeasurementSink for StorageSink {
    type Error = StorageError;

    async fn persist(&self, measurement: &Measurement) -> Result<(), StorageError> {
        self.measurements.save_and_enqueue(measurement).await?;
        Ok(())
    }
}
