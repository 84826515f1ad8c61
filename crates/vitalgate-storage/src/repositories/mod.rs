pub mod measurement;
pub mod sync_queue;

pub use measurement::{MeasurementRepository, SqliteMeasurementRepository};
pub use sync_queue::{SqliteSyncQueue, SyncQueue};
