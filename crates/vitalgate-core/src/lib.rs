pub mod constants;
pub mod device;
pub mod duration;
pub mod error;
pub mod phone;
pub mod sync_job;
pub mod types;

pub use device::{DeviceConfig, DeviceRecord, DeviceState, DeviceStatus};
pub use error::{Error, Result};
pub use phone::extract_phone;
pub use sync_job::{SyncJob, SyncStatus};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
