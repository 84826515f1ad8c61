//! Delivery of stored measurements to the upstream API.
//!
//! - [`api`]: the [`SyncApi`] seam and its HTTP implementation
//! - [`backoff`]: exponential retry delays with jitter
//! - [`worker`]: the [`SyncWorker`] that drains the queue
//!
//! Errors are classified once, by the API client, into transient and
//! permanent failures; the worker retries the former until the backoff
//! budget runs out and parks the latter as `permanently_failed` for an
//! operator.

pub mod api;
pub mod backoff;
pub mod error;
pub mod worker;

pub use api::{HttpSyncApi, MeasurementPayload, SubmitReceipt, SyncApi, SyncApiConfig};
pub use backoff::{BackoffPolicy, Jitter};
pub use error::{Result, SyncError};
pub use worker::{DrainReport, SyncWorker, SyncWorkerConfig};
