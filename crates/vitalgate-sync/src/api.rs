//! Client for the upstream measurement API.
//!
//! Every submission carries the measurement id as its idempotency key, so
//! the remote side can drop duplicates when a delivery is repeated after a
//! crash or a lost response.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::SecondsFormat;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vitalgate_core::{FieldValue, Measurement, UnmappedField};

use crate::error::{Result, SyncError};

/// Path of the submission endpoint under `base_url`.
pub const MEASUREMENTS_PATH: &str = "/api/body-composition-measurements";

/// What the remote side answered for an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Remote entity id.
    pub remote_id: String,
    /// The remote side already had this measurement.
    pub duplicate: bool,
}

/// The one call the sync worker needs from the upstream system.
pub trait SyncApi: Send + Sync {
    fn submit(
        &self,
        measurement: &Measurement,
    ) -> impl Future<Output = Result<SubmitReceipt>> + Send;
}

/// Connection settings for [`HttpSyncApi`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub location_id: String,
    #[serde(with = "vitalgate_core::duration")]
    pub request_timeout: Duration,
}

impl Default for SyncApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_key: String::new(),
            location_id: String::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for SyncApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("location_id", &self.location_id)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl SyncApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    #[must_use]
    pub fn location_id(mut self, id: impl Into<String>) -> Self {
        self.location_id = id.into();
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}{MEASUREMENTS_PATH}", self.base_url.trim_end_matches('/'))
    }
}

/// Request body of one submission.
#[derive(Debug, Serialize)]
pub struct MeasurementPayload<'a> {
    pub measurement_uuid: String,
    pub location_id: &'a str,
    pub device_id: &'a str,
    pub device_type: &'static str,
    pub customer_phone: Option<&'a str>,
    pub measurement_date: String,
    pub quality: &'static str,
    pub body_composition: &'a BTreeMap<String, FieldValue>,
    pub raw_unmapped: &'a [UnmappedField],
}

impl<'a> MeasurementPayload<'a> {
    pub fn new(measurement: &'a Measurement, location_id: &'a str) -> Self {
        Self {
            measurement_uuid: measurement.id().to_string(),
            location_id,
            device_id: measurement.device_id.as_str(),
            device_type: measurement.device_type.as_str(),
            customer_phone: measurement.customer_phone.as_deref(),
            measurement_date: measurement
                .captured_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            quality: measurement.quality.as_str(),
            body_composition: &measurement.fields,
            raw_unmapped: &measurement.raw_unmapped,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteEntity {
    id: serde_json::Value,
}

/// Pull the remote id out of a response body, accepting string or numeric ids.
fn remote_id(body: &str) -> Option<String> {
    let entity: RemoteEntity = serde_json::from_str(body).ok()?;
    match entity.id {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// [`SyncApi`] over HTTPS with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpSyncApi {
    client: Client,
    endpoint: String,
    config: SyncApiConfig,
}

impl HttpSyncApi {
    /// Build the client.
    ///
    /// # Errors
    ///
    /// `SyncError::Configuration` when the base url is not http(s) or the
    /// TLS backend cannot be initialised.
    pub fn new(config: SyncApiConfig) -> Result<Self> {
        if !(config.base_url.starts_with("http://") || config.base_url.starts_with("https://")) {
            return Err(SyncError::Configuration(format!(
                "base_url must be an http(s) URL, got '{}'",
                config.base_url
            )));
        }
        if config.api_key.is_empty() {
            warn!("Sync API key is empty; the remote side will likely reject submissions");
        }

        let client = ClientBuilder::new()
            .timeout(config.request_timeout)
            .user_agent(format!("vitalgate/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint(),
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SyncApi for HttpSyncApi {
    async fn submit(&self, measurement: &Measurement) -> Result<SubmitReceipt> {
        let id = measurement.id().to_string();
        let payload = MeasurementPayload::new(measurement, &self.config.location_id);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .header("X-Location-ID", &self.config.location_id)
            .header("Idempotency-Key", &id)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(measurement_id = %id, status = status.as_u16(), "Sync API responded");

        if status.is_success() {
            let remote_id = remote_id(&body).ok_or_else(|| SyncError::Permanent {
                message: format!("success response without an id: {body}"),
                status: Some(status.as_u16()),
            })?;
            return Ok(SubmitReceipt {
                remote_id,
                duplicate: false,
            });
        }

        if status == StatusCode::CONFLICT
            && let Some(remote_id) = remote_id(&body)
        {
            debug!(
                measurement_id = %id,
                remote_id = %remote_id,
                "Measurement already known upstream"
            );
            return Ok(SubmitReceipt {
                remote_id,
                duplicate: true,
            });
        }

        Err(SyncError::from_status(status.as_u16(), &body))
    }
}
