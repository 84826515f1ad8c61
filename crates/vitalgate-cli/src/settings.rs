//! Gateway configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file,
//! then `VITALGATE__<SECTION>__<KEY>` environment variables. Every section
//! is owned by the crate that uses it; this module only stitches them
//! together.
//!
//! ```toml
//! [devices]
//! listen = ["0.0.0.0:2575"]
//!
//! [database]
//! path = "/var/lib/vitalgate/vitalgate.db"
//!
//! [sync.api]
//! base_url = "https://clinic.example.com"
//! location_id = "hq"
//!
//! [sync.backoff]
//! max_attempts = 12
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use vitalgate_hardware::{DiscoveryConfig, ManagerConfig};
use vitalgate_storage::DatabaseConfig;
use vitalgate_sync::{BackoffPolicy, SyncApiConfig, SyncWorkerConfig};

const ENV_PREFIX: &str = "VITALGATE";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub devices: DiscoveryConfig,
    pub manager: ManagerConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
}

/// The `sync` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Run the sync worker inside `vitalgate run`.
    pub enabled: bool,
    pub api: SyncApiConfig,
    pub backoff: BackoffPolicy,
    pub worker: SyncWorkerConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api: SyncApiConfig::default(),
            backoff: BackoffPolicy::default(),
            worker: SyncWorkerConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load from `path` (if given) and the process environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`GatewayConfig::load`], reading variables from `env` instead of
    /// the process environment when it is `Some`.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                bail!("configuration file {} does not exist", path.display());
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(env),
        );

        let settings: GatewayConfig = builder
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values no component can run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.path.trim().is_empty() {
            bail!("database.path must not be empty");
        }
        if self.manager.channel_capacity == 0 {
            bail!("manager.channel_capacity must be at least 1");
        }
        if self.sync.enabled && self.sync.api.location_id.is_empty() {
            tracing::warn!("sync.api.location_id is empty; the API may reject submissions");
        }
        Ok(())
    }
}
