//! Session configuration.

use crate::error::SessionResult;
use parley_transport::{DatacenterId, RetryPolicy};
use parley_types::DEFAULT_DATACENTER_ID;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DAY_SECS: i64 = 60 * 60 * 24;

/// Tunables of one account session.
///
/// Every field has a default, so a JSON document only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Datacenter used when no state has been stored yet.
    pub bootstrap_datacenter_id: DatacenterId,
    /// Pause between "online" pushes (seconds).
    pub presence_interval_secs: u64,
    /// How far ahead the local presence record expires when going online (seconds).
    pub online_presence_ttl_secs: i64,
    /// How often a `WhenPossible` process retries taking the master lock (seconds).
    pub master_retry_interval_secs: u64,
    /// Backoff of fire-and-forget remote calls.
    pub retry: RetryPolicy,
    /// Metadata sent with push registrations.
    pub device: DeviceConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bootstrap_datacenter_id: DEFAULT_DATACENTER_ID,
            presence_interval_secs: 60,
            online_presence_ttl_secs: 365 * DAY_SECS,
            master_retry_interval_secs: 5,
            retry: RetryPolicy::default(),
            device: DeviceConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Parses a configuration document, filling in defaults.
    pub fn from_json(json: &str) -> SessionResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn presence_interval(&self) -> Duration {
        Duration::from_secs(self.presence_interval_secs)
    }

    pub fn master_retry_interval(&self) -> Duration {
        Duration::from_secs(self.master_retry_interval_secs)
    }
}

/// Device and app metadata reported to the push service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub app_version: String,
    /// Overrides the detected OS version.
    pub system_version: Option<String>,
    pub lang_code: String,
    pub device_model: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            system_version: None,
            lang_code: "en".to_string(),
            device_model: "Parley Desktop".to_string(),
        }
    }
}
