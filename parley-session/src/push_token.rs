//! Push token registration.

use crate::config::DeviceConfig;
use crate::signal::{BlockingCalls, distinct_until_changed, switch_latest};
use futures::Stream;
use parley_transport::{RegisterDevice, RetryPolicy, RpcCall, TOKEN_TYPE_APNS, Transport, retry_request};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Device and app metadata sent with every registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    pub app_version: String,
    pub system_version: String,
    pub lang_code: String,
    pub device_model: String,
    /// Debug builds register against the push sandbox.
    pub app_sandbox: bool,
}

impl DeviceMetadata {
    /// Collects metadata for the current device.
    #[must_use]
    pub fn collect(config: &DeviceConfig) -> Self {
        Self {
            app_version: config.app_version.clone(),
            system_version: config
                .system_version
                .clone()
                .unwrap_or_else(detect_system_version),
            lang_code: config.lang_code.clone(),
            device_model: config.device_model.clone(),
            app_sandbox: cfg!(debug_assertions),
        }
    }

    /// Registration request for `token`.
    #[must_use]
    pub fn registration(&self, token: &[u8]) -> RegisterDevice {
        RegisterDevice {
            token_type: TOKEN_TYPE_APNS,
            token: hex::encode(token),
            device_model: self.device_model.clone(),
            system_version: self.system_version.clone(),
            app_version: self.app_version.clone(),
            app_sandbox: self.app_sandbox,
            lang_code: self.lang_code.clone(),
        }
    }
}

/// Collects device metadata, then registers every distinct token.
///
/// Detecting the system version may spawn a process, so collection runs on
/// the blocking pool.
pub(crate) async fn run<S>(
    tokens: S,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    device: DeviceConfig,
    blocking: BlockingCalls,
) where
    S: Stream<Item = Vec<u8>>,
{
    let device = match blocking.run(move || DeviceMetadata::collect(&device)).await {
        Ok(device) => device,
        Err(e) => {
            warn!("Collecting device metadata panicked: {}", e);
            return;
        }
    };
    switch_latest(distinct_until_changed(tokens), move |token| {
        let request = RpcCall::RegisterDevice(device.registration(&token));
        let transport = transport.clone();
        let retry = retry.clone();
        async move {
            debug!("Registering push token ({} bytes)", token.len());
            retry_request(transport.as_ref(), request, &retry).await;
            info!("Registered push token");
        }
    })
    .await;
}

/// OS name and version, e.g. `"linux 24.04"`.
fn detect_system_version() -> String {
    match os_version() {
        Some(version) => format!("{} {}", env::consts::OS, version),
        None => env::consts::OS.to_string(),
    }
}

fn os_version() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("VERSION_ID="))
                    .map(|l| l.trim_start_matches("VERSION_ID=").trim_matches('"').to_string())
            })
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("sw_vers")
            .arg("-productVersion")
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}
