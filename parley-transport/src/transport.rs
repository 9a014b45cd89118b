//! Transport layer abstraction.
//!
//! Defines the traits a network layer implements so the session core can run
//! against any backend.

use crate::api::{RpcCall, RpcResponse};
use crate::error::RpcResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identifies a remote cluster member.
pub type DatacenterId = i32;

/// Opaque credential store a transport persists its auth keys in.
///
/// Backed by the storage keychain region, so every process sharing the
/// account storage sees the same keys.
pub trait Keychain: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    fn set(&self, key: &str, value: &[u8]);

    fn remove(&self, key: &str);
}

/// One live connection to a datacenter.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The datacenter this connection is bound to.
    fn datacenter_id(&self) -> DatacenterId;

    /// Executes one call. No retry is applied here.
    async fn request(&self, call: RpcCall) -> RpcResult<RpcResponse>;

    /// Whether the transport should hold a persistent connection open.
    fn set_keep_connection(&self, keep: bool);
}

/// Bytes sent and received per network class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkUsageStats {
    pub wifi_incoming: u64,
    pub wifi_outgoing: u64,
    pub cellular_incoming: u64,
    pub cellular_outgoing: u64,
}

impl NetworkUsageStats {
    pub fn total(&self) -> u64 {
        self.wifi_incoming + self.wifi_outgoing + self.cellular_incoming + self.cellular_outgoing
    }
}

/// Opens transports.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Connects to `datacenter_id`, persisting keys in `keychain` and
    /// accounting traffic in the file at `usage_path`.
    async fn connect(
        &self,
        datacenter_id: DatacenterId,
        keychain: Arc<dyn Keychain>,
        usage_path: PathBuf,
    ) -> RpcResult<Arc<dyn Transport>>;

    /// Reads the traffic statistics accumulated at `usage_path`.
    async fn usage_stats(&self, usage_path: &Path) -> RpcResult<NetworkUsageStats>;
}
