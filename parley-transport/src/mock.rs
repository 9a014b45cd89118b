//! Scripted transport doubles for testing.

use crate::api::{PasswordConfig, RpcCall, RpcResponse};
use crate::error::{RpcError, RpcResult};
use crate::transport::{DatacenterId, Keychain, NetworkUsageStats, Transport, TransportConnector};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Answers a call when no scripted response is queued.
pub type Handler = Arc<dyn Fn(&RpcCall) -> RpcResult<RpcResponse> + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Default answers: status and device calls succeed, no password is set.
pub fn default_response(call: &RpcCall) -> RpcResult<RpcResponse> {
    match call {
        RpcCall::GetPassword => Ok(RpcResponse::PasswordConfig(PasswordConfig::NoPassword {
            new_salt: Vec::new(),
            email_unconfirmed_pattern: String::new(),
        })),
        RpcCall::CheckPassword { .. } => Err(RpcError::remote(400, "PASSWORD_HASH_INVALID")),
        RpcCall::UpdateStatus { .. } | RpcCall::RegisterDevice(_) => Ok(RpcResponse::Bool(true)),
    }
}

/// A transport that records calls and answers from a script.
pub struct MockTransport {
    datacenter_id: DatacenterId,
    scripted: Mutex<VecDeque<RpcResult<RpcResponse>>>,
    handler: Mutex<Handler>,
    calls: Mutex<Vec<RpcCall>>,
    keep_connection: Mutex<Vec<bool>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("datacenter_id", &self.datacenter_id)
            .field("calls", &lock(&self.calls).len())
            .finish()
    }
}

impl MockTransport {
    /// Creates a transport bound to `datacenter_id` using [`default_response`].
    pub fn new(datacenter_id: DatacenterId) -> Self {
        Self {
            datacenter_id,
            scripted: Mutex::new(VecDeque::new()),
            handler: Mutex::new(Arc::new(default_response)),
            calls: Mutex::new(Vec::new()),
            keep_connection: Mutex::new(Vec::new()),
        }
    }

    /// Queues a response for the next call, ahead of the handler.
    pub fn push_response(&self, response: RpcResult<RpcResponse>) {
        lock(&self.scripted).push_back(response);
    }

    /// Replaces the fallback handler.
    pub fn set_handler(&self, handler: Handler) {
        *lock(&self.handler) = handler;
    }

    /// Every call received, in order.
    pub fn calls(&self) -> Vec<RpcCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&RpcCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| predicate(c)).count()
    }

    /// Every value passed to `set_keep_connection`, in order.
    pub fn keep_connection_history(&self) -> Vec<bool> {
        lock(&self.keep_connection).clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn datacenter_id(&self) -> DatacenterId {
        self.datacenter_id
    }

    async fn request(&self, call: RpcCall) -> RpcResult<RpcResponse> {
        lock(&self.calls).push(call.clone());
        if let Some(response) = lock(&self.scripted).pop_front() {
            return response;
        }
        let handler = lock(&self.handler).clone();
        handler(&call)
    }

    fn set_keep_connection(&self, keep: bool) {
        lock(&self.keep_connection).push(keep);
    }
}

/// Keychain kept in memory.
#[derive(Debug, Default)]
pub struct MemoryKeychain {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeychain {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Keychain for MemoryKeychain {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &[u8]) {
        lock(&self.entries).insert(key.to_string(), value.to_vec());
    }

    fn remove(&self, key: &str) {
        lock(&self.entries).remove(key);
    }
}

/// A connector handing out [`MockTransport`]s.
#[derive(Default)]
pub struct MockConnector {
    handler: Mutex<Option<Handler>>,
    connections: Mutex<Vec<Connection>>,
    usage: Mutex<HashMap<PathBuf, NetworkUsageStats>>,
}

/// One recorded `connect` call.
#[derive(Clone)]
pub struct Connection {
    pub datacenter_id: DatacenterId,
    pub usage_path: PathBuf,
    pub keychain: Arc<dyn Keychain>,
    pub transport: Arc<MockTransport>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler installed on every transport created from now on.
    pub fn set_handler(&self, handler: Handler) {
        *lock(&self.handler) = Some(handler);
    }

    /// Statistics returned for `usage_path`.
    pub fn set_usage_stats(&self, usage_path: impl Into<PathBuf>, stats: NetworkUsageStats) {
        lock(&self.usage).insert(usage_path.into(), stats);
    }

    /// Every `connect` call, in order.
    pub fn connections(&self) -> Vec<Connection> {
        lock(&self.connections).clone()
    }

    /// The most recently created transport.
    pub fn last_transport(&self) -> Option<Arc<MockTransport>> {
        lock(&self.connections).last().map(|c| c.transport.clone())
    }
}

#[async_trait]
impl TransportConnector for MockConnector {
    async fn connect(
        &self,
        datacenter_id: DatacenterId,
        keychain: Arc<dyn Keychain>,
        usage_path: PathBuf,
    ) -> RpcResult<Arc<dyn Transport>> {
        let transport = Arc::new(MockTransport::new(datacenter_id));
        if let Some(handler) = lock(&self.handler).clone() {
            transport.set_handler(handler);
        }
        lock(&self.connections).push(Connection {
            datacenter_id,
            usage_path,
            keychain,
            transport: transport.clone(),
        });
        Ok(transport)
    }

    async fn usage_stats(&self, usage_path: &Path) -> RpcResult<NetworkUsageStats> {
        Ok(lock(&self.usage)
            .get(usage_path)
            .copied()
            .unwrap_or_default())
    }
}
