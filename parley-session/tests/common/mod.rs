//! Shared test helpers for session tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parley_session::paths::{account_base_path, postbox_path};
use parley_session::{AccountEnvironment, AccountHandle, BackgroundService, Session, SessionConfig, open_account};
use parley_storage::mock::{MemoryStorage, MemoryStorageFactory};
use parley_storage::Storage;
use parley_transport::mock::{MockConnector, MockTransport};
use parley_transport::RpcCall;
use parley_types::{AccountId, AccountState, PeerId, SyncCursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const USER: PeerId = PeerId::user(1001);

/// Counts how often a service started and how many instances are running.
#[derive(Debug, Default)]
pub struct RecordingService {
    starts: AtomicUsize,
    running: Arc<AtomicUsize>,
}

impl RecordingService {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}

struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackgroundService for RecordingService {
    fn name(&self) -> &'static str {
        "recording service"
    }

    async fn run(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.fetch_add(1, Ordering::SeqCst);
        let _guard = RunningGuard(self.running.clone());
        std::future::pending::<()>().await;
    }
}

/// A test installation backed by in-memory storage and a mock network.
pub struct Harness {
    pub root: PathBuf,
    pub id: AccountId,
    pub storage: Arc<MemoryStorageFactory>,
    pub network: Arc<MockConnector>,
    pub service: Arc<RecordingService>,
    pub config: SessionConfig,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        Self {
            root: PathBuf::from("/parley-test"),
            id: AccountId::parse("TEST-ACCOUNT").unwrap(),
            storage: Arc::new(MemoryStorageFactory::new()),
            network: Arc::new(MockConnector::new()),
            service: Arc::new(RecordingService::default()),
            config: SessionConfig::default(),
        }
    }

    pub fn env(&self) -> AccountEnvironment {
        AccountEnvironment {
            storage: self.storage.clone(),
            network: self.network.clone(),
            background: self.service.clone(),
            config: Arc::new(self.config.clone()),
        }
    }

    pub fn base_path(&self) -> PathBuf {
        account_base_path(&self.root, &self.id)
    }

    /// The storage `open_account` will use for this account.
    pub fn account_storage(&self) -> Arc<MemoryStorage> {
        self.storage.storage_for(&postbox_path(&self.base_path()))
    }

    pub fn store_logged_in(&self, datacenter_id: i32) {
        let state =
            AccountState::authenticated(datacenter_id, USER, Some(SyncCursor::new(10, 2, 1_700_000_000, 7)));
        self.account_storage().set_state(&state).unwrap();
    }

    pub async fn open(&self) -> AccountHandle {
        open_account(&self.id, &self.root, &self.env()).await.unwrap()
    }

    /// Opens a logged-in session on datacenter 2.
    pub async fn open_session(&self) -> (Session, Arc<MockTransport>, Arc<MemoryStorage>) {
        self.store_logged_in(2);
        let session = self.open().await.into_session().expect("logged-in account");
        let transport = self.network.last_transport().unwrap();
        (session, transport, self.account_storage())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Routes session logs to the test writer; set `RUST_LOG` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `condition` on the test clock until it holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

pub fn online_pushes(transport: &MockTransport) -> usize {
    transport.count_calls(|c| matches!(c, RpcCall::UpdateStatus { offline: false }))
}

pub fn offline_pushes(transport: &MockTransport) -> usize {
    transport.count_calls(|c| matches!(c, RpcCall::UpdateStatus { offline: true }))
}

pub fn registrations(transport: &MockTransport) -> usize {
    transport.count_calls(|c| matches!(c, RpcCall::RegisterDevice(_)))
}
