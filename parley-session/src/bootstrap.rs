//! Reconstructs a session from stored state.

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::paths::{account_base_path, network_usage_path, postbox_path};
use crate::session::{
    BackgroundService, Session, SessionParts, UnauthenticatedSession, check_datacenter,
};
use parley_storage::{Storage, StorageFactory, declare_codecs};
use parley_transport::{Keychain, TransportConnector};
use parley_types::{AccountId, AccountState};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Collaborators a session is built from.
#[derive(Clone)]
pub struct AccountEnvironment {
    pub storage: Arc<dyn StorageFactory>,
    pub network: Arc<dyn TransportConnector>,
    /// Run while this process is the effective master.
    pub background: Arc<dyn BackgroundService>,
    pub config: Arc<SessionConfig>,
}

/// Outcome of [`open_account`].
pub enum AccountHandle {
    Unauthenticated(UnauthenticatedSession),
    Authenticated(Session),
}

impl AccountHandle {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AccountHandle::Authenticated(_))
    }

    pub fn into_session(self) -> Option<Session> {
        match self {
            AccountHandle::Authenticated(session) => Some(session),
            AccountHandle::Unauthenticated(_) => None,
        }
    }

    pub fn into_unauthenticated(self) -> Option<UnauthenticatedSession> {
        match self {
            AccountHandle::Unauthenticated(session) => Some(session),
            AccountHandle::Authenticated(_) => None,
        }
    }
}

/// [`Keychain`] over the storage's keychain region.
///
/// Every process sharing the storage sees the same entries. Storage failures
/// are logged; a failed read looks like a missing entry.
pub struct StorageKeychain {
    storage: Arc<dyn Storage>,
}

impl StorageKeychain {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

impl Keychain for StorageKeychain {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.storage.keychain_entry(key).unwrap_or_else(|e| {
            warn!("Failed to read keychain entry {}: {}", key, e);
            None
        })
    }

    fn set(&self, key: &str, value: &[u8]) {
        if let Err(e) = self.storage.set_keychain_entry(key, value) {
            warn!("Failed to write keychain entry {}: {}", key, e);
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.storage.remove_keychain_entry(key) {
            warn!("Failed to remove keychain entry {}: {}", key, e);
        }
    }
}

/// Opens the account `id` under `root`.
///
/// Reads the stored state, connects to its datacenter (or the bootstrap
/// datacenter on first run) and returns the matching handle. The state is
/// not written. Stored state naming a non-positive datacenter fails to
/// decode; a non-positive configured bootstrap datacenter is rejected.
///
/// # Panics
///
/// Panics if the state slot holds a payload that is not an [`AccountState`].
pub async fn open_account(
    id: &AccountId,
    root: &Path,
    env: &AccountEnvironment,
) -> SessionResult<AccountHandle> {
    declare_codecs();

    let base_path = account_base_path(root, id);
    let (storage, state) = {
        let factory = env.storage.clone();
        let path = postbox_path(&base_path);
        let opened = tokio::task::spawn_blocking(move || {
            let storage = factory.open(&path)?;
            let state = load_state(storage.as_ref())?;
            Ok::<_, SessionError>((storage, state))
        })
        .await;
        match opened {
            Ok(opened) => opened?,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => return Err(e.into()),
        }
    };
    let datacenter_id = check_datacenter(
        state
            .as_ref()
            .map_or(env.config.bootstrap_datacenter_id, AccountState::master_datacenter_id),
    )?;

    let keychain: Arc<dyn Keychain> = Arc::new(StorageKeychain::new(storage.clone()));
    let transport = env
        .network
        .connect(datacenter_id, keychain.clone(), network_usage_path(&base_path))
        .await?;

    let parts = SessionParts {
        id: id.clone(),
        base_path,
        storage,
        keychain,
        network: env.network.clone(),
        transport,
        config: env.config.clone(),
    };

    match state {
        Some(AccountState::Authenticated(state)) => {
            info!(
                "Opened account {} as {} on datacenter {}",
                id, state.peer_id, datacenter_id
            );
            Ok(AccountHandle::Authenticated(Session::start(
                parts,
                state.peer_id,
                env.background.clone(),
            )))
        }
        Some(AccountState::Unauthenticated(_)) | None => {
            info!("Opened unauthenticated account {} on datacenter {}", id, datacenter_id);
            Ok(AccountHandle::Unauthenticated(UnauthenticatedSession::new(parts)))
        }
    }
}

fn load_state(storage: &dyn Storage) -> SessionResult<Option<AccountState>> {
    let Some(payload) = storage.state()? else {
        return Ok(None);
    };
    let tag = payload.type_tag();
    match payload.into_any().downcast::<AccountState>() {
        Ok(state) => Ok(Some(*state)),
        Err(_) => panic!("state slot holds unexpected payload {tag:?}"),
    }
}
