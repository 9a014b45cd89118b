//! Session handles returned by bootstrap.

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::mastership;
use crate::paths::network_usage_path;
use crate::presence::{self, PresenceContext};
use crate::push_token;
use crate::signal::{Promise, TaskSet};
use async_trait::async_trait;
use parley_storage::Storage;
use parley_transport::{DatacenterId, Keychain, NetworkUsageStats, Transport, TransportConnector};
use parley_types::{AccountId, MastershipIntent, PeerId, is_valid_datacenter_id};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Long-running work scheduled by a session.
///
/// The mastership-driven sync loop and account-scoped managers (contacts,
/// sticker packs) implement this. `run` is cancelled by dropping its future,
/// so in-flight work must tolerate being abandoned at any await point.
#[async_trait]
pub trait BackgroundService: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs until cancelled. Returning early is allowed.
    async fn run(&self);
}

/// What both session kinds hold.
#[derive(Clone)]
pub(crate) struct SessionParts {
    pub id: AccountId,
    pub base_path: PathBuf,
    pub storage: Arc<dyn Storage>,
    pub keychain: Arc<dyn Keychain>,
    pub network: Arc<dyn TransportConnector>,
    pub transport: Arc<dyn Transport>,
    pub config: Arc<SessionConfig>,
}

impl SessionParts {
    async fn network_stats(&self) -> SessionResult<NetworkUsageStats> {
        let path = network_usage_path(&self.base_path);
        Ok(self.network.usage_stats(&path).await?)
    }
}

/// A session that has not completed login.
pub struct UnauthenticatedSession {
    parts: SessionParts,
}

impl UnauthenticatedSession {
    pub(crate) fn new(parts: SessionParts) -> Self {
        Self { parts }
    }

    pub fn id(&self) -> &AccountId {
        &self.parts.id
    }

    /// `<root>/account<id>`
    pub fn base_path(&self) -> &Path {
        &self.parts.base_path
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.parts.storage
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.parts.transport
    }

    /// The datacenter the transport is bound to.
    pub fn master_datacenter_id(&self) -> DatacenterId {
        self.parts.transport.datacenter_id()
    }

    /// Rebinds the session to another datacenter.
    ///
    /// Returns `self` unchanged if already bound to `datacenter_id`. The
    /// new transport shares the keychain, identity and storage. The
    /// account state is not written; persisting the move is up to the caller.
    /// A non-positive id is rejected with [`SessionError::InvalidDatacenter`].
    pub async fn change_master_datacenter(
        self,
        datacenter_id: DatacenterId,
    ) -> SessionResult<Self> {
        check_datacenter(datacenter_id)?;
        if datacenter_id == self.master_datacenter_id() {
            return Ok(self);
        }

        info!(
            "Moving account {} from datacenter {} to {}",
            self.parts.id,
            self.master_datacenter_id(),
            datacenter_id
        );
        let transport = self
            .parts
            .network
            .connect(
                datacenter_id,
                self.parts.keychain.clone(),
                network_usage_path(&self.parts.base_path),
            )
            .await?;

        Ok(Self::new(SessionParts {
            transport,
            ..self.parts
        }))
    }

    /// Traffic counters of this account.
    pub async fn current_network_stats(&self) -> SessionResult<NetworkUsageStats> {
        self.parts.network_stats().await
    }
}

pub(crate) fn check_datacenter(datacenter_id: DatacenterId) -> SessionResult<DatacenterId> {
    if is_valid_datacenter_id(datacenter_id) {
        Ok(datacenter_id)
    } else {
        Err(SessionError::InvalidDatacenter(datacenter_id))
    }
}

/// A logged-in session and the loops it owns.
///
/// Inputs are set through the `set_*` methods; each one feeds a loop that
/// reacts to changes only. Dropping the session aborts every loop.
pub struct Session {
    parts: SessionParts,
    peer_id: PeerId,
    mastership_intent: Promise<MastershipIntent>,
    keep_online_presence: Promise<bool>,
    notification_token: Promise<Vec<u8>>,
    tasks: TaskSet,
}

impl Session {
    /// Starts the session's loops. Must be called inside a tokio runtime.
    pub(crate) fn start(
        parts: SessionParts,
        peer_id: PeerId,
        background: Arc<dyn BackgroundService>,
    ) -> Self {
        let session = Self {
            parts,
            peer_id,
            mastership_intent: Promise::new(),
            keep_online_presence: Promise::new(),
            notification_token: Promise::new(),
            tasks: TaskSet::new(),
        };

        let parts = &session.parts;
        session.tasks.spawn(
            "mastership intent",
            mastership::drive_intent(
                session.mastership_intent.values(),
                parts.storage.clone(),
                session.tasks.blocking(),
                parts.config.master_retry_interval(),
            ),
        );
        session.tasks.spawn(
            "mastership",
            mastership::drive_master(
                session.mastership_intent.values(),
                parts.storage.master_status(),
                parts.transport.clone(),
                background,
            ),
        );
        session.tasks.spawn(
            "presence",
            presence::run(
                session.keep_online_presence.values(),
                PresenceContext {
                    peer_id,
                    storage: parts.storage.clone(),
                    transport: parts.transport.clone(),
                    config: parts.config.clone(),
                    blocking: session.tasks.blocking(),
                },
            ),
        );
        session.tasks.spawn(
            "push token",
            push_token::run(
                session.notification_token.values(),
                parts.transport.clone(),
                parts.config.retry.clone(),
                parts.config.device.clone(),
                session.tasks.blocking(),
            ),
        );

        debug!("Session {} started for {}", session.parts.id, peer_id);
        session
    }

    pub fn id(&self) -> &AccountId {
        &self.parts.id
    }

    /// `<root>/account<id>`
    pub fn base_path(&self) -> &Path {
        &self.parts.base_path
    }

    /// The logged-in user.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.parts.storage
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.parts.transport
    }

    pub fn master_datacenter_id(&self) -> DatacenterId {
        self.parts.transport.datacenter_id()
    }

    /// Whether this process wants to run the background service.
    pub fn set_mastership_intent(&self, intent: MastershipIntent) {
        self.mastership_intent.set(intent);
    }

    /// Whether the user should appear online.
    pub fn set_keep_online_presence(&self, online: bool) {
        self.keep_online_presence.set(online);
    }

    /// The device's push token. Registered again on every change.
    pub fn set_notification_token(&self, token: impl Into<Vec<u8>>) {
        self.notification_token.set(token.into());
    }

    /// Starts account-scoped services that run for the session's lifetime,
    /// independent of mastership.
    pub fn setup(&self, services: impl IntoIterator<Item = Arc<dyn BackgroundService>>) {
        for service in services {
            let name = service.name();
            self.tasks.spawn(name, async move {
                service.run().await;
                debug!("{} finished", service.name());
            });
        }
    }

    /// Traffic counters of this account.
    pub async fn current_network_stats(&self) -> SessionResult<NetworkUsageStats> {
        self.parts.network_stats().await
    }

    /// Stops every loop and waits until none can run again.
    pub async fn shutdown(self) {
        self.tasks.shutdown().await;
        info!("Session {} shut down", self.parts.id);
    }
}
