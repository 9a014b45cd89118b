//! Persisted account state.
//!
//! An account is either waiting for login ([`UnauthenticatedState`]) or
//! logged in ([`AuthenticatedState`]). Values are immutable: every transition
//! builds a new [`AccountState`] which the caller writes over the old one.
//!
//! Decoding is forward compatible. Unknown fields are ignored and missing
//! fields fall back to these defaults:
//!
//! | field                  | default                   |
//! |------------------------|---------------------------|
//! | `master_datacenter_id` | [`DEFAULT_DATACENTER_ID`] |
//! | `peer_id`              | `0:0`                     |
//! | `sync_cursor`          | absent                    |
//! | cursor `pts/qts/date/seq` | `0`                    |

use crate::PeerId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Datacenter a fresh session connects to before the server redirects it.
pub const DEFAULT_DATACENTER_ID: i32 = 2;

/// Datacenter ids are positive; anything else is corrupt state.
#[must_use]
pub const fn is_valid_datacenter_id(id: i32) -> bool {
    id > 0
}

fn default_datacenter_id() -> i32 {
    DEFAULT_DATACENTER_ID
}

/// The state slot of one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountState {
    Unauthenticated(UnauthenticatedState),
    Authenticated(AuthenticatedState),
}

impl AccountState {
    /// State of a session that has not logged in yet.
    #[must_use]
    pub fn unauthenticated(master_datacenter_id: i32) -> Self {
        Self::Unauthenticated(UnauthenticatedState {
            master_datacenter_id,
        })
    }

    /// State of a logged-in session.
    #[must_use]
    pub fn authenticated(
        master_datacenter_id: i32,
        peer_id: PeerId,
        sync_cursor: Option<SyncCursor>,
    ) -> Self {
        Self::Authenticated(AuthenticatedState {
            master_datacenter_id,
            peer_id,
            sync_cursor,
        })
    }

    /// The datacenter owning this session's primary connection.
    #[must_use]
    pub fn master_datacenter_id(&self) -> i32 {
        match self {
            Self::Unauthenticated(state) => state.master_datacenter_id,
            Self::Authenticated(state) => state.master_datacenter_id,
        }
    }

    /// Same variant, different primary datacenter.
    #[must_use]
    pub fn with_master_datacenter(&self, master_datacenter_id: i32) -> Self {
        match self {
            Self::Unauthenticated(_) => Self::unauthenticated(master_datacenter_id),
            Self::Authenticated(state) => Self::Authenticated(AuthenticatedState {
                master_datacenter_id,
                ..state.clone()
            }),
        }
    }

    /// Completes login, keeping the current datacenter.
    #[must_use]
    pub fn logged_in(&self, peer_id: PeerId) -> Self {
        Self::authenticated(self.master_datacenter_id(), peer_id, None)
    }

    /// Returns the authenticated payload, if logged in.
    #[must_use]
    pub fn as_authenticated(&self) -> Option<&AuthenticatedState> {
        match self {
            Self::Authenticated(state) => Some(state),
            Self::Unauthenticated(_) => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// A session that exists locally but has not completed login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnauthenticatedState {
    #[serde(default = "default_datacenter_id")]
    pub master_datacenter_id: i32,
}

/// A logged-in session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedState {
    #[serde(default = "default_datacenter_id")]
    pub master_datacenter_id: i32,
    #[serde(default)]
    pub peer_id: PeerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_cursor: Option<SyncCursor>,
}

impl AuthenticatedState {
    /// Copy of this state with an advanced update-stream position.
    #[must_use]
    pub fn with_sync_cursor(&self, cursor: SyncCursor) -> AccountState {
        AccountState::Authenticated(Self {
            sync_cursor: Some(cursor),
            ..self.clone()
        })
    }
}

/// Position in the server's update stream.
///
/// The core only stores and returns the cursor. A decrease between two
/// stored values means a reset and is handled by the state manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncCursor {
    pub pts: i32,
    pub qts: i32,
    /// Unix timestamp of the last applied update.
    pub date: i32,
    pub seq: i32,
}

impl SyncCursor {
    #[must_use]
    pub const fn new(pts: i32, qts: i32, date: i32, seq: i32) -> Self {
        Self { pts, qts, date, seq }
    }
}

impl fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(pts: {}, qts: {}, seq: {}, date: {})",
            self.pts, self.qts, self.seq, self.date
        )
    }
}

/// Whether the owning process wants to run background synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MastershipIntent {
    /// Become master right now (foreground app).
    Immediate,
    /// Become master whenever the lock is free, and keep trying.
    WhenPossible,
    /// Never run background synchronization.
    Never,
}

impl MastershipIntent {
    /// True for the intents that want the master lock.
    #[must_use]
    pub const fn wants_master(self) -> bool {
        matches!(self, Self::Immediate | Self::WhenPossible)
    }
}
