//! The storage contract consumed by the session core.

use crate::codec::Payload;
use crate::error::StorageResult;
use parley_types::{PeerId, UserPresence};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

/// Transactional access handed to [`Storage::modify`].
pub trait Modifier {
    /// Replaces the cached presence of each listed peer.
    fn update_peer_presences(&mut self, presences: &[(PeerId, UserPresence)]) -> StorageResult<()>;

    /// Reads the cached presence of a peer.
    fn peer_presence(&self, peer_id: PeerId) -> StorageResult<Option<UserPresence>>;
}

/// Durable storage shared by every process of one installation.
///
/// Calls are synchronous and may wait on another process holding the
/// database; async callers run them on the blocking pool. Each one is atomic
/// on its own.
pub trait Storage: Send + Sync {
    /// Reads the state slot. `None` on first run.
    fn state(&self) -> StorageResult<Option<Box<dyn Payload>>>;

    /// Replaces the state slot.
    fn set_state(&self, state: &dyn Payload) -> StorageResult<()>;

    /// Clears the state slot.
    fn remove_state(&self) -> StorageResult<()>;

    fn keychain_entry(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    fn set_keychain_entry(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    fn remove_keychain_entry(&self, key: &str) -> StorageResult<()>;

    /// Makes one attempt to take the cross-process master lock.
    ///
    /// Returns whether this process holds the lock afterwards. Losing the race
    /// to another process is not an error.
    fn become_master(&self) -> StorageResult<bool>;

    /// Releases the master lock if this process holds it.
    fn resign_master(&self) -> StorageResult<()>;

    /// Continuous "this process holds the master lock" signal.
    fn master_status(&self) -> watch::Receiver<bool>;

    /// Runs `f` inside one transaction. An error from `f` rolls it back.
    fn modify(
        &self,
        f: &mut dyn FnMut(&mut dyn Modifier) -> StorageResult<()>,
    ) -> StorageResult<()>;

    /// Reads the cached presence of a peer.
    fn peer_presence(&self, peer_id: PeerId) -> StorageResult<Option<UserPresence>> {
        let mut presence = None;
        self.modify(&mut |modifier| {
            presence = modifier.peer_presence(peer_id)?;
            Ok(())
        })?;
        Ok(presence)
    }
}

/// Opens the storage rooted at a directory.
pub trait StorageFactory: Send + Sync {
    fn open(&self, base_path: &Path) -> StorageResult<Arc<dyn Storage>>;
}
