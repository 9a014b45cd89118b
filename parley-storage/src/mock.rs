//! An in-process storage for testing.
//!
//! Payloads still go through the codec registry, so a test exercising
//! [`MemoryStorage`] sees the same decode path as one using
//! [`Postbox`](crate::Postbox). The master lock is driven by the test.

use crate::codec::{self, Payload};
use crate::error::StorageResult;
use crate::storage::{Modifier, Storage, StorageFactory};
use parley_types::{PeerId, UserPresence};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

#[derive(Debug, Default)]
struct Inner {
    state: Option<(&'static str, Vec<u8>)>,
    keychain: HashMap<String, Vec<u8>>,
    presences: HashMap<PeerId, UserPresence>,
    presence_writes: Vec<(PeerId, UserPresence)>,
}

/// Storage kept entirely in memory.
#[derive(Debug)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
    master_tx: watch::Sender<bool>,
    grant_master: AtomicBool,
    become_master_calls: AtomicUsize,
    resign_master_calls: AtomicUsize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Creates an empty storage that grants the master lock on request.
    pub fn new() -> Self {
        codec::declare_codecs();
        let (master_tx, _) = watch::channel(false);
        Self {
            inner: Mutex::new(Inner::default()),
            master_tx,
            grant_master: AtomicBool::new(true),
            become_master_calls: AtomicUsize::new(0),
            resign_master_calls: AtomicUsize::new(0),
        }
    }

    /// Creates a storage whose state slot already holds `state`.
    pub fn with_state(state: &dyn Payload) -> StorageResult<Self> {
        let storage = Self::new();
        storage.set_state(state)?;
        Ok(storage)
    }

    /// Simulates another process taking or releasing the lock.
    pub fn set_master(&self, held: bool) {
        self.master_tx.send_replace(held);
    }

    /// Whether `become_master` succeeds.
    pub fn set_grant_master(&self, grant: bool) {
        self.grant_master.store(grant, Ordering::SeqCst);
    }

    pub fn become_master_calls(&self) -> usize {
        self.become_master_calls.load(Ordering::SeqCst)
    }

    pub fn resign_master_calls(&self) -> usize {
        self.resign_master_calls.load(Ordering::SeqCst)
    }

    /// Every presence written through [`Storage::modify`], in order.
    pub fn presence_writes(&self) -> Vec<(PeerId, UserPresence)> {
        self.lock().presence_writes.clone()
    }

    /// The raw `(tag, body)` in the state slot.
    pub fn raw_state(&self) -> Option<(&'static str, Vec<u8>)> {
        self.lock().state.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn state(&self) -> StorageResult<Option<Box<dyn Payload>>> {
        let raw = self.lock().state.clone();
        raw.map(|(tag, bytes)| codec::registry().decode(tag, &bytes))
            .transpose()
    }

    fn set_state(&self, state: &dyn Payload) -> StorageResult<()> {
        let encoded = codec::encode(state)?;
        self.lock().state = Some(encoded);
        Ok(())
    }

    fn remove_state(&self) -> StorageResult<()> {
        self.lock().state = None;
        Ok(())
    }

    fn keychain_entry(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.lock().keychain.get(key).cloned())
    }

    fn set_keychain_entry(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.lock().keychain.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove_keychain_entry(&self, key: &str) -> StorageResult<()> {
        self.lock().keychain.remove(key);
        Ok(())
    }

    fn become_master(&self) -> StorageResult<bool> {
        self.become_master_calls.fetch_add(1, Ordering::SeqCst);
        if self.grant_master.load(Ordering::SeqCst) {
            self.master_tx.send_if_modified(|held| !std::mem::replace(held, true));
        }
        Ok(*self.master_tx.borrow())
    }

    fn resign_master(&self) -> StorageResult<()> {
        self.resign_master_calls.fetch_add(1, Ordering::SeqCst);
        self.master_tx.send_if_modified(|held| std::mem::replace(held, false));
        Ok(())
    }

    fn master_status(&self) -> watch::Receiver<bool> {
        self.master_tx.subscribe()
    }

    fn modify(
        &self,
        f: &mut dyn FnMut(&mut dyn Modifier) -> StorageResult<()>,
    ) -> StorageResult<()> {
        let mut inner = self.lock();
        let mut staged = MemoryModifier {
            presences: inner.presences.clone(),
            writes: Vec::new(),
        };
        f(&mut staged)?;
        inner.presences = staged.presences;
        inner.presence_writes.extend(staged.writes);
        Ok(())
    }
}

struct MemoryModifier {
    presences: HashMap<PeerId, UserPresence>,
    writes: Vec<(PeerId, UserPresence)>,
}

impl Modifier for MemoryModifier {
    fn update_peer_presences(&mut self, presences: &[(PeerId, UserPresence)]) -> StorageResult<()> {
        for (peer_id, presence) in presences {
            self.presences.insert(*peer_id, *presence);
            self.writes.push((*peer_id, *presence));
        }
        Ok(())
    }

    fn peer_presence(&self, peer_id: PeerId) -> StorageResult<Option<UserPresence>> {
        Ok(self.presences.get(&peer_id).copied())
    }
}

/// Hands out one [`MemoryStorage`] per base path, creating it on first open.
#[derive(Debug, Default)]
pub struct MemoryStorageFactory {
    storages: Mutex<HashMap<PathBuf, Arc<MemoryStorage>>>,
}

impl MemoryStorageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns (creating if needed) the storage for `base_path`.
    pub fn storage_for(&self, base_path: &Path) -> Arc<MemoryStorage> {
        let mut storages = self.storages.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            storages
                .entry(base_path.to_path_buf())
                .or_insert_with(|| Arc::new(MemoryStorage::new())),
        )
    }

    /// Paths opened so far.
    pub fn opened_paths(&self) -> Vec<PathBuf> {
        let storages = self.storages.lock().unwrap_or_else(PoisonError::into_inner);
        storages.keys().cloned().collect()
    }
}

impl StorageFactory for MemoryStorageFactory {
    fn open(&self, base_path: &Path) -> StorageResult<Arc<dyn Storage>> {
        Ok(self.storage_for(base_path))
    }
}
