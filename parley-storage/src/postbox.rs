//! SQLite-backed account storage.
//!
//! One database file per account directory, opened by every cooperating
//! process. The master lock is a single-row lease: a holder id plus an expiry
//! time. The holder refreshes its lease in the background; a crashed holder
//! simply stops refreshing and the lease lapses.

use crate::codec::{self, Payload};
use crate::error::{StorageError, StorageResult};
use crate::storage::{Modifier, Storage, StorageFactory};
use parley_types::{PeerId, UserPresence};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// File name of the database inside the postbox directory.
pub const DATABASE_FILE: &str = "db.sqlite";

/// Configuration for [`Postbox`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostboxConfig {
    /// How long a master lease stays valid without a refresh (ms).
    pub master_lease_ms: u64,
    /// How long to wait on a database locked by another process (ms).
    pub busy_timeout_ms: u64,
}

impl Default for PostboxConfig {
    fn default() -> Self {
        Self {
            master_lease_ms: 10_000,
            busy_timeout_ms: 5_000,
        }
    }
}

impl PostboxConfig {
    fn lease(&self) -> Duration {
        Duration::from_millis(self.master_lease_ms)
    }
}

/// Persistent account storage backed by SQLite.
pub struct Postbox {
    conn: Arc<Mutex<Connection>>,
    /// Identifies this process as a lock holder.
    holder: String,
    config: PostboxConfig,
    master_tx: Arc<watch::Sender<bool>>,
    lease_monitor: Option<JoinHandle<()>>,
}

impl Postbox {
    /// Opens (or creates) the postbox in `dir`.
    ///
    /// When called inside a tokio runtime, a background task keeps this
    /// process's master lease fresh and republishes [`Storage::master_status`].
    /// The refresh itself runs on the blocking pool.
    pub fn open(dir: &Path, config: PostboxConfig) -> StorageResult<Self> {
        std::fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join(DATABASE_FILE))?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        Self::with_connection(conn, config)
    }

    /// Opens an in-memory postbox (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, PostboxConfig::default())
    }

    fn with_connection(conn: Connection, config: PostboxConfig) -> StorageResult<Self> {
        codec::declare_codecs();
        init_schema(&conn)?;

        let conn = Arc::new(Mutex::new(conn));
        let holder = Uuid::new_v4().to_string();
        let (master_tx, _) = watch::channel(false);
        let master_tx = Arc::new(master_tx);

        let lease_monitor = tokio::runtime::Handle::try_current().ok().map(|handle| {
            handle.spawn(run_lease_monitor(
                Arc::clone(&conn),
                holder.clone(),
                config.lease(),
                Arc::clone(&master_tx),
            ))
        });

        Ok(Self {
            conn,
            holder,
            config,
            master_tx,
            lease_monitor,
        })
    }

    /// The lock-holder id of this process.
    pub fn holder_id(&self) -> &str {
        &self.holder
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_master(&self, held: bool) {
        publish(&self.master_tx, held);
    }
}

impl Drop for Postbox {
    fn drop(&mut self) {
        if let Some(monitor) = self.lease_monitor.take() {
            monitor.abort();
        }
        if *self.master_tx.borrow() {
            if let Err(e) = release_lease(&self.lock(), &self.holder) {
                warn!("Failed to release master lease on close: {}", e);
            }
        }
    }
}

impl Storage for Postbox {
    fn state(&self) -> StorageResult<Option<Box<dyn Payload>>> {
        let conn = self.lock();
        let row: Option<(String, Vec<u8>)> = conn
            .query_row("SELECT tag, payload FROM state WHERE id = 0", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        drop(conn);

        match row {
            Some((tag, payload)) => Ok(Some(codec::registry().decode(&tag, &payload)?)),
            None => Ok(None),
        }
    }

    fn set_state(&self, state: &dyn Payload) -> StorageResult<()> {
        let (tag, payload) = codec::encode(state)?;
        self.lock().execute(
            "INSERT INTO state (id, tag, payload) VALUES (0, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET tag = excluded.tag, payload = excluded.payload",
            params![tag, payload],
        )?;
        debug!("Stored account state ({})", tag);
        Ok(())
    }

    fn remove_state(&self) -> StorageResult<()> {
        self.lock().execute("DELETE FROM state WHERE id = 0", [])?;
        Ok(())
    }

    fn keychain_entry(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let value = self
            .lock()
            .query_row(
                "SELECT value FROM keychain WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_keychain_entry(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.lock().execute(
            "INSERT OR REPLACE INTO keychain (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove_keychain_entry(&self, key: &str) -> StorageResult<()> {
        self.lock()
            .execute("DELETE FROM keychain WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn become_master(&self) -> StorageResult<bool> {
        let acquired = try_acquire_lease(&mut self.lock(), &self.holder, self.config.lease())?;
        if acquired {
            info!("Acquired master lease ({})", self.holder);
        } else {
            debug!("Master lease held by another process");
        }
        self.publish_master(acquired);
        Ok(acquired)
    }

    fn resign_master(&self) -> StorageResult<()> {
        release_lease(&self.lock(), &self.holder)?;
        self.publish_master(false);
        Ok(())
    }

    fn master_status(&self) -> watch::Receiver<bool> {
        self.master_tx.subscribe()
    }

    fn modify(
        &self,
        f: &mut dyn FnMut(&mut dyn Modifier) -> StorageResult<()>,
    ) -> StorageResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        f(&mut PostboxModifier { conn: &tx })?;
        tx.commit()?;
        Ok(())
    }
}

struct PostboxModifier<'a> {
    conn: &'a Connection,
}

impl Modifier for PostboxModifier<'_> {
    fn update_peer_presences(&mut self, presences: &[(PeerId, UserPresence)]) -> StorageResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO peer_presences (peer_id, tag, payload) VALUES (?1, ?2, ?3)",
        )?;
        for (peer_id, presence) in presences {
            let (tag, payload) = codec::encode(presence)?;
            stmt.execute(params![peer_id.to_i64(), tag, payload])?;
        }
        Ok(())
    }

    fn peer_presence(&self, peer_id: PeerId) -> StorageResult<Option<UserPresence>> {
        let row: Option<(String, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT tag, payload FROM peer_presences WHERE peer_id = ?1",
                params![peer_id.to_i64()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        row.map(|(tag, payload)| codec::registry().decode_as::<UserPresence>(&tag, &payload))
            .transpose()
    }
}

/// Opens a [`Postbox`] per account directory.
#[derive(Debug, Clone, Default)]
pub struct PostboxFactory {
    pub config: PostboxConfig,
}

impl StorageFactory for PostboxFactory {
    fn open(&self, base_path: &Path) -> StorageResult<Arc<dyn Storage>> {
        Ok(Arc::new(Postbox::open(base_path, self.config.clone())?))
    }
}

// ── Schema & lease helpers ───────────────────────────────────────

fn init_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS state (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            tag TEXT NOT NULL,
            payload BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS keychain (
            key TEXT PRIMARY KEY,
            value BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS peer_presences (
            peer_id INTEGER PRIMARY KEY,
            tag TEXT NOT NULL,
            payload BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS master_lock (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            holder TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        );
        ",
    )
    .map_err(|e| StorageError::InvalidData(format!("failed to init postbox schema: {e}")))?;
    Ok(())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn lease_ms(lease: Duration) -> i64 {
    i64::try_from(lease.as_millis()).unwrap_or(i64::MAX)
}

fn try_acquire_lease(conn: &mut Connection, holder: &str, lease: Duration) -> StorageResult<bool> {
    let now = now_ms();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current: Option<(String, i64)> = tx
        .query_row(
            "SELECT holder, expires_at FROM master_lock WHERE id = 0",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let acquired = match current {
        Some((other, expires_at)) if other != holder && expires_at > now => false,
        _ => {
            tx.execute(
                "INSERT INTO master_lock (id, holder, expires_at) VALUES (0, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET holder = excluded.holder, expires_at = excluded.expires_at",
                params![holder, now.saturating_add(lease_ms(lease))],
            )?;
            true
        }
    };
    tx.commit()?;
    Ok(acquired)
}

/// Extends our lease if we still hold it. Returns whether we do.
fn refresh_lease(conn: &Connection, holder: &str, lease: Duration) -> StorageResult<bool> {
    let now = now_ms();
    let updated = conn.execute(
        "UPDATE master_lock SET expires_at = ?1 WHERE id = 0 AND holder = ?2 AND expires_at > ?3",
        params![now.saturating_add(lease_ms(lease)), holder, now],
    )?;
    Ok(updated == 1)
}

fn release_lease(conn: &Connection, holder: &str) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM master_lock WHERE id = 0 AND holder = ?1",
        params![holder],
    )?;
    Ok(())
}

fn publish(master_tx: &watch::Sender<bool>, held: bool) {
    master_tx.send_if_modified(|current| {
        let changed = *current != held;
        *current = held;
        changed
    });
}

async fn run_lease_monitor(
    conn: Arc<Mutex<Connection>>,
    holder: String,
    lease: Duration,
    master_tx: Arc<watch::Sender<bool>>,
) {
    let mut ticker = tokio::time::interval((lease / 3).max(Duration::from_millis(10)));
    loop {
        ticker.tick().await;
        if !*master_tx.borrow() {
            continue;
        }
        let refreshed = {
            let conn = Arc::clone(&conn);
            let holder = holder.clone();
            tokio::task::spawn_blocking(move || {
                let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
                refresh_lease(&conn, &holder, lease)
            })
            .await
        };
        match refreshed {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                warn!("Master lease lost ({})", holder);
                publish(&master_tx, false);
            }
            Ok(Err(e)) => warn!("Failed to refresh master lease: {}", e),
            Err(e) => warn!("Master lease refresh panicked: {}", e),
        }
    }
}
