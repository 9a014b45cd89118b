//! Mastership coordination between processes sharing one storage.
//!
//! Two loops cooperate:
//!
//! - the intent driver acts on each distinct [`MastershipIntent`]: one
//!   acquisition attempt for `Immediate` unless the lock is already held,
//!   repeated attempts while the lock is free for `WhenPossible`, and
//!   releasing the lock for `Never`
//! - the master driver follows [`effective_master`], runs the background
//!   service while it is `true` and forwards every value to the transport's
//!   keep-connection input
//!
//! Lock calls run on the blocking pool. Crashed holders are reclaimed by the
//! storage's own lock expiry.

use crate::session::BackgroundService;
use crate::signal::{
    BlockingCalls, combine_latest, distinct_until_changed, switch_latest, watch_values,
};
use futures::{Stream, StreamExt};
use parley_storage::Storage;
use parley_transport::Transport;
use parley_types::MastershipIntent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Whether this process should run the background service.
///
/// `true` iff the latest intent wants mastership and the latest lock status
/// says this process holds the lock. Repeated values are suppressed.
pub fn effective_master<I, L>(intents: I, lock_held: L) -> impl Stream<Item = bool>
where
    I: Stream<Item = MastershipIntent>,
    L: Stream<Item = bool>,
{
    let combined = combine_latest(distinct_until_changed(intents), lock_held)
        .map(|(intent, held)| intent.wants_master() && held);
    distinct_until_changed(combined)
}

pub(crate) async fn drive_intent<I>(
    intents: I,
    storage: Arc<dyn Storage>,
    blocking: BlockingCalls,
    retry_interval: Duration,
) where
    I: Stream<Item = MastershipIntent>,
{
    switch_latest(distinct_until_changed(intents), move |intent| {
        let lock = MasterLock {
            storage: storage.clone(),
            blocking: blocking.clone(),
        };
        async move {
            debug!("Mastership intent: {:?}", intent);
            match intent {
                MastershipIntent::Immediate => lock.acquire_unless_held().await,
                MastershipIntent::WhenPossible => lock.keep_trying(retry_interval).await,
                MastershipIntent::Never => lock.resign().await,
            }
        }
    })
    .await;
}

pub(crate) async fn drive_master<I>(
    intents: I,
    lock_status: watch::Receiver<bool>,
    transport: Arc<dyn Transport>,
    service: Arc<dyn BackgroundService>,
) where
    I: Stream<Item = MastershipIntent>,
{
    let effective = effective_master(intents, watch_values(lock_status));
    switch_latest(effective, move |is_master| {
        transport.set_keep_connection(is_master);
        let service = service.clone();
        async move {
            if is_master {
                info!("Became master");
                service.run().await;
                debug!("{} finished while master", service.name());
            } else {
                info!("Resigned master");
            }
        }
    })
    .await;
}

/// The storage lock, driven from the blocking pool.
struct MasterLock {
    storage: Arc<dyn Storage>,
    blocking: BlockingCalls,
}

impl MasterLock {
    fn held(&self) -> bool {
        *self.storage.master_status().borrow()
    }

    async fn acquire_unless_held(&self) {
        if self.held() {
            return;
        }
        let storage = self.storage.clone();
        match self.blocking.run(move || storage.become_master()).await {
            Ok(Ok(true)) => debug!("Holding master lock"),
            Ok(Ok(false)) => debug!("Master lock held by another process"),
            Ok(Err(e)) => warn!("Failed to acquire master lock: {}", e),
            Err(e) => warn!("Master lock acquisition panicked: {}", e),
        }
    }

    async fn keep_trying(&self, retry_interval: Duration) {
        let mut status = self.storage.master_status();
        loop {
            status.mark_unchanged();
            self.acquire_unless_held().await;
            tokio::select! {
                changed = status.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                () = tokio::time::sleep(retry_interval) => {}
            }
        }
    }

    async fn resign(&self) {
        if !self.held() {
            return;
        }
        let storage = self.storage.clone();
        match self.blocking.run(move || storage.resign_master()).await {
            Ok(Ok(())) => debug!("Released master lock"),
            Ok(Err(e)) => warn!("Failed to release master lock: {}", e),
            Err(e) => warn!("Master lock release panicked: {}", e),
        }
    }
}
