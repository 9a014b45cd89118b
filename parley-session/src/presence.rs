//! Online/offline heartbeats.
//!
//! Going online writes one local presence record expiring far in the future,
//! then pushes "online" every `presence_interval` for as long as the state
//! lasts. Going offline writes one already-expired record and pushes
//! "offline" once. Both pushes retry until they land. A new state drops the
//! previous state's loop. Nothing here surfaces errors.

use crate::config::SessionConfig;
use crate::signal::{BlockingCalls, distinct_until_changed, switch_latest};
use chrono::Utc;
use futures::Stream;
use parley_storage::Storage;
use parley_transport::{RpcCall, Transport, retry_request};
use parley_types::{PeerId, UserPresence};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub(crate) struct PresenceContext {
    pub peer_id: PeerId,
    pub storage: Arc<dyn Storage>,
    pub transport: Arc<dyn Transport>,
    pub config: Arc<SessionConfig>,
    pub blocking: BlockingCalls,
}

pub(crate) async fn run<S>(keep_online: S, ctx: PresenceContext)
where
    S: Stream<Item = bool>,
{
    switch_latest(distinct_until_changed(keep_online), move |online| {
        let ctx = ctx.clone();
        async move {
            if online {
                ctx.stay_online().await;
            } else {
                ctx.go_offline().await;
            }
        }
    })
    .await;
}

impl PresenceContext {
    async fn stay_online(&self) {
        let now = Utc::now().timestamp();
        self.write_local(now.saturating_add(self.config.online_presence_ttl_secs))
            .await;

        let interval = self.config.presence_interval();
        loop {
            retry_request(
                self.transport.as_ref(),
                RpcCall::UpdateStatus { offline: false },
                &self.config.retry,
            )
            .await;
            debug!("Pushed online status, next in {:?}", interval);
            tokio::time::sleep(interval).await;
        }
    }

    async fn go_offline(&self) {
        self.write_local(Utc::now().timestamp() - 1).await;
        retry_request(
            self.transport.as_ref(),
            RpcCall::UpdateStatus { offline: true },
            &self.config.retry,
        )
        .await;
        debug!("Pushed offline status");
    }

    async fn write_local(&self, until: i64) {
        let presence = UserPresence::present_until(clamp_timestamp(until));
        let peer_id = self.peer_id;
        let storage = self.storage.clone();
        let written = self
            .blocking
            .run(move || {
                let entry = [(peer_id, presence)];
                storage.modify(&mut |modifier| modifier.update_peer_presences(&entry))
            })
            .await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to store presence of {}: {}", peer_id, e),
            Err(e) => warn!("Presence write for {} panicked: {}", peer_id, e),
        }
    }
}

fn clamp_timestamp(ts: i64) -> i32 {
    i32::try_from(ts).unwrap_or(if ts < 0 { i32::MIN } else { i32::MAX })
}
