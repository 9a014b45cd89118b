//! Retry decorator for fire-and-forget calls.

use crate::api::{RpcCall, RpcResponse};
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff between attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub initial_delay_ms: u64,
    pub multiplier: u32,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 200,
            multiplier: 2,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(attempt.min(16));
        let ms = self.initial_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Sends `call` until it succeeds.
///
/// Every failure is retried after the policy's backoff; the future only
/// completes with a response. Callers bound it by aborting the task it runs in.
pub async fn retry_request(
    transport: &dyn Transport,
    call: RpcCall,
    policy: &RetryPolicy,
) -> RpcResponse {
    let mut attempt: u32 = 0;
    loop {
        match transport.request(call.clone()).await {
            Ok(response) => {
                if attempt > 0 {
                    debug!("{} succeeded after {} retries", call.name(), attempt);
                }
                return response;
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                if e.is_transient() {
                    debug!("{} failed ({}), retrying in {:?}", call.name(), e, delay);
                } else {
                    warn!("{} failed ({}), retrying in {:?}", call.name(), e, delay);
                }
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
