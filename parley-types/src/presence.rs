use serde::{Deserialize, Serialize};

/// Locally cached presence of a peer.
///
/// The peer is shown online until the Unix timestamp `until`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPresence {
    pub until: i32,
}

impl UserPresence {
    #[must_use]
    pub const fn present_until(until: i32) -> Self {
        Self { until }
    }

    /// Whether the presence has expired at the Unix time `now`.
    #[must_use]
    pub const fn is_expired_at(&self, now: i64) -> bool {
        (self.until as i64) <= now
    }
}
