//! Identifier types used throughout the session core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifies one local account directory.
///
/// The token is opaque; ordering is lexicographic on the string form. A fresh
/// identity is a random UUID v4, but any non-empty token read back from disk
/// is accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Generates a new random account identity.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string().to_uppercase())
    }

    /// Wraps an existing token. Surrounding whitespace is trimmed.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let token = s.trim();
        if token.is_empty() || token.contains(['/', '\\']) {
            return Err(crate::Error::InvalidAccountId(s.to_string()));
        }
        Ok(Self(token.to_string()))
    }

    /// Returns the token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Identifies a remote peer (user, group, channel).
///
/// Packed into an `i64` for persistence: the namespace occupies the high
/// 32 bits and the id the low 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PeerId {
    namespace: i32,
    id: i32,
}

impl PeerId {
    /// Namespace of regular user peers.
    pub const NAMESPACE_USER: i32 = 0;

    #[must_use]
    pub const fn new(namespace: i32, id: i32) -> Self {
        Self { namespace, id }
    }

    /// Shorthand for a peer in the user namespace.
    #[must_use]
    pub const fn user(id: i32) -> Self {
        Self::new(Self::NAMESPACE_USER, id)
    }

    #[must_use]
    pub const fn namespace(&self) -> i32 {
        self.namespace
    }

    #[must_use]
    pub const fn id(&self) -> i32 {
        self.id
    }

    /// Packs the peer id into its persisted form.
    #[must_use]
    pub const fn to_i64(self) -> i64 {
        ((self.namespace as i64) << 32) | (self.id as u32 as i64)
    }

    /// Unpacks a persisted peer id.
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        Self {
            namespace: (value >> 32) as i32,
            id: (value & 0xFFFF_FFFF) as u32 as i32,
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

impl Serialize for PeerId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.to_i64())
    }
}

impl<'de> Deserialize<'de> for PeerId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Self::from_i64)
    }
}
