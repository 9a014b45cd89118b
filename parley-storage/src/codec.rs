//! Process-wide payload codec registry.
//!
//! Every payload written through [`Storage`](crate::Storage) is stored next to
//! a stable type tag. [`declare_codecs`] builds the tag → decoder table once
//! per process; any number of calls from any thread yield the same table.
//! [`registry`] asserts that the table was declared before first use.
//!
//! An unknown tag at decode time means the process was wired without the
//! codec for a type it persisted. That is a programming error and panics;
//! malformed bytes under a known tag are an ordinary [`StorageError`].

use crate::error::{StorageError, StorageResult};
use parley_types::{
    AccountState, AuthenticatedState, UnauthenticatedState, UserPresence, is_valid_datacenter_id,
};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

/// Tag of [`AccountState::Unauthenticated`].
pub const TAG_ACCOUNT_UNAUTHENTICATED: &str = "account.unauthenticated";
/// Tag of [`AccountState::Authenticated`].
pub const TAG_ACCOUNT_AUTHENTICATED: &str = "account.authenticated";
/// Tag of [`UserPresence`].
pub const TAG_USER_PRESENCE: &str = "presence.user";

/// A value that can be stored under a type tag.
pub trait Payload: Any + fmt::Debug + Send + Sync {
    /// The stable tag the decoder is registered under.
    fn type_tag(&self) -> &'static str;

    /// Encodes the payload body (without the tag).
    fn encode(&self) -> StorageResult<Vec<u8>>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

/// Decodes a payload body previously produced by [`Payload::encode`].
pub type DecodeFn = fn(&[u8]) -> StorageResult<Box<dyn Payload>>;

/// Maps type tags to decoders.
pub struct CodecRegistry {
    decoders: HashMap<&'static str, DecodeFn>,
}

static REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();

/// Builds the process-wide registry if it does not exist yet.
pub fn declare_codecs() -> &'static CodecRegistry {
    REGISTRY.get_or_init(|| {
        let mut registry = CodecRegistry {
            decoders: HashMap::new(),
        };
        registry.declare(TAG_ACCOUNT_UNAUTHENTICATED, decode_unauthenticated);
        registry.declare(TAG_ACCOUNT_AUTHENTICATED, decode_authenticated);
        registry.declare(TAG_USER_PRESENCE, decode_user_presence);
        debug!("Declared {} storage codecs", registry.len());
        registry
    })
}

/// Returns the process-wide registry.
///
/// # Panics
///
/// Panics if [`declare_codecs`] has not run in this process.
pub fn registry() -> &'static CodecRegistry {
    REGISTRY
        .get()
        .expect("codec registry used before declare_codecs()")
}

/// Encodes a payload into its `(tag, body)` pair.
pub fn encode(payload: &dyn Payload) -> StorageResult<(&'static str, Vec<u8>)> {
    Ok((payload.type_tag(), payload.encode()?))
}

impl CodecRegistry {
    fn declare(&mut self, tag: &'static str, decode: DecodeFn) {
        let previous = self.decoders.insert(tag, decode);
        assert!(previous.is_none(), "codec tag {tag:?} declared twice");
    }

    /// Whether a decoder is registered for `tag`.
    pub fn contains(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }

    /// Number of registered decoders.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decodes a stored payload back into its concrete type.
    ///
    /// # Panics
    ///
    /// Panics if no decoder is registered for `tag`.
    pub fn decode(&self, tag: &str, bytes: &[u8]) -> StorageResult<Box<dyn Payload>> {
        let Some(decode) = self.decoders.get(tag) else {
            panic!("no codec declared for type tag {tag:?}");
        };
        decode(bytes)
    }

    /// Decodes a stored payload and checks that it has the expected type.
    pub fn decode_as<T: Payload>(&self, tag: &str, bytes: &[u8]) -> StorageResult<T> {
        self.decode(tag, bytes)?
            .into_any()
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| {
                StorageError::InvalidData(format!(
                    "payload tagged {tag:?} is not a {}",
                    std::any::type_name::<T>()
                ))
            })
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.decoders.keys().collect();
        tags.sort();
        f.debug_struct("CodecRegistry").field("tags", &tags).finish()
    }
}

// ── Built-in payloads ────────────────────────────────────────────

fn decode_unauthenticated(bytes: &[u8]) -> StorageResult<Box<dyn Payload>> {
    let state: UnauthenticatedState = serde_json::from_slice(bytes)?;
    checked_account_state(AccountState::Unauthenticated(state))
}

fn decode_authenticated(bytes: &[u8]) -> StorageResult<Box<dyn Payload>> {
    let state: AuthenticatedState = serde_json::from_slice(bytes)?;
    checked_account_state(AccountState::Authenticated(state))
}

fn checked_account_state(state: AccountState) -> StorageResult<Box<dyn Payload>> {
    let datacenter_id = state.master_datacenter_id();
    if !is_valid_datacenter_id(datacenter_id) {
        return Err(StorageError::InvalidData(format!(
            "account state names datacenter {datacenter_id}"
        )));
    }
    Ok(Box::new(state))
}

fn decode_user_presence(bytes: &[u8]) -> StorageResult<Box<dyn Payload>> {
    let presence: UserPresence = serde_json::from_slice(bytes)?;
    Ok(Box::new(presence))
}

impl Payload for AccountState {
    fn type_tag(&self) -> &'static str {
        match self {
            AccountState::Unauthenticated(_) => TAG_ACCOUNT_UNAUTHENTICATED,
            AccountState::Authenticated(_) => TAG_ACCOUNT_AUTHENTICATED,
        }
    }

    fn encode(&self) -> StorageResult<Vec<u8>> {
        let bytes = match self {
            AccountState::Unauthenticated(state) => serde_json::to_vec(state)?,
            AccountState::Authenticated(state) => serde_json::to_vec(state)?,
        };
        Ok(bytes)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

impl Payload for UserPresence {
    fn type_tag(&self) -> &'static str {
        TAG_USER_PRESENCE
    }

    fn encode(&self) -> StorageResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}
