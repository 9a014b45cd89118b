//! Local storage for one Parley account.
//!
//! Provides the persistence contract the session core relies on:
//! - a single polymorphic "state" slot holding the [`AccountState`]
//! - a keychain region (opaque bytes by string key) for transport credentials
//! - transactional [`Modifier`] access for derived records such as presence
//! - a cross-process master lock, observable as a `watch` stream
//!
//! # Architecture
//!
//! Payloads are stored as `(type tag, bytes)` pairs. The [`codec`] registry
//! maps each tag back to a decoder, so the state slot can hold any declared
//! payload type and the reader recovers the concrete variant.
//!
//! [`Postbox`] is the SQLite-backed implementation shared by every process of
//! one installation. [`mock::MemoryStorage`] is an in-process double for tests.
//!
//! [`AccountState`]: parley_types::AccountState

pub mod codec;
mod error;
pub mod mock;
mod postbox;
mod storage;

pub use codec::{CodecRegistry, Payload, declare_codecs, registry};
pub use error::{StorageError, StorageResult};
pub use postbox::{Postbox, PostboxConfig, PostboxFactory};
pub use storage::{Modifier, Storage, StorageFactory};
