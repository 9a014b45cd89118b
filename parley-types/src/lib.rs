//! Core type definitions for the Parley session core.
//!
//! This crate defines the plain data types every other layer agrees on:
//! - Account and peer identifiers
//! - The persisted account state (unauthenticated / authenticated)
//! - The mastership intent a process declares
//! - Local presence records
//!
//! Nothing here performs I/O. Persistence lives in `parley-storage`, the
//! remote side in `parley-transport`.

mod account;
mod ids;
mod presence;

pub use account::{
    AccountState, AuthenticatedState, DEFAULT_DATACENTER_ID, MastershipIntent, SyncCursor,
    UnauthenticatedState, is_valid_datacenter_id,
};
pub use ids::{AccountId, PeerId};
pub use presence::UserPresence;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid account id: {0:?}")]
    InvalidAccountId(String),
}
