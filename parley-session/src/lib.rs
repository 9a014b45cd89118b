//! Session core for Parley accounts.
//!
//! Reconstructs a session from stored state and runs the long-lived loops a
//! logged-in session owns:
//!
//! - [`open_account`]: bootstrap into an [`UnauthenticatedSession`] or a [`Session`]
//! - mastership: at most one process sharing the storage runs the background
//!   service, gated by the process's [`MastershipIntent`]
//! - presence: online/offline heartbeats with a local presence record
//! - push token: device registration on every token change
//! - [`verify_password`]: the two-step verification challenge
//!
//! # Ownership
//!
//! Every loop runs in a task owned by the [`Session`]. Dropping the session
//! aborts them; [`Session::shutdown`] also waits until they are gone, so no
//! loop touches storage after it returns.
//!
//! [`MastershipIntent`]: parley_types::MastershipIntent

mod bootstrap;
mod config;
mod error;
mod mastership;
pub mod paths;
mod presence;
mod push_token;
mod session;
pub mod signal;
mod two_step;

pub use bootstrap::{AccountEnvironment, AccountHandle, StorageKeychain, open_account};
pub use config::{DeviceConfig, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use mastership::effective_master;
pub use paths::{current_account_id, generate_account_id};
pub use push_token::DeviceMetadata;
pub use session::{BackgroundService, Session, UnauthenticatedSession};
pub use two_step::{TwoStepAuthData, password_hash, two_step_auth_data, verify_password};
