//! Error types for the session layer.

use parley_storage::StorageError;
use parley_transport::RpcError;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors surfaced by bootstrap and verification.
///
/// Maintenance loops never return these; they log and retry.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A remote call failed or was rejected (e.g. a wrong password).
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Datacenter ids are positive.
    #[error("invalid datacenter id: {0}")]
    InvalidDatacenter(i32),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl SessionError {
    /// The remote error, if the server rejected the call.
    pub fn as_rpc(&self) -> Option<&RpcError> {
        match self {
            SessionError::Rpc(e) => Some(e),
            _ => None,
        }
    }
}
