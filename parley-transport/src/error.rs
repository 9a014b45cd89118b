//! Error types for remote calls.

use thiserror::Error;

/// Result type for remote calls.
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors a remote call can fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The server answered with an error.
    #[error("rpc error {code}: {description}")]
    Remote { code: i32, description: String },

    /// Network failure before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// Timeout.
    #[error("request timed out")]
    Timeout,

    /// The connection was closed while the request was in flight.
    #[error("connection closed")]
    ConnectionClosed,

    /// The server answered with a response of the wrong shape.
    #[error("unexpected response to {call}")]
    UnexpectedResponse { call: &'static str },
}

impl RpcError {
    /// Flood-wait responses use this code.
    pub const CODE_FLOOD: i32 = 420;

    /// Convenience constructor for server errors.
    pub fn remote(code: i32, description: impl Into<String>) -> Self {
        Self::Remote {
            code,
            description: description.into(),
        }
    }

    /// Returns true if retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::Network(_) | RpcError::Timeout | RpcError::ConnectionClosed => true,
            RpcError::Remote { code, .. } => *code == Self::CODE_FLOOD || *code >= 500,
            RpcError::UnexpectedResponse { .. } => false,
        }
    }

    /// Returns true if the server rejected the call (e.g. a wrong password).
    pub fn is_remote(&self) -> bool {
        matches!(self, RpcError::Remote { .. })
    }
}
