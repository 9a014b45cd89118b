//! Remote side of the Parley session core.
//!
//! The core does not implement a wire protocol. It names the remote calls it
//! makes ([`RpcCall`]), the responses it understands ([`RpcResponse`]) and the
//! traits a network layer must provide:
//!
//! - [`Transport`]: one live connection bound to a datacenter
//! - [`TransportConnector`]: opens transports and reads usage statistics
//! - [`Keychain`]: where a transport persists its long-lived auth keys
//!
//! [`retry_request`] is the uniform retry decorator used by every
//! fire-and-forget call. The [`mock`] module provides scripted doubles.

pub mod api;
mod error;
pub mod mock;
mod retry;
mod transport;

pub use api::{
    Authorization, PasswordConfig, RegisterDevice, RpcCall, RpcResponse, TOKEN_TYPE_APNS,
};
pub use error::{RpcError, RpcResult};
pub use retry::{RetryPolicy, retry_request};
pub use transport::{DatacenterId, Keychain, NetworkUsageStats, Transport, TransportConnector};
