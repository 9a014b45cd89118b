//! Remote calls made by the session core.
//!
//! Payload encoding belongs to the transport's codec; these types only carry
//! the fields the core reads or writes.

use crate::error::{RpcError, RpcResult};
use parley_types::PeerId;
use serde::{Deserialize, Serialize};

/// Push token type of Apple push notification tokens.
pub const TOKEN_TYPE_APNS: i32 = 1;

/// A remote procedure call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum RpcCall {
    /// `account.getPassword`: current two-step verification settings.
    GetPassword,
    /// `auth.checkPassword`: answer the password challenge.
    CheckPassword { password_hash: Vec<u8> },
    /// `account.updateStatus`: mark the user online or offline.
    UpdateStatus { offline: bool },
    /// `account.registerDevice`: subscribe this device to push notifications.
    RegisterDevice(RegisterDevice),
}

impl RpcCall {
    /// Short method name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            RpcCall::GetPassword => "account.getPassword",
            RpcCall::CheckPassword { .. } => "auth.checkPassword",
            RpcCall::UpdateStatus { .. } => "account.updateStatus",
            RpcCall::RegisterDevice(_) => "account.registerDevice",
        }
    }
}

/// Arguments of [`RpcCall::RegisterDevice`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDevice {
    pub token_type: i32,
    /// Lowercase hex of the raw device token.
    pub token: String,
    pub device_model: String,
    pub system_version: String,
    pub app_version: String,
    /// True for development builds talking to the push sandbox.
    pub app_sandbox: bool,
    pub lang_code: String,
}

/// A response from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RpcResponse {
    PasswordConfig(PasswordConfig),
    Authorization(Authorization),
    Bool(bool),
}

impl RpcResponse {
    pub fn into_password_config(self) -> RpcResult<PasswordConfig> {
        match self {
            RpcResponse::PasswordConfig(config) => Ok(config),
            _ => Err(RpcError::UnexpectedResponse {
                call: "account.getPassword",
            }),
        }
    }

    pub fn into_authorization(self) -> RpcResult<Authorization> {
        match self {
            RpcResponse::Authorization(authorization) => Ok(authorization),
            _ => Err(RpcError::UnexpectedResponse {
                call: "auth.checkPassword",
            }),
        }
    }

    pub fn into_bool(self) -> RpcResult<bool> {
        match self {
            RpcResponse::Bool(value) => Ok(value),
            _ => Err(RpcError::UnexpectedResponse { call: "bool" }),
        }
    }
}

/// Two-step verification settings as returned by `account.getPassword`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordConfig {
    /// No password is set.
    NoPassword {
        new_salt: Vec<u8>,
        email_unconfirmed_pattern: String,
    },
    /// A password is set.
    Password {
        current_salt: Vec<u8>,
        new_salt: Vec<u8>,
        hint: String,
        has_recovery: bool,
        email_unconfirmed_pattern: String,
    },
}

/// Successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// The logged-in user.
    pub user_id: PeerId,
}
