//! Two-step verification.

use crate::error::SessionResult;
use crate::session::UnauthenticatedSession;
use parley_transport::{Authorization, PasswordConfig, RpcCall, Transport};
use sha2::{Digest, Sha256};
use tracing::debug;

/// The account's password settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoStepAuthData {
    /// Salt to use when setting a new password.
    pub next_salt: Vec<u8>,
    /// Salt of the current password. `None` if no password is set.
    pub current_salt: Option<Vec<u8>>,
    pub has_recovery: bool,
    pub current_hint: Option<String>,
    /// Pattern of an email address awaiting confirmation.
    pub unconfirmed_email_pattern: Option<String>,
}

impl From<PasswordConfig> for TwoStepAuthData {
    fn from(config: PasswordConfig) -> Self {
        match config {
            PasswordConfig::NoPassword {
                new_salt,
                email_unconfirmed_pattern,
            } => Self {
                next_salt: new_salt,
                current_salt: None,
                has_recovery: false,
                current_hint: None,
                unconfirmed_email_pattern: non_empty(email_unconfirmed_pattern),
            },
            PasswordConfig::Password {
                current_salt,
                new_salt,
                hint,
                has_recovery,
                email_unconfirmed_pattern,
            } => Self {
                next_salt: new_salt,
                current_salt: Some(current_salt),
                has_recovery,
                current_hint: Some(hint),
                unconfirmed_email_pattern: non_empty(email_unconfirmed_pattern),
            },
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// Fetches the password settings with a single request.
pub async fn two_step_auth_data(transport: &dyn Transport) -> SessionResult<TwoStepAuthData> {
    let config = transport
        .request(RpcCall::GetPassword)
        .await?
        .into_password_config()?;
    Ok(config.into())
}

/// `SHA256(salt || password || salt)`
pub fn password_hash(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.update(salt);
    hasher.finalize().into()
}

/// Answers the password challenge.
///
/// Remote failures, including a wrong password, are returned as
/// [`SessionError::Rpc`](crate::SessionError::Rpc) without retrying.
///
/// # Panics
///
/// Panics if the account has no password set. Callers check
/// [`TwoStepAuthData::current_salt`] before asking for a password.
pub async fn verify_password(
    session: &UnauthenticatedSession,
    password: &str,
) -> SessionResult<Authorization> {
    let transport = session.transport().as_ref();
    let data = two_step_auth_data(transport).await?;
    let Some(salt) = data.current_salt else {
        panic!("verify_password on account {} without a password", session.id());
    };

    debug!("Checking password for account {}", session.id());
    let hash = password_hash(&salt, password);
    let authorization = transport
        .request(RpcCall::CheckPassword {
            password_hash: hash.to_vec(),
        })
        .await?
        .into_authorization()?;
    Ok(authorization)
}
