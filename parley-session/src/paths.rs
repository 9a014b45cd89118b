//! On-disk layout of an installation.
//!
//! ```text
//! <root>/currentAccountId           identity of the active account
//! <root>/account<id>/postbox/       storage tree
//! <root>/account<id>/network-usage  transport traffic counters
//! ```

use crate::error::SessionResult;
use parley_types::AccountId;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File under the root holding the active account identity.
pub const CURRENT_ACCOUNT_FILE: &str = "currentAccountId";

/// Returns the active account identity, creating and saving one on first run.
///
/// An unreadable or malformed file is replaced by a fresh identity.
pub async fn current_account_id(root: &Path) -> SessionResult<AccountId> {
    let path = root.join(CURRENT_ACCOUNT_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => match AccountId::parse(&contents) {
            Ok(id) => return Ok(id),
            Err(e) => warn!("Ignoring {}: {}", path.display(), e),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let id = generate_account_id();
    tokio::fs::create_dir_all(root).await?;
    tokio::fs::write(&path, id.as_str()).await?;
    info!("Created account identity {}", id);
    Ok(id)
}

/// A fresh, never-persisted account identity.
pub fn generate_account_id() -> AccountId {
    AccountId::generate()
}

/// `<root>/account<id>`
pub fn account_base_path(root: &Path, id: &AccountId) -> PathBuf {
    root.join(format!("account{id}"))
}

/// `<base>/postbox`
pub fn postbox_path(base_path: &Path) -> PathBuf {
    base_path.join("postbox")
}

/// `<base>/network-usage`
pub fn network_usage_path(base_path: &Path) -> PathBuf {
    base_path.join("network-usage")
}
