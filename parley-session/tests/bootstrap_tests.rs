mod common;

use common::{Harness, USER};
use parley_session::paths::{CURRENT_ACCOUNT_FILE, account_base_path, network_usage_path, postbox_path};
use parley_session::{
    AccountEnvironment, AccountHandle, SessionConfig, SessionError, current_account_id,
    generate_account_id, open_account,
};
use parley_storage::{PostboxFactory, Storage, StorageError};
use parley_transport::{Keychain, NetworkUsageStats, Transport};
use parley_types::{AccountState, PeerId, UserPresence};
use pretty_assertions::assert_eq;
use std::sync::Arc;

// ── open_account ─────────────────────────────────────────────────

#[tokio::test]
async fn first_run_is_unauthenticated_on_bootstrap_datacenter() {
    let harness = Harness::new();
    let handle = harness.open().await;

    let session = handle.into_unauthenticated().expect("unauthenticated");
    assert_eq!(session.master_datacenter_id(), 2);
    assert_eq!(session.id(), &harness.id);
    assert_eq!(session.base_path(), harness.base_path());

    let connections = harness.network.connections();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].datacenter_id, 2);
    assert_eq!(
        connections[0].usage_path,
        harness.root.join("accountTEST-ACCOUNT").join("network-usage")
    );
    assert_eq!(
        harness.storage.opened_paths(),
        vec![harness.root.join("accountTEST-ACCOUNT").join("postbox")]
    );

    // Bootstrap does not write state.
    assert!(harness.account_storage().raw_state().is_none());
}

#[tokio::test]
async fn configured_bootstrap_datacenter_is_used_without_state() {
    let mut harness = Harness::new();
    harness.config.bootstrap_datacenter_id = 4;
    let session = harness.open().await.into_unauthenticated().unwrap();
    assert_eq!(session.master_datacenter_id(), 4);
}

#[tokio::test]
async fn stored_unauthenticated_state_keeps_its_datacenter() {
    let harness = Harness::new();
    harness
        .account_storage()
        .set_state(&AccountState::unauthenticated(3))
        .unwrap();

    let session = harness.open().await.into_unauthenticated().unwrap();
    assert_eq!(session.master_datacenter_id(), 3);
    assert_eq!(harness.network.connections()[0].datacenter_id, 3);
}

#[tokio::test]
async fn stored_login_opens_session_on_its_datacenter() {
    let harness = Harness::new();
    harness.store_logged_in(5);

    let handle = harness.open().await;
    assert!(handle.is_authenticated());
    let session = handle.into_session().unwrap();

    assert_eq!(session.peer_id(), USER);
    assert_eq!(session.master_datacenter_id(), 5);
    assert_eq!(session.transport().datacenter_id(), 5);
    assert_eq!(harness.network.connections()[0].datacenter_id, 5);
    session.shutdown().await;
}

#[tokio::test]
async fn stored_non_positive_datacenter_is_rejected() {
    let harness = Harness::new();
    harness
        .account_storage()
        .set_state(&AccountState::unauthenticated(-3))
        .unwrap();

    let Err(err) = open_account(&harness.id, &harness.root, &harness.env()).await else {
        panic!("opened an account bound to datacenter -3");
    };
    assert!(matches!(err, SessionError::Storage(StorageError::InvalidData(_))));
    assert!(harness.network.connections().is_empty());
}

#[tokio::test]
async fn non_positive_bootstrap_datacenter_is_rejected() {
    let mut harness = Harness::new();
    harness.config.bootstrap_datacenter_id = 0;

    let Err(err) = open_account(&harness.id, &harness.root, &harness.env()).await else {
        panic!("opened an account bound to datacenter 0");
    };
    assert!(matches!(err, SessionError::InvalidDatacenter(0)));
    assert!(harness.network.connections().is_empty());
}

#[tokio::test]
#[should_panic(expected = "unexpected payload")]
async fn foreign_payload_in_state_slot_panics() {
    let harness = Harness::new();
    harness
        .account_storage()
        .set_state(&UserPresence::present_until(1))
        .unwrap();
    let _ = harness.open().await;
}

#[tokio::test]
async fn transport_keychain_is_backed_by_storage() {
    let harness = Harness::new();
    let _session = harness.open().await;
    let storage = harness.account_storage();

    let keychain = harness.network.connections()[0].keychain.clone();
    keychain.set("auth_key_2", b"secret");
    assert_eq!(
        storage.keychain_entry("auth_key_2").unwrap(),
        Some(b"secret".to_vec())
    );

    storage.set_keychain_entry("server_salt", b"salt").unwrap();
    assert_eq!(keychain.get("server_salt"), Some(b"salt".to_vec()));

    keychain.remove("auth_key_2");
    assert_eq!(storage.keychain_entry("auth_key_2").unwrap(), None);
}

// ── change_master_datacenter ─────────────────────────────────────

#[tokio::test]
async fn non_positive_datacenter_is_not_connected() {
    let harness = Harness::new();
    for datacenter_id in [0, -1] {
        let session = harness.open().await.into_unauthenticated().unwrap();
        let Err(err) = session.change_master_datacenter(datacenter_id).await else {
            panic!("moved to datacenter {datacenter_id}");
        };
        assert!(matches!(err, SessionError::InvalidDatacenter(id) if id == datacenter_id));
    }
    assert!(harness.network.connections().iter().all(|c| c.datacenter_id == 2));
}

#[tokio::test]
async fn same_datacenter_keeps_the_connection() {
    let harness = Harness::new();
    let session = harness.open().await.into_unauthenticated().unwrap();

    let session = session.change_master_datacenter(2).await.unwrap();
    assert_eq!(session.master_datacenter_id(), 2);
    assert_eq!(harness.network.connections().len(), 1);
}

#[tokio::test]
async fn new_datacenter_reconnects_with_same_keychain() {
    let harness = Harness::new();
    let session = harness.open().await.into_unauthenticated().unwrap();
    harness.network.connections()[0]
        .keychain
        .set("auth_key_2", b"k2");

    let moved = session.change_master_datacenter(4).await.unwrap();
    assert_eq!(moved.master_datacenter_id(), 4);
    assert_eq!(moved.id(), &harness.id);

    let connections = harness.network.connections();
    assert_eq!(connections.len(), 2);
    assert_eq!(connections[1].datacenter_id, 4);
    assert_eq!(connections[1].usage_path, connections[0].usage_path);
    assert_eq!(connections[1].keychain.get("auth_key_2"), Some(b"k2".to_vec()));

    // The move is not persisted.
    assert!(harness.account_storage().raw_state().is_none());
}

// ── Network statistics ───────────────────────────────────────────

#[tokio::test]
async fn network_stats_are_read_from_the_account_path() {
    let harness = Harness::new();
    let stats = NetworkUsageStats {
        wifi_incoming: 10,
        wifi_outgoing: 20,
        cellular_incoming: 3,
        cellular_outgoing: 4,
    };
    harness
        .network
        .set_usage_stats(network_usage_path(&harness.base_path()), stats);

    let session = harness.open().await.into_unauthenticated().unwrap();
    let read = session.current_network_stats().await.unwrap();
    assert_eq!(read, stats);
    assert_eq!(read.total(), 37);
}

// ── Identity ─────────────────────────────────────────────────────

#[tokio::test]
async fn current_account_id_is_created_once() {
    let dir = tempfile::tempdir().unwrap();

    let first = current_account_id(dir.path()).await.unwrap();
    let second = current_account_id(dir.path()).await.unwrap();
    assert_eq!(first, second);

    let stored = std::fs::read_to_string(dir.path().join(CURRENT_ACCOUNT_FILE)).unwrap();
    assert_eq!(stored, first.as_str());
}

#[tokio::test]
async fn current_account_id_reads_existing_token() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(CURRENT_ACCOUNT_FILE), "LEGACY-ID\n").unwrap();

    let id = current_account_id(dir.path()).await.unwrap();
    assert_eq!(id.as_str(), "LEGACY-ID");
}

#[tokio::test]
async fn malformed_account_id_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(CURRENT_ACCOUNT_FILE), "  \n").unwrap();

    let id = current_account_id(dir.path()).await.unwrap();
    let stored = std::fs::read_to_string(dir.path().join(CURRENT_ACCOUNT_FILE)).unwrap();
    assert_eq!(stored, id.as_str());
}

#[test]
fn generated_ids_are_distinct() {
    assert_ne!(generate_account_id(), generate_account_id());
}

#[test]
fn account_layout() {
    let id = parley_types::AccountId::parse("ABC").unwrap();
    let base = account_base_path(std::path::Path::new("/data"), &id);
    assert_eq!(base, std::path::PathBuf::from("/data/accountABC"));
    assert_eq!(postbox_path(&base), std::path::PathBuf::from("/data/accountABC/postbox"));
    assert_eq!(
        network_usage_path(&base),
        std::path::PathBuf::from("/data/accountABC/network-usage")
    );
}

// ── Configuration ────────────────────────────────────────────────

#[test]
fn config_defaults() {
    let config = SessionConfig::default();
    assert_eq!(config.bootstrap_datacenter_id, 2);
    assert_eq!(config.presence_interval_secs, 60);
    assert_eq!(config.online_presence_ttl_secs, 365 * 24 * 60 * 60);
    assert_eq!(config.device.lang_code, "en");
}

#[test]
fn config_from_partial_json() {
    let config = SessionConfig::from_json(
        r#"{"presence_interval_secs": 30, "device": {"lang_code": "de"}, "retry": {"max_delay_ms": 100}}"#,
    )
    .unwrap();
    assert_eq!(config.presence_interval_secs, 30);
    assert_eq!(config.device.lang_code, "de");
    assert_eq!(config.retry.max_delay_ms, 100);
    assert_eq!(config.retry.initial_delay_ms, 200);
    assert_eq!(config.bootstrap_datacenter_id, 2);
}

#[test]
fn config_rejects_malformed_json() {
    assert!(SessionConfig::from_json("{").is_err());
}

// ── On-disk storage ──────────────────────────────────────────────

#[tokio::test]
async fn postbox_backed_account_round_trips_login() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let env = AccountEnvironment {
        storage: Arc::new(PostboxFactory::default()),
        ..harness.env()
    };
    let id = current_account_id(dir.path()).await.unwrap();

    let handle = parley_session::open_account(&id, dir.path(), &env).await.unwrap();
    let session = handle.into_unauthenticated().unwrap();
    assert!(postbox_path(&account_base_path(dir.path(), &id)).is_dir());

    let peer = PeerId::user(77);
    session
        .storage()
        .set_state(&AccountState::unauthenticated(session.master_datacenter_id()).logged_in(peer))
        .unwrap();
    drop(session);

    match parley_session::open_account(&id, dir.path(), &env).await.unwrap() {
        AccountHandle::Authenticated(session) => {
            assert_eq!(session.peer_id(), peer);
            assert_eq!(session.master_datacenter_id(), 2);
            session.shutdown().await;
        }
        AccountHandle::Unauthenticated(_) => panic!("expected a logged-in session"),
    }
}
