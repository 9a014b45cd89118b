mod common;

use common::{Harness, USER, offline_pushes, online_pushes, wait_until};
use parley_storage::Storage;
use parley_transport::RpcError;
use pretty_assertions::assert_eq;
use std::time::Duration;

const YEAR_SECS: i64 = 365 * 24 * 60 * 60;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn assert_near(actual: i32, expected: i64) {
    let delta = (i64::from(actual) - expected).abs();
    assert!(delta <= 5, "expected ~{expected}, got {actual}");
}

// ── Online ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn going_online_writes_once_and_pushes_every_interval() {
    let harness = Harness::new();
    let (session, transport, storage) = harness.open_session().await;

    session.set_keep_online_presence(true);
    wait_until(|| online_pushes(&transport) == 1).await;

    let writes = storage.presence_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, USER);
    assert_near(writes[0].1.until, now() + YEAR_SECS);

    tokio::time::sleep(Duration::from_secs(60)).await;
    wait_until(|| online_pushes(&transport) == 2).await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    wait_until(|| online_pushes(&transport) == 3).await;

    // The local record is not rewritten on every tick.
    assert_eq!(storage.presence_writes().len(), 1);
    assert_eq!(offline_pushes(&transport), 0);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_pushes_are_retried_without_extra_writes() {
    let harness = Harness::new();
    let (session, transport, storage) = harness.open_session().await;
    transport.push_response(Err(RpcError::Timeout));
    transport.push_response(Err(RpcError::remote(500, "INTERNAL")));

    session.set_keep_online_presence(true);
    wait_until(|| online_pushes(&transport) == 3).await;

    assert_eq!(storage.presence_writes().len(), 1);
    session.shutdown().await;
}

// ── Offline ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn going_offline_expires_record_and_pushes_once() {
    let harness = Harness::new();
    let (session, transport, storage) = harness.open_session().await;

    session.set_keep_online_presence(true);
    wait_until(|| online_pushes(&transport) == 1).await;

    session.set_keep_online_presence(false);
    wait_until(|| offline_pushes(&transport) == 1).await;

    let writes = storage.presence_writes();
    assert_eq!(writes.len(), 2);
    assert_near(writes[1].1.until, now() - 1);
    assert!(writes[1].1.is_expired_at(now()));
    assert_eq!(storage.peer_presence(USER).unwrap(), Some(writes[1].1));

    // The online loop is gone and offline is not repeated.
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(online_pushes(&transport), 1);
    assert_eq!(offline_pushes(&transport), 1);
    assert_eq!(storage.presence_writes().len(), 2);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_value_is_ignored() {
    let harness = Harness::new();
    let (session, transport, storage) = harness.open_session().await;

    session.set_keep_online_presence(false);
    wait_until(|| offline_pushes(&transport) == 1).await;
    session.set_keep_online_presence(false);
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(offline_pushes(&transport), 1);
    assert_eq!(storage.presence_writes().len(), 1);
    session.shutdown().await;
}

// ── Switching ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn rapid_toggling_leaves_one_online_loop() {
    let harness = Harness::new();
    let (session, transport, _storage) = harness.open_session().await;

    session.set_keep_online_presence(true);
    wait_until(|| online_pushes(&transport) == 1).await;

    session.set_keep_online_presence(false);
    session.set_keep_online_presence(true);
    tokio::time::sleep(Duration::from_millis(1)).await;
    session.set_keep_online_presence(false);
    tokio::time::sleep(Duration::from_millis(1)).await;
    session.set_keep_online_presence(true);
    tokio::time::sleep(Duration::from_millis(1)).await;

    let before = online_pushes(&transport);
    tokio::time::sleep(Duration::from_secs(600)).await;
    let pushed = online_pushes(&transport) - before;

    // One loop pushes ten times in ten minutes; two would push twenty.
    assert!((10..=11).contains(&pushed), "pushed {pushed} times");
    session.shutdown().await;
}
