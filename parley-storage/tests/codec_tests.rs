use parley_storage::codec::{
    self, TAG_ACCOUNT_AUTHENTICATED, TAG_ACCOUNT_UNAUTHENTICATED, TAG_USER_PRESENCE,
};
use parley_storage::{CodecRegistry, Payload, StorageError, declare_codecs, registry};
use parley_types::{AccountState, PeerId, SyncCursor, UserPresence};
use proptest::prelude::*;

fn arb_cursor() -> impl Strategy<Value = SyncCursor> {
    (any::<i32>(), any::<i32>(), any::<i32>(), any::<i32>())
        .prop_map(|(pts, qts, date, seq)| SyncCursor::new(pts, qts, date, seq))
}

fn arb_state() -> impl Strategy<Value = AccountState> {
    prop_oneof![
        (1..=i32::MAX).prop_map(AccountState::unauthenticated),
        (
            1..=i32::MAX,
            any::<i32>(),
            any::<i32>(),
            proptest::option::of(arb_cursor())
        )
            .prop_map(|(dc, ns, id, cursor)| {
                AccountState::authenticated(dc, PeerId::new(ns, id), cursor)
            }),
    ]
}

proptest! {
    #[test]
    fn account_state_reencodes_identically(state in arb_state()) {
        let registry = declare_codecs();
        let (tag, bytes) = codec::encode(&state).unwrap();
        let decoded = registry.decode(tag, &bytes).unwrap();
        let (tag2, bytes2) = codec::encode(decoded.as_ref()).unwrap();
        prop_assert_eq!(tag, tag2);
        prop_assert_eq!(bytes, bytes2);
        prop_assert_eq!(decoded.as_any().downcast_ref::<AccountState>(), Some(&state));
    }
}

// ── Registry ─────────────────────────────────────────────────────

#[test]
fn declare_is_idempotent() {
    let first: *const CodecRegistry = declare_codecs();
    let second: *const CodecRegistry = declare_codecs();
    assert_eq!(first, second);
    assert_eq!(declare_codecs().len(), 3);
}

#[test]
fn declare_from_many_threads_yields_one_registry() {
    let handles: Vec<_> = (0..8)
        .map(|_| std::thread::spawn(|| declare_codecs() as *const CodecRegistry as usize))
        .collect();
    let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(addrs.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(registry() as *const CodecRegistry as usize, addrs[0]);
}

#[test]
fn builtin_tags_registered() {
    let registry = declare_codecs();
    assert!(registry.contains(TAG_ACCOUNT_UNAUTHENTICATED));
    assert!(registry.contains(TAG_ACCOUNT_AUTHENTICATED));
    assert!(registry.contains(TAG_USER_PRESENCE));
    assert!(!registry.contains("message.text"));
}

#[test]
#[should_panic(expected = "no codec declared")]
fn unknown_tag_panics() {
    let _ = declare_codecs().decode("message.text", b"{}");
}

#[test]
fn malformed_bytes_are_recoverable() {
    let result = declare_codecs().decode(TAG_ACCOUNT_AUTHENTICATED, b"not json");
    assert!(matches!(result, Err(StorageError::Serialization(_))));
}

#[test]
fn non_positive_datacenter_is_invalid_data() {
    let registry = declare_codecs();
    let unauthenticated = registry.decode(TAG_ACCOUNT_UNAUTHENTICATED, br#"{"master_datacenter_id":-3}"#);
    assert!(matches!(unauthenticated, Err(StorageError::InvalidData(_))));

    let authenticated = registry.decode(
        TAG_ACCOUNT_AUTHENTICATED,
        br#"{"master_datacenter_id":0,"peer_id":77}"#,
    );
    assert!(matches!(authenticated, Err(StorageError::InvalidData(_))));
}

#[test]
fn decode_as_checks_type() {
    let registry = declare_codecs();
    let (tag, bytes) = codec::encode(&UserPresence::present_until(5)).unwrap();
    let presence: UserPresence = registry.decode_as(tag, &bytes).unwrap();
    assert_eq!(presence.until, 5);

    let mismatch = registry.decode_as::<AccountState>(tag, &bytes);
    assert!(matches!(mismatch, Err(StorageError::InvalidData(_))));
}

// ── Payload tags ─────────────────────────────────────────────────

#[test]
fn account_state_tag_follows_variant() {
    assert_eq!(
        AccountState::unauthenticated(2).type_tag(),
        TAG_ACCOUNT_UNAUTHENTICATED
    );
    assert_eq!(
        AccountState::authenticated(2, PeerId::user(1), None).type_tag(),
        TAG_ACCOUNT_AUTHENTICATED
    );
}

#[test]
fn older_body_without_cursor_decodes() {
    let registry = declare_codecs();
    let decoded = registry
        .decode(TAG_ACCOUNT_AUTHENTICATED, br#"{"master_datacenter_id":4,"peer_id":77}"#)
        .unwrap();
    let state = decoded.into_any().downcast::<AccountState>().unwrap();
    assert_eq!(*state, AccountState::authenticated(4, PeerId::user(77), None));
}
