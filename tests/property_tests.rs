//! Property-based tests for the service invariants.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Approval is idempotent and toggling twice is a no-op
//! - The knowledge document survives persist and reload unchanged
//! - Search always finds an existing key and never returns more than 7 entries
//! - Reload reports exactly the keys that appeared
//! - Fan-out success count is recipients minus failures
//! - Blocked users leave no search history

#![allow(clippy::expect_used, clippy::unwrap_used)]

use kbgate::bot::{Inbound, Router, Sender};
use kbgate::knowledge::{KnowledgeMap, document};
use kbgate::models::{UserId, UserStatus};
use kbgate::services::{
    AccessControl, MAX_RESULTS, NotificationFanout, SearchHistoryLog, search,
};
use kbgate::storage::{HistoryStore, SqliteStore, UserStore};
use kbgate::transport::{OutboundMessage, RecordingTransport};
use kbgate::KnowledgeBase;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const ADMIN: UserId = UserId::new(1);

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn access() -> (AccessControl, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::in_memory().expect("store"));
    (AccessControl::new(store.clone(), ADMIN), store)
}

fn key() -> impl Strategy<Value = String> {
    "[a-z]{1,6}"
}

fn description() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{0,8}( [a-z]{1,8}){0,3}\\."
}

/// Builds a map with last-write-wins values at first-seen positions.
fn map_of(pairs: &[(String, String)]) -> KnowledgeMap {
    let mut map = KnowledgeMap::new();
    for (k, v) in pairs {
        map.insert(k.clone(), v.clone());
    }
    map
}

fn write_document(dir: &TempDir, map: &KnowledgeMap) -> std::path::PathBuf {
    let path = dir.path().join("data.kb");
    std::fs::write(&path, document::encode(map)).expect("write document");
    path
}

proptest! {
    /// Property: approving twice leaves the user approved.
    #[test]
    fn prop_approve_is_idempotent(id in 2i64..1_000_000) {
        let (access, store) = access();
        let id = UserId::new(id);
        access.request_access(id, "someone").expect("request");

        access.approve(id).expect("first approve");
        access.approve(id).expect("second approve");

        prop_assert_eq!(store.get(id).expect("get").expect("record").status, UserStatus::Approved);
    }

    /// Property: toggling an approved user twice returns it to approved.
    #[test]
    fn prop_toggle_twice_restores_approved(id in 2i64..1_000_000) {
        let (access, _store) = access();
        let id = UserId::new(id);
        access.force_approve(&[id]).expect("approve");

        prop_assert_eq!(access.toggle(id).expect("toggle"), UserStatus::Blocked);
        prop_assert_eq!(access.toggle(id).expect("toggle"), UserStatus::Approved);
        prop_assert!(access.is_approved(id));
    }

    /// Property: entries added through the service reload unchanged.
    #[test]
    fn prop_persist_then_reload_round_trips(
        pairs in prop::collection::vec((key(), description()), 0..12)
    ) {
        let dir = TempDir::new().expect("tempdir");
        let path = write_document(&dir, &KnowledgeMap::new());

        let kb = KnowledgeBase::open(&path);
        for (k, v) in &pairs {
            kb.add(k, v).expect("add");
        }
        let reopened = KnowledgeBase::open(&path);

        let expected = map_of(&pairs);
        prop_assert_eq!(reopened.with_entries(Clone::clone), expected.clone());
        prop_assert_eq!(kb.with_entries(Clone::clone), expected);
    }

    /// Property: an existing key is always found by its own name.
    ///
    /// At most seven entries, so truncation cannot hide it.
    #[test]
    fn prop_search_includes_existing_key(
        pairs in prop::collection::vec((key(), description()), 1..=MAX_RESULTS),
        pick in any::<prop::sample::Index>(),
    ) {
        let map = map_of(&pairs);
        let (k, v) = map.get_index(pick.index(map.len())).expect("entry");

        let results = search(&map, &k.to_uppercase());

        prop_assert!(results
            .entries
            .iter()
            .any(|e| &e.key == k && &e.description == v));
    }

    /// Property: results are capped at seven and flagged exactly when full.
    #[test]
    fn prop_results_capped_and_flagged(
        pairs in prop::collection::vec((key(), description()), 0..30),
        query in "[a-z]{1,3}",
    ) {
        let map = map_of(&pairs);
        let raw = map
            .keys()
            .filter(|k| k.contains(query.as_str()) || query.contains(k.as_str()))
            .count();

        let results = search(&map, &query);

        prop_assert_eq!(results.entries.len(), raw.min(MAX_RESULTS));
        prop_assert_eq!(results.is_capped(), raw >= MAX_RESULTS);
        if raw == MAX_RESULTS {
            prop_assert!(results.is_capped());
        }
    }

    /// Property: reload reports exactly the keys that appeared, in document order.
    #[test]
    fn prop_reload_diff_is_exact(
        before in prop::collection::vec((key(), description()), 0..10),
        after in prop::collection::vec((key(), description()), 0..10),
    ) {
        let dir = TempDir::new().expect("tempdir");
        let before = map_of(&before);
        let after = map_of(&after);
        let path = write_document(&dir, &before);
        let kb = KnowledgeBase::open(&path);

        write_document(&dir, &after);
        let new_keys = kb.reload_and_diff();

        let expected: Vec<String> = after
            .keys()
            .filter(|k| !before.contains_key(*k))
            .cloned()
            .collect();
        prop_assert_eq!(new_keys, expected);
        prop_assert_eq!(kb.with_entries(Clone::clone), after);
    }

    /// Property: every recipient is attempted and failures only reduce the count.
    #[test]
    fn prop_broadcast_counts_failures(
        recipients in prop::collection::btree_set(2i64..500, 0..20),
        failing in prop::collection::btree_set(2i64..500, 0..20),
    ) {
        let transport = Arc::new(RecordingTransport::new());
        for id in &failing {
            transport.fail_for(UserId::new(*id));
        }
        let fanout = NotificationFanout::new(transport.clone(), Duration::ZERO, Duration::from_secs(1));
        let ids: Vec<UserId> = recipients.iter().copied().map(UserId::new).collect();
        let failed = recipients.intersection(&failing).count();

        let delivered = runtime().block_on(fanout.broadcast(&ids, &OutboundMessage::plain("hello")));

        prop_assert_eq!(delivered, ids.len() - failed);
        let attempted: BTreeSet<i64> = transport.attempts().iter().map(|id| id.get()).collect();
        prop_assert_eq!(attempted, recipients);
    }

    /// Property: whatever a blocked user sends, no history is recorded.
    #[test]
    fn prop_blocked_user_leaves_no_history(text in "\\PC{1,40}") {
        let dir = TempDir::new().expect("tempdir");
        let store = Arc::new(SqliteStore::in_memory().expect("store"));
        let transport = Arc::new(RecordingTransport::new());
        let router = Router::new(
            AccessControl::new(store.clone(), ADMIN),
            Arc::new(KnowledgeBase::open(dir.path().join("data.kb"))),
            SearchHistoryLog::new(store.clone()),
            NotificationFanout::new(transport, Duration::ZERO, Duration::from_secs(1)),
        );
        let blocked = UserId::new(42);
        router.access().force_approve(&[blocked]).expect("approve");
        router.access().toggle(blocked).expect("block");

        runtime().block_on(router.handle(Inbound::message(Sender::new(blocked, "Mallory"), text)));

        prop_assert_eq!(store.count_since(i64::MIN).expect("count"), 0);
    }
}
