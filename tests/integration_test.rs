//! Integration tests for the capture store lifecycle

use std::io::Write;
use std::sync::Arc;

use proptest::prelude::*;
use tempfile::NamedTempFile;

use httpcap::registry::DEFAULT_STORE;
use httpcap::{
    RequestMetadata, ResponseMetadata, StoreConfig, StoreRegistry, TransactionId,
    TransactionRecord, TransactionState, TransactionStore,
};

/// Record with a fixed id derived from `n`
fn record(n: u8) -> TransactionRecord {
    TransactionRecord::with_id(
        TransactionId::from_bytes([n; 16]),
        RequestMetadata::new("GET", format!("https://api.example.com/items/{n}")),
    )
}

fn ids(records: &[TransactionRecord]) -> Vec<TransactionId> {
    records.iter().map(TransactionRecord::id).collect()
}

#[test]
fn test_capacity_remove_reset_scenario() {
    let store = TransactionStore::with_capacity(3);
    let (a, b, c, d) = (record(1), record(2), record(3), record(4));

    for r in [&a, &b, &c, &d] {
        assert!(store.admit(r.clone()));
    }
    assert_eq!(ids(&store.snapshot()), vec![b.id(), c.id(), d.id()]);

    assert!(store.remove(b.id()));
    assert_eq!(ids(&store.snapshot()), vec![c.id(), d.id()]);
    assert_eq!(store.count(), 2);

    store.reset();
    assert!(store.snapshot().is_empty());
    assert_eq!(store.count(), 0);
}

#[test]
fn test_request_response_lifecycle() {
    let store = TransactionStore::new();

    let request = RequestMetadata::new("post", "https://api.example.com/login")
        .with_header("Content-Type", "application/json")
        .with_body(&b"{\"user\":\"alice\"}"[..]);
    let record = TransactionRecord::new(request);
    let id = record.id();

    assert!(store.admit(record));
    assert_eq!(store.pending_count(), 1);

    let stored = store.get(id).unwrap();
    assert_eq!(stored.request().method, "POST");
    assert_eq!(stored.state(), TransactionState::Pending);

    let response = ResponseMetadata::completed(401)
        .with_header("WWW-Authenticate", "Bearer")
        .with_body(&b"unauthorized"[..]);
    assert!(store.update(id, response));
    assert!(!store.update(id, ResponseMetadata::completed(200)));

    let stored = store.get(id).unwrap();
    assert_eq!(stored.state(), TransactionState::Completed);
    assert_eq!(stored.response().unwrap().status, Some(401));
    assert!(stored.duration().is_some());
    assert_eq!(store.pending_count(), 0);
}

#[test]
fn test_update_after_eviction_is_noop() {
    let store = TransactionStore::with_capacity(1);
    let a = record(1);

    store.admit(a.clone());
    store.admit(record(2));

    assert!(!store.update(a.id(), ResponseMetadata::completed(200)));
    assert!(!store.remove(a.id()));
}

#[test]
fn test_store_from_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    let config_toml = r#"
        capacity = 2
        ignored_urls = ["/metrics"]
    "#;
    file.write_all(config_toml.as_bytes()).unwrap();

    let config = StoreConfig::from_file(file.path()).unwrap();
    let store = TransactionStore::from_config(&config).unwrap();

    assert!(!store.admit(TransactionRecord::new(RequestMetadata::new(
        "GET",
        "https://api.example.com/metrics",
    ))));
    for n in 1..=3 {
        assert!(store.admit(record(n)));
    }

    assert_eq!(store.count(), 2);
    assert_eq!(ids(&store.snapshot()), vec![record(2).id(), record(3).id()]);

    let stats = store.stats();
    assert_eq!(stats.filtered, 1);
    assert_eq!(stats.admitted, 3);
    assert_eq!(stats.evicted, 1);
}

#[test]
fn test_registry_hands_out_shared_store() {
    let registry = StoreRegistry::new(StoreConfig::unbounded()).unwrap();

    let producer_view = registry.default_store().unwrap();
    let consumer_view = registry.get(DEFAULT_STORE).unwrap();
    assert!(Arc::ptr_eq(&producer_view, &consumer_view));

    producer_view.admit(record(1));
    assert_eq!(consumer_view.count(), 1);

    registry.reset_all();
    assert_eq!(consumer_view.count(), 0);
}

proptest! {
    #[test]
    fn prop_capacity_keeps_last_admitted(capacity in 1usize..16, admitted in 0u8..64) {
        let store = TransactionStore::with_capacity(capacity);
        let records: Vec<_> = (0..admitted).map(record).collect();

        for r in &records {
            prop_assert!(store.admit(r.clone()));
        }

        let keep = records.len().saturating_sub(capacity);
        prop_assert_eq!(store.count(), records.len().min(capacity));
        prop_assert_eq!(ids(&store.snapshot()), ids(&records[keep..]));
    }

    #[test]
    fn prop_duplicates_leave_store_unchanged(ns in proptest::collection::vec(0u8..32, 0..64)) {
        let store = TransactionStore::new();
        let mut expected: Vec<TransactionId> = Vec::new();

        for n in ns {
            let r = record(n);
            let fresh = !expected.contains(&r.id());
            prop_assert_eq!(store.admit(r.clone()), fresh);
            if fresh {
                expected.push(r.id());
            }
        }

        prop_assert_eq!(ids(&store.snapshot()), expected);
    }

    #[test]
    fn prop_remove_preserves_relative_order(
        admitted in 1u8..32,
        removals in proptest::collection::vec(0u8..32, 0..16),
    ) {
        let store = TransactionStore::new();
        let mut expected: Vec<TransactionId> = (0..admitted).map(|n| record(n).id()).collect();

        for n in 0..admitted {
            store.admit(record(n));
        }

        for n in removals {
            let id = record(n).id();
            let present = expected.contains(&id);
            prop_assert_eq!(store.remove(id), present);
            expected.retain(|e| *e != id);
        }

        prop_assert_eq!(ids(&store.snapshot()), expected);
    }
}
