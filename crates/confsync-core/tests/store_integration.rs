//! Integration tests for the normalized store with configuration payloads.

use std::sync::Arc;
use std::thread;

use confsync_core::{ChangeSet, CollectionKey, NormalizedStore};
use confsync_proto::{
    ApplicationResult, ConfigurationPayload, Page, PageFilter, PatternResult,
};
use serde_json::json;

fn application_page(total_count: u64, ids: &[&str]) -> Page<ApplicationResult> {
    let rows: Vec<_> = ids
        .iter()
        .map(|id| json!({"id": id, "name": format!("app-{}", id), "visibility": "private"}))
        .collect();
    serde_json::from_value(json!({
        "page": 1,
        "page_size": 2,
        "total_count": total_count,
        "applications": rows,
    }))
    .unwrap()
}

#[test]
fn test_shrinking_application_page_matches_expected_descriptor() {
    let store = NormalizedStore::<ApplicationResult>::new();
    let key = CollectionKey::for_filter("applications", &PageFilter::new(1, 2));

    let first = store.apply(&key, &application_page(3, &["a", "b"]));
    assert_eq!(first.added, vec!["a", "b"]);

    let second = store.apply(&key, &application_page(2, &["a"]));
    assert_eq!(
        second,
        ChangeSet {
            added: vec![],
            updated: vec!["a".to_string()],
            removed: vec!["b".to_string()],
        }
    );
    assert_eq!(store.ids(&key), vec!["a"]);
}

#[test]
fn test_store_holds_exactly_latest_snapshot_ids() {
    let store = NormalizedStore::<ApplicationResult>::new();
    let key = CollectionKey::unscoped("applications");

    let snapshots: [&[&str]; 4] = [&["a", "b"], &["b", "c"], &[], &["d", "a"]];
    for ids in snapshots {
        store.apply(&key, &application_page(ids.len() as u64, ids));
        let mut cached = store.ids(&key);
        cached.sort();
        let mut expected: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(cached, expected);
    }
}

#[test]
fn test_unsupported_patterns_are_stored_as_data() {
    let payload = ConfigurationPayload::from_value(json!({
        "configuration": {
            "patterns": {
                "page": 1, "page_size": 10, "total_count": 2,
                "patterns": [
                    {"id": "p1", "name": "ok", "canSupport": true},
                    {"id": "p2", "name": "broken", "canSupport": false, "errmsg": "no adapter"}
                ]
            }
        }
    }))
    .unwrap();

    let store = NormalizedStore::<PatternResult>::new();
    let key = CollectionKey::unscoped("patterns");
    let page = payload.configuration.patterns.unwrap();
    let changes = store.apply(&key, &page);

    assert_eq!(changes.added, vec!["p1", "p2"]);
    let broken = store.get(&key, "p2").unwrap();
    assert!(!broken.is_supported());
    assert_eq!(broken.diagnostic(), Some("no adapter"));
}

#[test]
fn test_concurrent_applies_on_distinct_keys() {
    let store = Arc::new(NormalizedStore::<ApplicationResult>::new());

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let store = store.clone();
            thread::spawn(move || {
                let key = CollectionKey::new("applications", n.to_string());
                for round in 0..50u64 {
                    let id = format!("{}-{}", n, round % 3);
                    store.apply(&key, &application_page(1, &[id.as_str()]));
                }
                key
            })
        })
        .collect();

    for handle in handles {
        let key = handle.join().unwrap();
        assert_eq!(store.len(&key), 1);
    }
    assert_eq!(store.stats().applies(), 8 * 50);
    assert_eq!(store.keys().len(), 8);
}
