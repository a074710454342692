//! End-to-end editing scenarios against a file-backed store.

use freg_core::{CoreError, Definition, StorageChanges, StoreEvent};
use freg_testkit::prelude::*;
use std::io::Read;
use std::time::Duration;

fn blob_count(store: &TestStore) -> usize {
    StoreSnapshot::capture(store).unwrap().blobs.len()
}

fn assert_clean(store: &TestStore) {
    let report = store.validate().unwrap();
    assert!(report.is_clean(), "problems: {:?}", report.problems);
}

#[test]
fn typo_fix_rewrites_in_place() {
    let store = TestStore::new();
    let first = new_root_change(&store);
    define_file(&store, first, "greeting", writes(&[(0, "hellog")]));

    let second = new_child_change(&store, first);
    define_file(&store, second, "greeting", writes(&[(5, "o")]));

    assert_eq!(head_content(&store, second).unwrap(), b"helloo");
    assert_eq!(store.get_head(first).unwrap(), None);
    // The superseded head released its reference, so the blob was reused.
    assert_eq!(
        store.get_head(second).unwrap().unwrap().storage,
        store.list_storage(0, 10).unwrap().first().map(|record| record.id)
    );
    assert_eq!(blob_count(&store), 1);
    assert_clean(&store);
}

#[test]
fn truncate_then_write_reuses_storage() {
    let store = TestStore::new();
    let first = new_root_change(&store);
    define_file(&store, first, "log", writes(&[(0, "a long first draft")]));
    let storage = store.get_head(first).unwrap().unwrap().storage;

    let second = new_child_change(&store, first);
    define_file(&store, second, "log", StorageChanges::Truncate);
    assert_eq!(head_content(&store, second).unwrap(), b"");

    let third = new_child_change(&store, second);
    define_file(&store, third, "log", writes(&[(0, "short")]));

    assert_eq!(head_content(&store, third).unwrap(), b"short");
    assert_eq!(store.get_head(third).unwrap().unwrap().storage, storage);
    assert_eq!(blob_count(&store), 1);
    assert_clean(&store);
}

#[test]
fn overlapping_writes_apply_in_order() {
    let store = TestStore::new();
    let first = new_root_change(&store);
    define_file(&store, first, "snack", writes(&[(0, "whipeanut")]));

    let second = new_child_change(&store, first);
    define_file(
        &store,
        second,
        "snack",
        writes(&[(5, "wizard"), (3, "peanut diva")]),
    );

    assert_eq!(head_content(&store, second).unwrap(), b"whipeanut diva");
    assert_clean(&store);
}

#[test]
fn fan_out_copies_for_the_first_sibling_only() {
    let store = TestStore::new();
    let root = new_root_change(&store);
    define_file(&store, root, "shared", writes(&[(0, "base")]));
    let original = store.get_head(root).unwrap().unwrap().storage.unwrap();

    let left = new_child_change(&store, root);
    let right = new_child_change(&store, root);
    assert_eq!(store.get_storage(original).unwrap().unwrap().references, 3);

    define_file(&store, left, "shared", writes(&[(0, "L")]));
    assert_eq!(head_content(&store, left).unwrap(), b"Lase");
    assert_ne!(store.get_head(left).unwrap().unwrap().storage, Some(original));
    assert_eq!(store.get_storage(original).unwrap().unwrap().references, 1);

    define_file(&store, right, "shared", writes(&[(0, "R")]));
    assert_eq!(head_content(&store, right).unwrap(), b"Rase");
    assert_eq!(store.get_head(right).unwrap().unwrap().storage, Some(original));

    // Both siblings stay as heads of the forked node.
    let snapshot = StoreSnapshot::capture(&store).unwrap();
    assert_eq!(snapshot.heads_of(root.node).len(), 2);
    assert_eq!(snapshot.blobs.len(), 2);
    assert_clean(&store);
}

#[test]
fn deleted_node_releases_its_blob() {
    let store = TestStore::new();
    let first = new_root_change(&store);
    define_file(&store, first, "doomed", writes(&[(0, "bye")]));
    let storage = store.get_head(first).unwrap().unwrap().storage.unwrap();

    let second = new_child_change(&store, first);
    store.define_change(second, Definition::DeleteHead).unwrap();

    assert!(store.list_heads(0, 10).unwrap().is_empty());
    assert!(matches!(
        store.open_blob(storage),
        Err(CoreError::StorageNotFound(id)) if id == storage
    ));
    assert_eq!(blob_count(&store), 0);
    assert!(!store.root().join("storage").join(storage.as_u64().to_string()).exists());
    assert_clean(&store);
}

#[test]
fn directories_list_their_entries() {
    let store = TestStore::new();
    let dir = new_root_change(&store);
    define_file(&store, dir, "docs", StorageChanges::Writes(Vec::new()));
    assert_eq!(head_content(&store, dir), None);

    let mut names = Vec::new();
    for name in ["b.txt", "a.txt", "c.txt"] {
        let id = new_root_change(&store);
        define_entry(&store, id, entry_meta(name, dir.node), writes(&[(0, name)]));
        names.push(name);
    }
    let outside = new_root_change(&store);
    define_file(&store, outside, "top.txt", writes(&[(0, "top")]));

    let inside: Vec<String> = store
        .list_dir_heads(Some(dir.node), 0, 10)
        .unwrap()
        .into_iter()
        .map(|head| head.meta.filename)
        .collect();
    assert_eq!(inside.len(), 3);
    for name in names {
        assert!(inside.iter().any(|entry| entry == name));
    }

    let top: Vec<String> = store
        .list_dir_heads(None, 0, 10)
        .unwrap()
        .into_iter()
        .map(|head| head.meta.filename)
        .collect();
    assert_eq!(top.len(), 2);
    assert!(top.contains(&"docs".to_string()));
    assert!(top.contains(&"top.txt".to_string()));
    assert_clean(&store);
}

#[test]
fn blobs_stream_through_readers() {
    let store = TestStore::new();
    let id = new_root_change(&store);
    let body = "x".repeat(20_000);
    define_file(&store, id, "big", writes(&[(0, body.as_str())]));

    let storage = store.get_head(id).unwrap().unwrap().storage.unwrap();
    let mut reader = store.open_blob(storage).unwrap();
    let mut read = Vec::new();
    reader.read_to_end(&mut read).unwrap();
    assert_eq!(read, body.as_bytes());
}

#[test]
fn subscribers_see_each_mutation() {
    let store = TestStore::new();
    let subscription = store.subscribe();
    let timeout = Duration::from_secs(1);

    let first = new_root_change(&store);
    define_file(&store, first, "watched", writes(&[(0, "v1")]));
    let second = new_child_change(&store, first);
    define_file(&store, second, "watched", writes(&[(0, "v2")]));

    let expected = [
        StoreEvent::ChangeAdded {
            id: first,
            parent: None,
        },
        StoreEvent::MissingAdded(first),
        StoreEvent::MissingRemoved(first),
        StoreEvent::HeadAdded(first),
        StoreEvent::ChangeAdded {
            id: second,
            parent: Some(first.change),
        },
        StoreEvent::MissingAdded(second),
        StoreEvent::MissingRemoved(second),
        StoreEvent::HeadRemoved(first),
        StoreEvent::HeadAdded(second),
    ];
    for event in expected {
        assert_eq!(subscription.receiver.recv_timeout(timeout).unwrap(), event);
    }
    assert!(subscription.receiver.try_recv().is_err());

    assert!(store.unsubscribe(subscription.id));
    let third = new_child_change(&store, second);
    store.define_change(third, Definition::DeleteHead).unwrap();
    assert!(subscription.receiver.try_recv().is_err());
}

#[test]
fn history_survives_reopen() {
    let store = TestStore::new();
    let first = new_root_change(&store);
    define_file(&store, first, "kept", writes(&[(0, "persisted")]));
    let pending = new_child_change(&store, first);
    let before = StoreSnapshot::capture(&store).unwrap();
    let instance = store.this_instance();

    let store = store.reopen();
    assert_eq!(StoreSnapshot::capture(&store).unwrap(), before);
    assert_eq!(store.this_instance(), instance);
    assert_eq!(store.replay_stats().files, 0);

    // The pending change can still be defined after reopening.
    define_file(&store, pending, "kept", writes(&[(0, "P")]));
    assert_eq!(head_content(&store, pending).unwrap(), b"Persisted");
    assert_clean(&store);
}
