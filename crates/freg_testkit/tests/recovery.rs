//! Journal replay and crash recovery.

use freg_core::journal::{AddChange, JournalOp, NewHead, UpdateDeleteHead};
use freg_core::{
    Change, ChangeGraphStore, Config, CoreError, Definition, GlobalChangeId, StorageChanges,
    StoreEvent,
};
use freg_storage::FileBlobStore;
use freg_testkit::prelude::*;
use freg_wire::{MessageSet, WireError};
use std::path::Path;
use tempfile::TempDir;

/// Opens a store at `root` whose blobs live in `<root>/storage` behind a
/// fault injector, so a later plain open sees the same files.
fn open_faulty(root: &Path) -> (ChangeGraphStore, std::sync::Arc<FaultHandle>) {
    let files = FileBlobStore::open(&root.join("storage")).unwrap();
    let (blobs, faults) = FaultyBlobStore::new(Box::new(files));
    let store = ChangeGraphStore::open_with_blobs(root, test_config(), Box::new(blobs)).unwrap();
    (store, faults)
}

fn assert_clean(store: &ChangeGraphStore) {
    let report = store.validate().unwrap();
    assert!(report.is_clean(), "problems: {:?}", report.problems);
}

#[test]
fn replaying_applied_operations_changes_nothing() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("store");
    let store = ChangeGraphStore::open(&root, test_config()).unwrap();
    let a = new_root_change(&store);
    define_file(&store, a, "a", writes(&[(0, "alpha")]));
    let b = new_root_change(&store);
    define_file(&store, b, "b", writes(&[(0, "beta"), (2, "TA")]));
    let child = new_child_change(&store, a);

    // Rebuild the last two operations exactly as they were journaled.
    let define_b = JournalOp::from(UpdateDeleteHead {
        storage: None,
        references: None,
        id: b,
        delete_parent: None,
        new_head: Some(NewHead {
            head: store.get_head(b).unwrap().unwrap(),
            changes: writes(&[(0, "beta"), (2, "TA")]),
        }),
    });
    let add_child = JournalOp::from(AddChange {
        change: Change {
            id: child,
            parent: Some(a.change),
        },
        head: Some(a.change),
        storage: store.get_head(a).unwrap().unwrap().storage,
        references: Some(2),
        delete_missing: false,
    });

    let before = StoreSnapshot::capture(&store).unwrap();
    drop(store);
    plant_journal_entry(&root, "0-00000000000000000001", &define_b);
    plant_journal_entry(&root, "0-00000000000000000002", &add_child);

    let store = ChangeGraphStore::open(&root, test_config()).unwrap();
    assert_eq!(store.replay_stats().files, 2);
    assert_eq!(store.replay_stats().operations, 2);
    assert_eq!(StoreSnapshot::capture(&store).unwrap(), before);
    assert_eq!(head_content(&store, b).unwrap(), b"beTA");
    assert_clean(&store);
    drop(store);
    assert!(pending_journal_files(&root).is_empty());
}

#[test]
fn journaled_but_unapplied_operation_is_replayed() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("store");
    let store = ChangeGraphStore::open(&root, test_config()).unwrap();
    let id = GlobalChangeId::new(store.reserve_node().unwrap(), store.reserve_change().unwrap());
    drop(store);

    plant_journal_entry(
        &root,
        "0-00000000000000000001",
        &JournalOp::from(AddChange {
            change: Change { id, parent: None },
            head: None,
            storage: None,
            references: None,
            delete_missing: false,
        }),
    );

    let store = ChangeGraphStore::open(&root, test_config()).unwrap();
    assert_eq!(store.replay_stats().operations, 1);
    assert!(store.get_missing(id).unwrap().is_some());

    // Replayed operations are ordinary state afterwards.
    define_file(&store, id, "late", writes(&[(0, "arrived")]));
    assert_eq!(head_content(&store, id).unwrap(), b"arrived");
    assert_clean(&store);
}

#[test]
fn crash_during_copy_on_write_recovers() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("store");
    let (store, faults) = open_faulty(&root);

    let base = new_root_change(&store);
    define_file(&store, base, "f", writes(&[(0, "original")]));
    let left = new_child_change(&store, base);
    let right = new_child_change(&store, base);

    // Fail the write after the copy succeeded.
    faults.fail_after(1);
    let result = store.define_change(
        left,
        Definition::DefineHead {
            changes: writes(&[(0, "O")]),
            meta: file_meta("f"),
        },
    );
    assert!(matches!(result, Err(CoreError::Storage(_))));
    assert_eq!(faults.faults(), 1);

    // The metadata transaction rolled back.
    assert!(store.get_missing(left).unwrap().is_some());
    assert!(store.get_head(base).unwrap().is_some());
    drop(store);
    assert_eq!(pending_journal_files(&root).len(), 1);

    let store = ChangeGraphStore::open(&root, test_config()).unwrap();
    assert_eq!(store.replay_stats().operations, 1);
    assert_eq!(head_content(&store, left).unwrap(), b"Original");
    assert!(store.get_missing(left).unwrap().is_none());
    assert!(store.get_head(base).unwrap().is_none());
    assert_clean(&store);

    // The other sibling still sees the original content.
    define_file(&store, right, "f", StorageChanges::Writes(Vec::new()));
    assert_eq!(head_content(&store, right).unwrap(), b"original");
    assert_clean(&store);
}

#[test]
fn failed_operation_is_completed_before_the_next_one() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("store");
    let (store, faults) = open_faulty(&root);
    let subscription = store.subscribe();

    let base = new_root_change(&store);
    define_file(&store, base, "f", writes(&[(0, "original")]));
    let left = new_child_change(&store, base);
    let right = new_child_change(&store, base);

    faults.fail_after(1);
    let result = store.define_change(
        left,
        Definition::DefineHead {
            changes: writes(&[(0, "O")]),
            meta: file_meta("f"),
        },
    );
    assert!(matches!(result, Err(CoreError::Storage(_))));
    assert_eq!(pending_journal_files(&root).len(), 1);
    while subscription.receiver.try_recv().is_ok() {}

    // The retry first finishes the journaled definition, which makes the
    // retried one a no-op.
    faults.heal();
    store
        .define_change(
            left,
            Definition::DefineHead {
                changes: writes(&[(0, "X")]),
                meta: file_meta("f"),
            },
        )
        .unwrap();
    assert!(pending_journal_files(&root).is_empty());
    assert_eq!(head_content(&store, left).unwrap(), b"Original");
    assert!(store.get_head(base).unwrap().is_none());
    let settled: Vec<StoreEvent> = subscription.receiver.try_iter().collect();
    assert!(settled.contains(&StoreEvent::MissingRemoved(left)));
    assert!(settled.contains(&StoreEvent::HeadAdded(left)));

    // Later operations are planned against the completed state.
    let next = new_child_change(&store, left);
    define_file(&store, next, "f", writes(&[(0, "X")]));
    define_file(&store, right, "f", StorageChanges::Writes(Vec::new()));
    assert_eq!(head_content(&store, next).unwrap(), b"Xriginal");
    assert_eq!(head_content(&store, right).unwrap(), b"original");
    assert_clean(&store);
    let before = StoreSnapshot::capture(&store).unwrap();
    drop(store);
    assert!(pending_journal_files(&root).is_empty());

    let store = ChangeGraphStore::open(&root, test_config()).unwrap();
    assert_eq!(store.replay_stats().files, 0);
    assert_eq!(StoreSnapshot::capture(&store).unwrap(), before);
    assert_eq!(head_content(&store, next).unwrap(), b"Xriginal");
    assert_eq!(head_content(&store, right).unwrap(), b"original");
    assert_clean(&store);
}

#[test]
fn mutations_fail_until_the_failed_operation_completes() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("store");
    let (store, faults) = open_faulty(&root);

    let base = new_root_change(&store);
    define_file(&store, base, "f", writes(&[(0, "original")]));
    let left = new_child_change(&store, base);
    let _right = new_child_change(&store, base);

    let other = GlobalChangeId::new(store.reserve_node().unwrap(), store.reserve_change().unwrap());

    // The shared blob must be copied before it is written.
    faults.fail_after(0);
    let result = store.define_change(
        left,
        Definition::DefineHead {
            changes: writes(&[(0, "O")]),
            meta: file_meta("f"),
        },
    );
    assert!(result.is_err());
    let before = StoreSnapshot::capture(&store).unwrap();

    // Completing the entry hits the same fault, so nothing new is planned.
    let result = store.add_change(Change {
        id: other,
        parent: None,
    });
    assert!(matches!(result, Err(CoreError::Storage(_))));
    assert!(store.get_change(other).unwrap().is_none());
    assert_eq!(StoreSnapshot::capture(&store).unwrap(), before);
    assert_eq!(pending_journal_files(&root).len(), 1);
    assert!(faults.faults() >= 2);

    faults.heal();
    store
        .add_change(Change {
            id: other,
            parent: None,
        })
        .unwrap();
    assert!(store.get_change(other).unwrap().is_some());
    assert!(store.get_missing(left).unwrap().is_none());
    assert_eq!(head_content(&store, left).unwrap(), b"Original");
    assert!(pending_journal_files(&root).is_empty());
    assert_clean(&store);
}

#[test]
fn crash_while_releasing_storage_recovers() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("store");
    let (store, faults) = open_faulty(&root);

    let first = new_root_change(&store);
    define_file(&store, first, "gone", writes(&[(0, "soon")]));
    let storage = store.get_head(first).unwrap().unwrap().storage.unwrap();
    let second = new_child_change(&store, first);

    faults.fail_after(0);
    assert!(store.define_change(second, Definition::DeleteHead).is_err());
    assert!(store.get_storage(storage).unwrap().is_some());
    drop(store);

    let store = ChangeGraphStore::open(&root, test_config()).unwrap();
    assert!(store.get_storage(storage).unwrap().is_none());
    assert!(store.list_heads(0, 10).unwrap().is_empty());
    assert!(store.list_missing(0, 10).unwrap().is_empty());
    assert_clean(&store);
}

#[test]
fn truncated_journal_entry_is_discarded() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("store");
    let store = ChangeGraphStore::open(&root, test_config()).unwrap();
    let id = GlobalChangeId::new(store.reserve_node().unwrap(), store.reserve_change().unwrap());
    drop(store);

    let frame = JournalOp::from(AddChange {
        change: Change { id, parent: None },
        head: None,
        storage: None,
        references: None,
        delete_missing: false,
    })
    .encode_message()
    .unwrap();
    plant_raw_journal_entry(&root, "0-00000000000000000001", &frame[..frame.len() - 3]);
    plant_raw_journal_entry(&root, "0-00000000000000000002", b"not a journal frame at all");

    let store = ChangeGraphStore::open(&root, test_config()).unwrap();
    let stats = store.replay_stats();
    assert_eq!(stats.files, 2);
    assert_eq!(stats.operations, 0);
    assert_eq!(stats.discarded, 2);
    assert!(store.get_change(id).unwrap().is_none());
    drop(store);
    assert!(pending_journal_files(&root).is_empty());
}

#[test]
fn oversized_operation_is_rejected_before_journaling() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("store");
    let store = ChangeGraphStore::open(&root, test_config()).unwrap();
    let id = new_root_change(&store);

    let chunk = "z".repeat(30_000);
    let result = store.define_change(
        id,
        Definition::DefineHead {
            changes: writes(&[(0, chunk.as_str()), (30_000, chunk.as_str()), (60_000, chunk.as_str())]),
            meta: file_meta("huge"),
        },
    );
    assert!(matches!(
        result,
        Err(CoreError::Wire(WireError::PayloadTooLarge { .. }))
    ));
    assert!(store.get_missing(id).unwrap().is_some());
    assert!(store.list_storage(0, 10).unwrap().is_empty());
    drop(store);
    assert!(pending_journal_files(&root).is_empty());
}

#[test]
fn open_errors() {
    let temp = TempDir::new().unwrap();

    let unnamed = ChangeGraphStore::open(&temp.path().join("unnamed"), Config::new());
    assert!(matches!(unnamed, Err(CoreError::MissingInstanceName { .. })));

    let absent = ChangeGraphStore::open(
        &temp.path().join("absent"),
        test_config().create_if_missing(false),
    );
    assert!(matches!(absent, Err(CoreError::StoreNotFound { .. })));

    let root = temp.path().join("store");
    let _held = ChangeGraphStore::open(&root, test_config()).unwrap();
    let second = ChangeGraphStore::open(&root, test_config());
    assert!(matches!(second, Err(CoreError::StoreLocked)));
}

#[test]
fn existing_store_opens_without_a_name() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("store");
    let instance = ChangeGraphStore::open(&root, test_config())
        .unwrap()
        .this_instance();

    let store = ChangeGraphStore::open(&root, Config::new().create_if_missing(false)).unwrap();
    assert_eq!(store.this_instance(), instance);
    assert_eq!(store.list_instances().unwrap().len(), 1);
}
