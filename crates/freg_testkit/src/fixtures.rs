//! Test fixtures and store helpers.
//!
//! Provides temporary stores and shorthands for announcing and defining
//! changes.

use freg_core::{
    ByteWrite, Change, ChangeGraphStore, Config, Definition, GlobalChangeId, NodeId, NodeMeta,
    StorageChanges,
};
use freg_storage::BlobStore;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Instance name used by test stores.
pub const TEST_INSTANCE: &str = "testkit";

/// A store in a temporary directory that is removed on drop.
pub struct TestStore {
    /// The store.
    pub store: ChangeGraphStore,
    root: PathBuf,
    config: Config,
    _temp_dir: TempDir,
}

impl TestStore {
    /// Creates a store backed by files.
    pub fn new() -> Self {
        Self::with_config(|_| test_config())
    }

    /// Creates a store whose applied journal entries are moved to
    /// [`TestStore::archive_dir`] instead of being deleted.
    pub fn archiving() -> Self {
        Self::with_config(|temp| test_config().journal_archive(temp.join("archive")))
    }

    /// Creates a store with a configuration built from the temp directory.
    /// The same configuration is used again by [`TestStore::reopen`].
    pub fn with_config(config: impl FnOnce(&Path) -> Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("store");
        let config = config(temp_dir.path());
        let store =
            ChangeGraphStore::open(&root, config.clone()).expect("Failed to open test store");
        Self {
            store,
            root,
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Creates a store using the given blob store.
    pub fn with_blobs(blobs: Box<dyn BlobStore>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("store");
        let config = test_config();
        let store = ChangeGraphStore::open_with_blobs(&root, config.clone(), blobs)
            .expect("Failed to open test store");
        Self {
            store,
            root,
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the journal archive directory, if the store keeps one.
    pub fn archive_dir(&self) -> Option<&Path> {
        self.config.journal_archive.as_deref()
    }

    /// Closes the store and opens it again, replaying any journal entries.
    pub fn reopen(self) -> Self {
        let Self {
            store,
            root,
            config,
            _temp_dir,
        } = self;
        drop(store);
        let store =
            ChangeGraphStore::open(&root, config.clone()).expect("Failed to reopen store");
        Self {
            store,
            root,
            config,
            _temp_dir,
        }
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = ChangeGraphStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Configuration used by test stores: named, without fsync.
pub fn test_config() -> Config {
    Config::new().instance_name(TEST_INSTANCE).sync_journal(false)
}

/// Metadata of a writable root-level file.
pub fn file_meta(filename: &str) -> NodeMeta {
    NodeMeta {
        filename: filename.to_string(),
        dir: None,
        writable: true,
        executable: false,
    }
}

/// Metadata of an entry inside `dir`.
pub fn entry_meta(filename: &str, dir: NodeId) -> NodeMeta {
    NodeMeta {
        dir: Some(dir),
        ..file_meta(filename)
    }
}

/// Builds byte-range writes from `(offset, text)` pairs.
pub fn writes(parts: &[(u64, &str)]) -> StorageChanges {
    StorageChanges::Writes(
        parts
            .iter()
            .map(|(offset, text)| ByteWrite::new(*offset, text.as_bytes().to_vec()))
            .collect(),
    )
}

/// Reserves a node and announces its first change.
pub fn new_root_change(store: &ChangeGraphStore) -> GlobalChangeId {
    let id = GlobalChangeId::new(
        store.reserve_node().expect("Failed to reserve node"),
        store.reserve_change().expect("Failed to reserve change"),
    );
    store
        .add_change(Change { id, parent: None })
        .expect("Failed to add change");
    id
}

/// Announces a change on top of `parent`.
pub fn new_child_change(store: &ChangeGraphStore, parent: GlobalChangeId) -> GlobalChangeId {
    let id = parent.sibling(store.reserve_change().expect("Failed to reserve change"));
    store
        .add_change(Change {
            id,
            parent: Some(parent.change),
        })
        .expect("Failed to add change");
    id
}

/// Defines `id` as a head with the given edits.
pub fn define_file(
    store: &ChangeGraphStore,
    id: GlobalChangeId,
    filename: &str,
    changes: StorageChanges,
) {
    define_entry(store, id, file_meta(filename), changes);
}

/// Defines `id` as a head with explicit metadata.
pub fn define_entry(
    store: &ChangeGraphStore,
    id: GlobalChangeId,
    meta: NodeMeta,
    changes: StorageChanges,
) {
    store
        .define_change(id, Definition::DefineHead { changes, meta })
        .expect("Failed to define change");
}

/// Reads the content of a head, or `None` if it has no storage.
pub fn head_content(store: &ChangeGraphStore, id: GlobalChangeId) -> Option<Vec<u8>> {
    let head = store
        .get_head(id)
        .expect("Failed to read head")
        .expect("Head should exist");
    head.storage
        .map(|storage| store.read_blob(storage).expect("Failed to read blob"))
}
