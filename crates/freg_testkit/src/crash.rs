//! Crash recovery testing for freg.
//!
//! A crash is simulated by making a blob operation fail in the middle of an
//! apply. The journal entry for that operation stays on disk, and the next
//! mutation or a reopen replays it on top of whatever the failed apply left
//! behind.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (blobs, faults) = FaultyBlobStore::new(Box::new(file_blobs));
//! let store = TestStore::with_blobs(Box::new(blobs));
//! faults.fail_after(1);
//! assert!(store.define_change(id, definition).is_err());
//! let store = store.reopen();
//! ```

use freg_core::journal::JournalOp;
use freg_storage::{BlobId, BlobReader, BlobStore, StorageError, StorageResult};
use freg_wire::{FrameBuffer, FrameReader, MessageSet, WireError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared switchboard of a [`FaultyBlobStore`].
#[derive(Debug)]
pub struct FaultHandle {
    remaining: AtomicUsize,
    faults: AtomicUsize,
}

impl FaultHandle {
    /// Lets `ops` more mutating operations succeed, then fails every one
    /// after them.
    pub fn fail_after(&self, ops: usize) {
        self.remaining.store(ops, Ordering::SeqCst);
    }

    /// Stops injecting faults.
    pub fn heal(&self) {
        self.remaining.store(usize::MAX, Ordering::SeqCst);
    }

    /// Returns how many operations were failed so far.
    pub fn faults(&self) -> usize {
        self.faults.load(Ordering::SeqCst)
    }

    fn check(&self, op: &str) -> StorageResult<()> {
        let admitted = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                usize::MAX => Some(n),
                0 => None,
                n => Some(n - 1),
            })
            .is_ok();
        if admitted {
            Ok(())
        } else {
            self.faults.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("simulated crash during {op}"),
            )))
        }
    }
}

/// A blob store wrapper whose mutating operations can be made to fail.
///
/// Reads always pass through.
pub struct FaultyBlobStore {
    inner: Box<dyn BlobStore>,
    handle: Arc<FaultHandle>,
}

impl FaultyBlobStore {
    /// Wraps `inner`; faults are off until the handle arms them.
    pub fn new(inner: Box<dyn BlobStore>) -> (Self, Arc<FaultHandle>) {
        let handle = Arc::new(FaultHandle {
            remaining: AtomicUsize::new(usize::MAX),
            faults: AtomicUsize::new(0),
        });
        (
            Self {
                inner,
                handle: Arc::clone(&handle),
            },
            handle,
        )
    }
}

impl BlobStore for FaultyBlobStore {
    fn create(&self, id: BlobId) -> StorageResult<()> {
        self.handle.check("create")?;
        self.inner.create(id)
    }

    fn copy(&self, from: BlobId, to: BlobId) -> StorageResult<()> {
        self.handle.check("copy")?;
        self.inner.copy(from, to)
    }

    fn write_at(&self, id: BlobId, writes: &[(u64, &[u8])]) -> StorageResult<()> {
        self.handle.check("write")?;
        self.inner.write_at(id, writes)
    }

    fn open(&self, id: BlobId) -> StorageResult<BlobReader> {
        self.inner.open(id)
    }

    fn size(&self, id: BlobId) -> StorageResult<u64> {
        self.inner.size(id)
    }

    fn exists(&self, id: BlobId) -> StorageResult<bool> {
        self.inner.exists(id)
    }

    fn delete(&self, id: BlobId) -> StorageResult<()> {
        self.handle.check("delete")?;
        self.inner.delete(id)
    }

    fn list(&self) -> StorageResult<Vec<BlobId>> {
        self.inner.list()
    }
}

/// Returns the journal directory of a store root.
pub fn journal_dir(root: &Path) -> PathBuf {
    root.join("coretransactions")
}

/// Lists the journal files of a closed store.
pub fn pending_journal_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(journal_dir(root))
        .expect("Failed to read journal directory")
        .map(|entry| entry.expect("Failed to read journal entry").path())
        .collect();
    files.sort();
    files
}

/// Writes `op` into the journal of a closed store, as if a crash had
/// happened after applying it but before its entry was removed.
pub fn plant_journal_entry(root: &Path, name: &str, op: &JournalOp) {
    let frame = op.encode_message().expect("Failed to encode journal entry");
    fs::write(journal_dir(root).join(name), frame).expect("Failed to write journal entry");
}

/// Writes raw bytes into the journal of a closed store.
pub fn plant_raw_journal_entry(root: &Path, name: &str, bytes: &[u8]) {
    fs::write(journal_dir(root).join(name), bytes).expect("Failed to write journal entry");
}

/// Lists the files of a journal archive directory in name order.
pub fn archived_journal_files(archive: &Path) -> Vec<PathBuf> {
    if !archive.exists() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = fs::read_dir(archive)
        .expect("Failed to read archive directory")
        .map(|entry| entry.expect("Failed to read archive entry").path())
        .collect();
    files.sort();
    files
}

/// Decodes every operation of one journal file.
pub fn read_journal_ops(path: &Path) -> Vec<JournalOp> {
    let bytes = fs::read(path).expect("Failed to read journal file");
    let mut buffer = FrameBuffer::new();
    buffer.extend(&bytes);
    let mut ops = Vec::new();
    FrameReader::<JournalOp>::new()
        .read(&mut buffer, |op| {
            ops.push(op);
            Ok::<(), WireError>(())
        })
        .expect("Failed to decode journal file");
    assert!(buffer.is_empty(), "journal file ends in a partial entry");
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use freg_storage::InMemoryBlobStore;

    #[test]
    fn faults_start_disarmed() {
        let (store, handle) = FaultyBlobStore::new(Box::new(InMemoryBlobStore::new()));
        store.create(1).unwrap();
        store.delete(1).unwrap();
        assert_eq!(handle.faults(), 0);
    }

    #[test]
    fn journal_files_decode_back_to_operations() {
        use freg_core::journal::AddChange;
        use freg_core::{Change, ChangeId, GlobalChangeId, InstanceId, NodeId};

        let dir = tempfile::tempdir().unwrap();
        let id = GlobalChangeId::new(NodeId::new(InstanceId(1), 1), ChangeId::new(InstanceId(1), 2));
        let op = JournalOp::from(AddChange {
            change: Change { id, parent: None },
            head: None,
            storage: None,
            references: None,
            delete_missing: false,
        });
        let mut bytes = op.encode_message().unwrap();
        bytes.extend(op.encode_message().unwrap());
        fs::write(dir.path().join("0-1"), bytes).unwrap();

        assert_eq!(archived_journal_files(dir.path()).len(), 1);
        assert_eq!(read_journal_ops(&dir.path().join("0-1")), vec![op.clone(), op]);
        assert!(archived_journal_files(&dir.path().join("absent")).is_empty());
    }

    #[test]
    fn fail_after_counts_mutations_only() {
        let (store, handle) = FaultyBlobStore::new(Box::new(InMemoryBlobStore::new()));
        handle.fail_after(1);

        store.create(1).unwrap();
        assert!(store.exists(1).unwrap());
        assert!(store.write_at(1, &[(0, b"x".as_slice())]).is_err());
        assert!(store.copy(1, 2).is_err());
        assert_eq!(handle.faults(), 2);

        handle.heal();
        store.write_at(1, &[(0, b"x".as_slice())]).unwrap();
        assert_eq!(store.read_all(1).unwrap(), b"x");
    }
}
