//! In-memory blob store for testing.

use crate::backend::{BlobId, BlobReader, BlobStore};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::Cursor;

/// An in-memory blob store.
///
/// Suitable for unit tests and for driving the core without touching disk.
/// Readers get a snapshot of the blob taken when it was opened.
///
/// # Example
///
/// ```rust
/// use freg_storage::{BlobStore, InMemoryBlobStore};
///
/// let store = InMemoryBlobStore::new();
/// store.create(1).unwrap();
/// store.copy(1, 2).unwrap();
/// assert_eq!(store.list().unwrap(), vec![1, 2]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<BTreeMap<BlobId, Vec<u8>>>,
}

impl InMemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every blob, keyed by id.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<BlobId, Vec<u8>> {
        self.blobs.read().clone()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn create(&self, id: BlobId) -> StorageResult<()> {
        self.blobs.write().insert(id, Vec::new());
        Ok(())
    }

    fn copy(&self, from: BlobId, to: BlobId) -> StorageResult<()> {
        let mut blobs = self.blobs.write();
        let data = blobs
            .get(&from)
            .cloned()
            .ok_or(StorageError::BlobNotFound { id: from })?;
        blobs.insert(to, data);
        Ok(())
    }

    fn write_at(&self, id: BlobId, writes: &[(u64, &[u8])]) -> StorageResult<()> {
        let mut blobs = self.blobs.write();
        let blob = blobs.get_mut(&id).ok_or(StorageError::BlobNotFound { id })?;
        for (offset, data) in writes {
            if data.is_empty() {
                continue;
            }
            let out_of_range = || StorageError::OutOfRange {
                id,
                offset: *offset,
                len: data.len(),
            };
            let start = usize::try_from(*offset).map_err(|_| out_of_range())?;
            let end = start.checked_add(data.len()).ok_or_else(out_of_range)?;
            if blob.len() < end {
                blob.resize(end, 0);
            }
            blob[start..end].copy_from_slice(data);
        }
        Ok(())
    }

    fn open(&self, id: BlobId) -> StorageResult<BlobReader> {
        let data = self
            .blobs
            .read()
            .get(&id)
            .cloned()
            .ok_or(StorageError::BlobNotFound { id })?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn size(&self, id: BlobId) -> StorageResult<u64> {
        self.blobs
            .read()
            .get(&id)
            .map(|b| b.len() as u64)
            .ok_or(StorageError::BlobNotFound { id })
    }

    fn exists(&self, id: BlobId) -> StorageResult<bool> {
        Ok(self.blobs.read().contains_key(&id))
    }

    fn delete(&self, id: BlobId) -> StorageResult<()> {
        self.blobs.write().remove(&id);
        Ok(())
    }

    fn list(&self) -> StorageResult<Vec<BlobId>> {
        Ok(self.blobs.read().keys().copied().collect())
    }
}
