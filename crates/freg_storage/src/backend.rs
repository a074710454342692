//! Blob store trait definition.

use crate::error::StorageResult;
use std::io::Read;

/// Identifier of a blob. The core uses its storage ids directly.
pub type BlobId = u64;

/// A read-only handle to one blob. Dropping it releases the underlying file.
pub type BlobReader = Box<dyn Read + Send>;

/// A store of independent, byte-addressable blobs.
///
/// # Invariants
///
/// - `create` leaves the blob present and empty, whatever it held before
/// - `copy` leaves `to` byte-identical to `from`
/// - each write in `write_at` stands alone: the blob is extended (zero
///   filled) as needed and bytes outside the written range are untouched
/// - `delete` of an absent blob succeeds, so replayed deletes are harmless
///
/// Every file opened by an implementation is closed before the call
/// returns, on success and error paths alike.
pub trait BlobStore: Send + Sync {
    /// Creates the blob, or truncates it to zero bytes if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be created.
    fn create(&self, id: BlobId) -> StorageResult<()>;

    /// Replaces `to` with a full copy of `from`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::BlobNotFound`] if `from` is absent.
    fn copy(&self, from: BlobId, to: BlobId) -> StorageResult<()>;

    /// Writes each `(offset, bytes)` pair into an existing blob.
    ///
    /// Writes may be non-contiguous and out of order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::BlobNotFound`] if the blob is absent.
    fn write_at(&self, id: BlobId, writes: &[(u64, &[u8])]) -> StorageResult<()>;

    /// Opens the blob for reading.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::BlobNotFound`] if the blob is absent.
    fn open(&self, id: BlobId) -> StorageResult<BlobReader>;

    /// Returns the blob's length in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::BlobNotFound`] if the blob is absent.
    fn size(&self, id: BlobId) -> StorageResult<u64>;

    /// Returns whether the blob exists.
    ///
    /// # Errors
    ///
    /// Returns an error if existence cannot be determined.
    fn exists(&self, id: BlobId) -> StorageResult<bool>;

    /// Deletes the blob. Deleting an absent blob is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob exists but cannot be removed.
    fn delete(&self, id: BlobId) -> StorageResult<()>;

    /// Lists all blob ids, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    fn list(&self) -> StorageResult<Vec<BlobId>>;

    /// Reads a whole blob into memory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::BlobNotFound`] if the blob is absent.
    fn read_all(&self, id: BlobId) -> StorageResult<Vec<u8>> {
        let mut reader = self.open(id)?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        Ok(out)
    }
}
