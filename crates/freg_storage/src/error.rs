//! Error types for blob operations.

use std::io;
use thiserror::Error;

/// Result type for blob operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during blob operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested blob does not exist.
    #[error("blob {id} not found")]
    BlobNotFound {
        /// The missing blob id.
        id: u64,
    },

    /// A write ends past the addressable size of an in-memory blob.
    #[error("write at offset {offset} of {len} bytes is out of range for blob {id}")]
    OutOfRange {
        /// The blob id.
        id: u64,
        /// Offset of the write.
        offset: u64,
        /// Length of the write.
        len: usize,
    },
}

impl StorageError {
    /// Maps `NotFound` I/O errors to [`StorageError::BlobNotFound`].
    pub(crate) fn from_io(id: u64, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::BlobNotFound { id }
        } else {
            Self::Io(err)
        }
    }
}
