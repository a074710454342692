//! # freg storage
//!
//! Blob storage for freg.
//!
//! Every live storage record owns one blob: an opaque, byte-addressable
//! file named by its decimal storage id. Blob stores do not know about
//! reference counts, heads or the journal; the core decides which blob to
//! create, copy, patch or delete and the store just does it.
//!
//! ## Available Stores
//!
//! - [`FileBlobStore`] - one file per blob under a directory
//! - [`InMemoryBlobStore`] - for tests
//!
//! ## Example
//!
//! ```rust
//! use freg_storage::{BlobStore, InMemoryBlobStore};
//!
//! let store = InMemoryBlobStore::new();
//! store.create(1).unwrap();
//! store.write_at(1, &[(0, b"hello".as_slice())]).unwrap();
//! assert_eq!(store.read_all(1).unwrap(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{BlobId, BlobReader, BlobStore};
pub use error::{StorageError, StorageResult};
pub use file::{FileBlobStore, DEFAULT_COPY_BUFFER_SIZE};
pub use memory::InMemoryBlobStore;
