//! Error types for freg core.

use crate::types::StorageId;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Broad classes of failure, used to decide how a caller reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid input at the API boundary; nothing was changed.
    User,
    /// I/O or metadata store failure; a journaled operation stays pending.
    System,
    /// A violated internal invariant.
    Assertion,
    /// A frame that could not be encoded or decoded.
    Protocol,
}

/// Errors that can occur in freg core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Blob store error.
    #[error("storage error: {0}")]
    Storage(#[from] freg_storage::StorageError),

    /// Wire framing error.
    #[error("wire error: {0}")]
    Wire(#[from] freg_wire::WireError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Metadata store error.
    #[error("metadata error: {0}")]
    Metadata(#[from] rusqlite::Error),

    /// A new store was opened without an instance name.
    #[error("an instance name is required to create a store at {}", path.display())]
    MissingInstanceName {
        /// Root of the store.
        path: PathBuf,
    },

    /// The store root does not exist and creation was not allowed.
    #[error("no store at {}", path.display())]
    StoreNotFound {
        /// Root of the store.
        path: PathBuf,
    },

    /// Another handle holds the store's lock.
    #[error("store locked: another handle has exclusive access")]
    StoreLocked,

    /// The on-disk layout or schema is not understood.
    #[error("invalid store format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// The requested storage record does not exist.
    #[error("storage {0} not found")]
    StorageNotFound(StorageId),

    /// An internal invariant does not hold.
    #[error("invariant violated: {message}")]
    Invariant {
        /// Description of the violation.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invariant error. Panics in debug builds.
    pub fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        if cfg!(debug_assertions) {
            panic!("invariant violated: {message}");
        }
        Self::Invariant { message }
    }

    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingInstanceName { .. }
            | Self::StoreNotFound { .. }
            | Self::StoreLocked
            | Self::StorageNotFound(_) => ErrorKind::User,
            Self::Storage(_) | Self::Io(_) | Self::Metadata(_) | Self::InvalidFormat { .. } => {
                ErrorKind::System
            }
            Self::Wire(_) => ErrorKind::Protocol,
            Self::Invariant { .. } => ErrorKind::Assertion,
        }
    }
}
