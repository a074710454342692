//! Store directory management.
//!
//! ```text
//! <root>/
//! ├─ LOCK               # advisory lock for single-writer access
//! ├─ coredb             # metadata store
//! ├─ storage/           # one file per live blob, named by storage id
//! └─ coretransactions/  # journal entries pending apply
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const METADATA_FILE: &str = "coredb";
const STORAGE_DIR: &str = "storage";
const JOURNAL_DIR: &str = "coretransactions";

/// The store's root directory, held under an exclusive lock.
///
/// Only one `StoreDir` can exist per root at a time, across processes.
#[derive(Debug)]
pub struct StoreDir {
    root: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Returns true if `root` holds a store.
    #[must_use]
    pub fn exists(root: &Path) -> bool {
        root.join(METADATA_FILE).is_file()
    }

    /// Opens or creates a store directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the root doesn't exist and `create_if_missing` is false
    /// - another handle holds the lock (`StoreLocked`)
    /// - I/O errors occur
    pub fn open(root: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !root.exists() {
            if create_if_missing {
                fs::create_dir_all(root)?;
            } else {
                return Err(CoreError::StoreNotFound {
                    path: root.to_path_buf(),
                });
            }
        }

        if !root.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "store root is not a directory: {}",
                root.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked);
        }

        fs::create_dir_all(root.join(STORAGE_DIR))?;
        fs::create_dir_all(root.join(JOURNAL_DIR))?;

        Ok(Self {
            root: root.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path of the metadata store.
    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// Returns the blob directory.
    #[must_use]
    pub fn storage_dir(&self) -> PathBuf {
        self.root.join(STORAGE_DIR)
    }

    /// Returns the journal directory.
    #[must_use]
    pub fn journal_dir(&self) -> PathBuf {
        self.root.join(JOURNAL_DIR)
    }
}
