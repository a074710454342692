//! Store configuration.

use freg_storage::DEFAULT_COPY_BUFFER_SIZE;
use std::path::PathBuf;

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the local instance.
    ///
    /// Required when the store is created. On an existing store it names
    /// the new instance minted after the directory moved to other hardware;
    /// when unset, the previous primary instance's name is reused.
    pub instance_name: Option<String>,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync each journal entry before applying it.
    pub sync_journal: bool,

    /// Buffer size for streamed blob copies.
    pub copy_buffer_size: usize,

    /// Directory that applied journal entries are moved to instead of
    /// being deleted. Meant for debugging and replay tests; nothing ever
    /// prunes it.
    pub journal_archive: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance_name: None,
            create_if_missing: true,
            sync_journal: true,
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
            journal_archive: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the instance name.
    #[must_use]
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync journal entries.
    #[must_use]
    pub const fn sync_journal(mut self, value: bool) -> Self {
        self.sync_journal = value;
        self
    }

    /// Sets the blob copy buffer size.
    #[must_use]
    pub const fn copy_buffer_size(mut self, size: usize) -> Self {
        self.copy_buffer_size = size;
        self
    }

    /// Keeps applied journal entries in `dir`.
    #[must_use]
    pub fn journal_archive(mut self, dir: impl Into<PathBuf>) -> Self {
        self.journal_archive = Some(dir.into());
        self
    }
}
