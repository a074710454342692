//! File-based blob store.

use crate::backend::{BlobId, BlobReader, BlobStore};
use crate::error::{StorageError, StorageResult};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Buffer size used when streaming one blob into another.
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 8192;

/// A blob store keeping one file per blob.
///
/// Blob `42` lives at `<dir>/42`. Files are opened per call and closed
/// before the call returns.
///
/// # Durability
///
/// Writes are flushed to the OS but not fsynced; the transaction journal
/// replays any operation whose effects might not have reached disk.
///
/// # Example
///
/// ```no_run
/// use freg_storage::{BlobStore, FileBlobStore};
/// use std::path::Path;
///
/// let store = FileBlobStore::open(Path::new("storage")).unwrap();
/// store.create(1).unwrap();
/// store.write_at(1, &[(0, b"hello".as_slice())]).unwrap();
/// ```
#[derive(Debug)]
pub struct FileBlobStore {
    dir: PathBuf,
    copy_buffer_size: usize,
}

impl FileBlobStore {
    /// Opens a blob directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        Self::with_copy_buffer(dir, DEFAULT_COPY_BUFFER_SIZE)
    }

    /// Opens a blob directory using a specific copy buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_copy_buffer(dir: &Path, copy_buffer_size: usize) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            copy_buffer_size: copy_buffer_size.max(1),
        })
    }

    /// Returns the blob directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of a blob.
    #[must_use]
    pub fn blob_path(&self, id: BlobId) -> PathBuf {
        self.dir.join(id.to_string())
    }

    fn open_existing(&self, id: BlobId, write: bool) -> StorageResult<File> {
        OpenOptions::new()
            .read(true)
            .write(write)
            .open(self.blob_path(id))
            .map_err(|e| StorageError::from_io(id, e))
    }
}

impl BlobStore for FileBlobStore {
    fn create(&self, id: BlobId) -> StorageResult<()> {
        let file = File::create(self.blob_path(id))?;
        drop(file);
        Ok(())
    }

    fn copy(&self, from: BlobId, to: BlobId) -> StorageResult<()> {
        let mut source = self.open_existing(from, false)?;
        let mut target = File::create(self.blob_path(to))?;

        let mut buffer = vec![0u8; self.copy_buffer_size];
        loop {
            let read = match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            target.write_all(&buffer[..read])?;
        }
        target.flush()?;
        tracing::trace!(from, to, "copied blob");
        Ok(())
    }

    fn write_at(&self, id: BlobId, writes: &[(u64, &[u8])]) -> StorageResult<()> {
        let mut file = self.open_existing(id, true)?;
        for (offset, data) in writes {
            file.seek(SeekFrom::Start(*offset))?;
            file.write_all(data)?;
        }
        file.flush()?;
        Ok(())
    }

    fn open(&self, id: BlobId) -> StorageResult<BlobReader> {
        let file = self.open_existing(id, false)?;
        Ok(Box::new(file))
    }

    fn size(&self, id: BlobId) -> StorageResult<u64> {
        let metadata = fs::metadata(self.blob_path(id)).map_err(|e| StorageError::from_io(id, e))?;
        Ok(metadata.len())
    }

    fn exists(&self, id: BlobId) -> StorageResult<bool> {
        Ok(self.blob_path(id).is_file())
    }

    fn delete(&self, id: BlobId) -> StorageResult<()> {
        match fs::remove_file(self.blob_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::trace!(id, "blob already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> StorageResult<Vec<BlobId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            match name.to_str().and_then(|name| name.parse::<BlobId>().ok()) {
                Some(id) => ids.push(id),
                None => tracing::warn!(
                    dir = %self.dir.display(),
                    name = %name.to_string_lossy(),
                    "ignoring foreign file in blob directory"
                ),
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}
