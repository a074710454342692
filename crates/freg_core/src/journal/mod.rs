//! Transaction journal for crash recovery.
//!
//! Every mutation of the change graph goes through [`Journal::act`]:
//!
//! 1. the operation is framed and written to a new file in
//!    `<root>/coretransactions/`
//! 2. the apply function runs
//! 3. the file is deleted, or moved to the archive directory if one is
//!    configured
//!
//! A crash before step 1 completes leaves no trace of the operation. A
//! crash anywhere later leaves the file behind, and [`Journal::replay`]
//! applies it again before the store accepts new calls. Apply functions
//! are idempotent, so running one twice is harmless.
//!
//! ## Recovery Policy
//!
//! - **Decode failures** (unknown message, malformed payload, truncated
//!   trailing frame): logged, the rest of the file is discarded and the
//!   file is deleted.
//! - **Apply failures**: replay stops with the error and the file stays
//!   for the next attempt.
//!
//! ## File Names
//!
//! `<session>-<sequence>`: a random id per opened journal and a
//! zero-padded counter, so concurrent callers never collide and a
//! session's files sort in the order they were written.

mod ops;

pub use ops::{AddChange, JournalOp, NewHead, UpdateDeleteHead};

use crate::error::{CoreError, CoreResult};
use freg_wire::{FrameBuffer, FrameReader, MessageSet};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Size of the chunks journal files are read in during replay.
const READ_CHUNK: usize = 8192;

/// Outcome of a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Journal files found.
    pub files: usize,
    /// Operations applied.
    pub operations: usize,
    /// Files whose content was partly or wholly discarded.
    pub discarded: usize,
}

/// The write-ahead journal directory.
#[derive(Debug)]
pub struct Journal {
    dir: PathBuf,
    session: String,
    sequence: AtomicU64,
    sync: bool,
    archive: Option<PathBuf>,
}

impl Journal {
    /// Opens a journal directory, creating it if needed.
    ///
    /// With `sync` set, each entry is fsynced before it is applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: &Path, sync: bool) -> CoreResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            session: Uuid::new_v4().simple().to_string(),
            sequence: AtomicU64::new(0),
            sync,
            archive: None,
        })
    }

    /// Moves applied entries into `dir` instead of deleting them.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_archive(mut self, dir: &Path) -> CoreResult<Self> {
        fs::create_dir_all(dir)?;
        self.archive = Some(dir.to_path_buf());
        Ok(self)
    }

    /// Returns the journal directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Journals `op`, applies it and removes the entry.
    ///
    /// # Errors
    ///
    /// Returns a wire error if `op` cannot be framed; nothing is written in
    /// that case. Returns an I/O error if the entry cannot be written, or
    /// the error of `apply`, in which case the entry stays on disk.
    pub fn act<T, F>(&self, op: &JournalOp, apply: F) -> CoreResult<T>
    where
        F: FnOnce(&JournalOp) -> CoreResult<T>,
    {
        let frame = op.encode_message()?;
        let path = self.next_path();

        debug!(path = %path.display(), bytes = frame.len(), "journaling operation");
        let mut file = File::create(&path)?;
        file.write_all(&frame)?;
        if self.sync {
            file.sync_all()?;
        }
        drop(file);

        let value = apply(op)?;

        self.retire(&path)?;
        debug!(path = %path.display(), "operation applied");
        Ok(value)
    }

    /// Lists pending journal files in replay order.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn pending(&self) -> CoreResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Applies every pending operation again and deletes the files.
    ///
    /// # Errors
    ///
    /// Returns the first error of `apply`, or an I/O error. The file being
    /// replayed stays on disk.
    pub fn replay<F>(&self, mut apply: F) -> CoreResult<ReplayStats>
    where
        F: FnMut(JournalOp) -> CoreResult<()>,
    {
        let mut stats = ReplayStats::default();
        for path in self.pending()? {
            stats.files += 1;
            let (operations, intact) = replay_file(&path, &mut apply)?;
            stats.operations += operations;
            if !intact {
                stats.discarded += 1;
            }
            self.retire(&path)?;
        }

        if stats.files > 0 {
            info!(
                files = stats.files,
                operations = stats.operations,
                discarded = stats.discarded,
                "journal replayed"
            );
        }
        Ok(stats)
    }

    /// Removes a finished entry from the journal directory.
    fn retire(&self, path: &Path) -> CoreResult<()> {
        match (&self.archive, path.file_name()) {
            (Some(archive), Some(name)) => fs::rename(path, archive.join(name))?,
            _ => fs::remove_file(path)?,
        }
        Ok(())
    }

    fn next_path(&self) -> PathBuf {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!("{}-{sequence:020}", self.session))
    }
}

/// Replays one file. Returns the number of operations applied and whether
/// the whole file was understood.
fn replay_file<F>(path: &Path, apply: &mut F) -> CoreResult<(usize, bool)>
where
    F: FnMut(JournalOp) -> CoreResult<()>,
{
    let mut file = File::open(path)?;
    let mut buffer = FrameBuffer::new();
    let mut reader = FrameReader::<JournalOp>::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut operations = 0;

    loop {
        let read = match file.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        buffer.extend(&chunk[..read]);

        match reader.read(&mut buffer, |op| apply(op)) {
            Ok(n) => operations += n,
            Err(CoreError::Wire(err)) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "undecodable journal entry, discarding the rest of the file"
                );
                return Ok((operations, false));
            }
            Err(err) => return Err(err),
        }
    }

    if !buffer.is_empty() {
        warn!(
            path = %path.display(),
            bytes = buffer.len(),
            "journal file ends in a partial entry, discarding it"
        );
        return Ok((operations, false));
    }
    Ok((operations, true))
}
