//! Cat command implementation.

use super::open_existing;
use freg_core::StorageId;
use std::io::{self, Write};
use std::path::Path;

/// Runs the cat command.
pub fn run(path: &Path, storage: u64) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let mut blob = store.open_blob(StorageId::new(storage))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    io::copy(&mut blob, &mut out)?;
    out.flush()?;
    Ok(())
}
