//! CLI command implementations.

pub mod cat;
pub mod graph;
pub mod init;
pub mod inspect;
pub mod list;
pub mod verify;

use freg_core::{ChangeGraphStore, Config};
use std::path::Path;

/// Opens an existing store.
pub fn open_existing(path: &Path) -> Result<ChangeGraphStore, Box<dyn std::error::Error>> {
    let store = ChangeGraphStore::open(path, Config::new().create_if_missing(false))?;
    let replay = store.replay_stats();
    if replay.files > 0 {
        tracing::info!(
            files = replay.files,
            operations = replay.operations,
            "recovered pending operations"
        );
    }
    Ok(store)
}
