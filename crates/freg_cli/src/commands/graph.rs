//! Graph command implementation.

use super::open_existing;
use std::io::{self, Write};
use std::path::Path;

/// Runs the graph command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    store.write_graphviz(&mut out)?;
    out.flush()?;
    Ok(())
}
