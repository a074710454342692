//! Init command implementation.

use freg_core::{ChangeGraphStore, Config, StoreDir};
use std::path::Path;

/// Runs the init command.
pub fn run(path: &Path, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    if StoreDir::exists(path) {
        return Err(format!("A store already exists at {}", path.display()).into());
    }

    let store = ChangeGraphStore::open(path, Config::new().instance_name(name))?;
    println!(
        "Created store at {} (instance {} \"{}\")",
        path.display(),
        store.this_instance(),
        name
    );
    Ok(())
}
