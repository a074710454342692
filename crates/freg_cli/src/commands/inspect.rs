//! Inspect command implementation.

use super::open_existing;
use crate::Format;
use freg_core::StoreInfo;
use std::path::Path;

/// Runs the inspect command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let info = store.info()?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        Format::Text => print_text_output(path, &info),
    }
    Ok(())
}

fn print_text_output(path: &Path, info: &StoreInfo) {
    println!("Store: {}", path.display());
    println!();
    println!("Instance:");
    println!("  Id:          {}", info.instance.id);
    println!("  Name:        {}", info.instance.name);
    println!("  Unique:      {:08x}", info.instance.unique);
    println!("  Fingerprint: {}", info.fingerprint);
    println!();
    println!("Counters (next id):");
    println!("  Node:    {}", info.node_counter);
    println!("  Change:  {}", info.change_counter);
    println!("  Storage: {}", info.storage_counter);
    println!();
    println!("Tables:");
    println!("  Instances: {}", info.tables.instances);
    println!("  Changes:   {}", info.tables.changes);
    println!("  Heads:     {}", info.tables.heads);
    println!("  Missing:   {}", info.tables.missing);
    println!("  Storage:   {}", info.tables.storage);
    println!();
    println!("Pending journal entries: {}", info.pending_journal);
}
