//! List command implementation.

use super::open_existing;
use crate::{Format, Table};
use freg_core::{Change, Head, InstanceId, Missing, NodeId, StorageRecord};
use serde::Serialize;
use std::path::Path;

/// Runs the list command.
pub fn run(
    path: &Path,
    table: Table,
    dir: Option<&str>,
    offset: u64,
    limit: u64,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    if dir.is_some() && table != Table::Heads {
        return Err("--dir only applies to heads".into());
    }

    let store = open_existing(path)?;
    match table {
        Table::Changes => print_rows(&store.list_changes(offset, limit)?, format, change_line),
        Table::Heads => {
            let heads = match dir {
                Some(dir) => store.list_dir_heads(parse_dir(dir)?, offset, limit)?,
                None => store.list_heads(offset, limit)?,
            };
            print_rows(&heads, format, head_line)
        }
        Table::Missing => print_rows(&store.list_missing(offset, limit)?, format, missing_line),
        Table::Storage => print_rows(&store.list_storage(offset, limit)?, format, storage_line),
    }
}

fn print_rows<T: Serialize>(
    rows: &[T],
    format: Format,
    line: fn(&T) -> String,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(rows)?),
        Format::Text => {
            for row in rows {
                println!("{}", line(row));
            }
        }
    }
    Ok(())
}

/// Parses `root` or `<instance>.n<index>`.
fn parse_dir(arg: &str) -> Result<Option<NodeId>, String> {
    if arg == "root" {
        return Ok(None);
    }
    let invalid = || format!("invalid directory node '{arg}', expected <instance>.n<index> or root");
    let (instance, index) = arg.split_once(".n").ok_or_else(invalid)?;
    let instance = instance.parse::<u32>().map_err(|_| invalid())?;
    let index = index.parse::<u64>().map_err(|_| invalid())?;
    Ok(Some(NodeId::new(InstanceId::new(instance), index)))
}

fn optional<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn change_line(change: &Change) -> String {
    format!("{}  parent={}", change.id, optional(change.parent))
}

fn head_line(head: &Head) -> String {
    let mut flags = String::new();
    flags.push(if head.meta.writable { 'w' } else { '-' });
    flags.push(if head.meta.executable { 'x' } else { '-' });
    format!(
        "{}  {}  storage={}  dir={}  {}  modified={}",
        head.id,
        flags,
        optional(head.storage),
        head.meta.dir.map_or_else(|| "root".to_string(), |d| d.to_string()),
        head.meta.filename,
        head.modified
    )
}

fn missing_line(missing: &Missing) -> String {
    format!(
        "{}  head={}  storage={}",
        missing.id,
        optional(missing.head),
        optional(missing.storage)
    )
}

fn storage_line(record: &StorageRecord) -> String {
    format!("{}  references={}", record.id, record.references)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_directory_args() {
        assert_eq!(parse_dir("root").unwrap(), None);
        assert_eq!(
            parse_dir("2.n17").unwrap(),
            Some(NodeId::new(InstanceId::new(2), 17))
        );
        assert!(parse_dir("2.c17").is_err());
        assert!(parse_dir("x.n1").is_err());
        assert!(parse_dir("1.n").is_err());
    }

    #[test]
    fn optional_values_render_as_dash() {
        assert_eq!(optional::<u64>(None), "-");
        assert_eq!(optional(Some(3)), "3");
    }
}
