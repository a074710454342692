//! Consistency checks and graph dumps.

use crate::error::CoreResult;
use crate::metadata::MetadataStore;
use crate::types::{GlobalChangeId, StorageId};
use freg_storage::BlobStore;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::io::Write;

/// Rows fetched per listing call during full scans.
const SCAN_PAGE: u64 = 512;

/// Collects every row of a paginated listing.
pub(crate) fn scan_all<T, F>(mut page: F) -> CoreResult<Vec<T>>
where
    F: FnMut(u64, u64) -> CoreResult<Vec<T>>,
{
    let mut rows = Vec::new();
    loop {
        let batch = page(rows.len() as u64, SCAN_PAGE)?;
        let done = (batch.len() as u64) < SCAN_PAGE;
        rows.extend(batch);
        if done {
            return Ok(rows);
        }
    }
}

/// One inconsistency found by [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum Problem {
    /// A storage row's count disagrees with the heads and missing entries
    /// referencing it.
    ReferenceMismatch {
        /// The storage row.
        storage: StorageId,
        /// Count stored in the row.
        recorded: u64,
        /// Heads plus missing entries pointing at it.
        actual: u64,
    },
    /// A head without a change row.
    DanglingHead(GlobalChangeId),
    /// A missing entry without a change row.
    DanglingMissing(GlobalChangeId),
    /// A change that is both missing and a head.
    MissingAndHead(GlobalChangeId),
    /// A head or missing entry pointing at a storage id with no row.
    UnknownStorage {
        /// The referencing change.
        id: GlobalChangeId,
        /// The absent storage id.
        storage: StorageId,
    },
    /// A storage row whose blob is absent.
    BlobMissing(StorageId),
    /// A blob with no storage row.
    OrphanBlob(StorageId),
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReferenceMismatch {
                storage,
                recorded,
                actual,
            } => write!(
                f,
                "storage {storage} records {recorded} references but has {actual}"
            ),
            Self::DanglingHead(id) => write!(f, "head {id} has no change row"),
            Self::DanglingMissing(id) => write!(f, "missing entry {id} has no change row"),
            Self::MissingAndHead(id) => write!(f, "change {id} is both missing and a head"),
            Self::UnknownStorage { id, storage } => {
                write!(f, "change {id} points at unknown storage {storage}")
            }
            Self::BlobMissing(storage) => write!(f, "storage {storage} has no blob"),
            Self::OrphanBlob(storage) => write!(f, "blob {storage} has no storage row"),
        }
    }
}

/// Result of a consistency check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Problems in discovery order.
    pub problems: Vec<Problem>,
}

impl ValidationReport {
    /// Returns true if no problems were found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

pub(crate) fn validate(meta: &MetadataStore, blobs: &dyn BlobStore) -> CoreResult<ValidationReport> {
    let changes: HashSet<GlobalChangeId> = scan_all(|o, c| meta.list_changes(o, c))?
        .into_iter()
        .map(|change| change.id)
        .collect();
    let heads = scan_all(|o, c| meta.list_heads(o, c))?;
    let missing = scan_all(|o, c| meta.list_missing(o, c))?;
    let storage = scan_all(|o, c| meta.list_storage(o, c))?;

    let mut problems = Vec::new();
    let mut actual: HashMap<StorageId, u64> = HashMap::new();
    let head_ids: HashSet<GlobalChangeId> = heads.iter().map(|head| head.id).collect();

    for head in &heads {
        if !changes.contains(&head.id) {
            problems.push(Problem::DanglingHead(head.id));
        }
        if let Some(id) = head.storage {
            *actual.entry(id).or_default() += 1;
        }
    }
    for entry in &missing {
        if !changes.contains(&entry.id) {
            problems.push(Problem::DanglingMissing(entry.id));
        }
        if head_ids.contains(&entry.id) {
            problems.push(Problem::MissingAndHead(entry.id));
        }
        if let Some(id) = entry.storage {
            *actual.entry(id).or_default() += 1;
        }
    }

    let recorded: HashMap<StorageId, u64> =
        storage.iter().map(|row| (row.id, row.references)).collect();
    let referencing = heads
        .iter()
        .map(|head| (head.id, head.storage))
        .chain(missing.iter().map(|entry| (entry.id, entry.storage)));
    for (id, storage) in referencing {
        if let Some(storage) = storage {
            if !recorded.contains_key(&storage) {
                problems.push(Problem::UnknownStorage { id, storage });
            }
        }
    }

    for row in &storage {
        let count = actual.get(&row.id).copied().unwrap_or(0);
        if count != row.references {
            problems.push(Problem::ReferenceMismatch {
                storage: row.id,
                recorded: row.references,
                actual: count,
            });
        }
    }

    let blob_ids: BTreeSet<StorageId> = blobs.list()?.into_iter().map(StorageId).collect();
    for row in &storage {
        if !blob_ids.contains(&row.id) {
            problems.push(Problem::BlobMissing(row.id));
        }
    }
    for id in &blob_ids {
        if !recorded.contains_key(id) {
            problems.push(Problem::OrphanBlob(*id));
        }
    }

    Ok(ValidationReport { problems })
}

/// Renders the change forest in Graphviz DOT.
///
/// Heads are filled boxes labeled with their filename, missing changes are
/// dashed, and edges point from parent to child.
pub(crate) fn write_graphviz<W: Write>(meta: &MetadataStore, out: &mut W) -> CoreResult<()> {
    let changes = scan_all(|o, c| meta.list_changes(o, c))?;
    let heads: HashMap<GlobalChangeId, String> = scan_all(|o, c| meta.list_heads(o, c))?
        .into_iter()
        .map(|head| (head.id, head.meta.filename))
        .collect();
    let missing: HashSet<GlobalChangeId> = scan_all(|o, c| meta.list_missing(o, c))?
        .into_iter()
        .map(|entry| entry.id)
        .collect();

    writeln!(out, "digraph changes {{")?;
    writeln!(out, "  node [shape=ellipse];")?;
    for change in &changes {
        let id = change.id;
        if let Some(filename) = heads.get(&id) {
            writeln!(
                out,
                "  \"{id}\" [label=\"{}\\n{}\", shape=box, style=filled];",
                id.change,
                escape(filename)
            )?;
        } else if missing.contains(&id) {
            writeln!(out, "  \"{id}\" [label=\"{}\", style=dashed];", id.change)?;
        } else {
            writeln!(out, "  \"{id}\" [label=\"{}\"];", id.change)?;
        }
    }
    for change in &changes {
        if let Some(parent) = change.parent {
            writeln!(out, "  \"{}\" -> \"{}\";", change.id.sibling(parent), change.id)?;
        }
    }
    writeln!(out, "}}")?;
    Ok(())
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}
