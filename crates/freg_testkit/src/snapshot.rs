//! Whole-store snapshots.
//!
//! Two snapshots compare equal when the tables and every referenced blob
//! are identical, which is how replay and reopen tests check that nothing
//! changed.

use freg_core::{Change, ChangeGraphStore, CoreResult, Head, Missing, StorageRecord};
use std::collections::BTreeMap;

/// Rows fetched per listing call.
const PAGE: u64 = 64;

/// Captured content of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Change rows.
    pub changes: Vec<Change>,
    /// Head rows.
    pub heads: Vec<Head>,
    /// Missing rows.
    pub missing: Vec<Missing>,
    /// Storage rows.
    pub storage: Vec<StorageRecord>,
    /// Blob content per storage row.
    pub blobs: BTreeMap<u64, Vec<u8>>,
}

impl StoreSnapshot {
    /// Captures every table and blob of `store`.
    pub fn capture(store: &ChangeGraphStore) -> CoreResult<Self> {
        let storage = collect(|offset, count| store.list_storage(offset, count))?;
        let mut blobs = BTreeMap::new();
        for record in &storage {
            blobs.insert(record.id.as_u64(), store.read_blob(record.id)?);
        }
        Ok(Self {
            changes: collect(|offset, count| store.list_changes(offset, count))?,
            heads: collect(|offset, count| store.list_heads(offset, count))?,
            missing: collect(|offset, count| store.list_missing(offset, count))?,
            storage,
            blobs,
        })
    }

    /// Returns the heads of one node.
    pub fn heads_of(&self, node: freg_core::NodeId) -> Vec<&Head> {
        self.heads.iter().filter(|head| head.id.node == node).collect()
    }
}

fn collect<T>(mut page: impl FnMut(u64, u64) -> CoreResult<Vec<T>>) -> CoreResult<Vec<T>> {
    let mut rows = Vec::new();
    loop {
        let batch = page(rows.len() as u64, PAGE)?;
        let done = (batch.len() as u64) < PAGE;
        rows.extend(batch);
        if done {
            return Ok(rows);
        }
    }
}
