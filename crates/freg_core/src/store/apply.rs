//! Applying journaled operations.
//!
//! These functions run both for live operations and during replay, so each
//! must land on the same state when run twice. Rows are written with
//! absolute values and blob edits overwrite whole ranges.

use crate::error::CoreResult;
use crate::events::StoreEvent;
use crate::journal::{AddChange, JournalOp, UpdateDeleteHead};
use crate::metadata::MetadataStore;
use crate::types::{Missing, StorageChanges, StorageId};
use freg_storage::BlobStore;
use tracing::trace;

/// Applies one operation and returns the events it produced.
pub(crate) fn apply(
    meta: &MetadataStore,
    blobs: &dyn BlobStore,
    op: &JournalOp,
) -> CoreResult<Vec<StoreEvent>> {
    match op {
        JournalOp::AddChange(op) => add_change(meta, op),
        JournalOp::UpdateDeleteHead(op) => update_delete_head(meta, blobs, op),
    }
}

fn add_change(meta: &MetadataStore, op: &AddChange) -> CoreResult<Vec<StoreEvent>> {
    let mut events = Vec::with_capacity(3);
    let tx = meta.begin()?;

    if meta.insert_change(&op.change)? {
        events.push(StoreEvent::ChangeAdded {
            id: op.change.id,
            parent: op.change.parent,
        });
    }
    if let Some(consumed) = op.consumed_missing() {
        if meta.delete_missing(consumed)? {
            events.push(StoreEvent::MissingRemoved(consumed));
        }
    }
    if let (Some(storage), Some(references)) = (op.storage, op.references) {
        meta.set_references(storage, references)?;
    }
    meta.upsert_missing(&Missing {
        id: op.change.id,
        head: op.head,
        storage: op.storage,
    })?;
    events.push(StoreEvent::MissingAdded(op.change.id));

    tx.commit()?;
    Ok(events)
}

fn update_delete_head(
    meta: &MetadataStore,
    blobs: &dyn BlobStore,
    op: &UpdateDeleteHead,
) -> CoreResult<Vec<StoreEvent>> {
    let mut events = Vec::with_capacity(3);
    let tx = meta.begin()?;

    if meta.delete_missing(op.id)? {
        events.push(StoreEvent::MissingRemoved(op.id));
    }
    if let Some(parent) = op.delete_parent {
        let parent = op.id.sibling(parent);
        if meta.delete_head(parent)? {
            events.push(StoreEvent::HeadRemoved(parent));
        }
    }

    if let Some(new_head) = &op.new_head {
        if let Some(target) = new_head.head.storage {
            write_content(blobs, op.storage, target, &new_head.changes)?;
            meta.insert_storage(target, 1)?;
        }
        meta.upsert_head(&new_head.head)?;
        events.push(StoreEvent::HeadAdded(new_head.head.id));
    }

    if let (Some(old), Some(references)) = (op.storage, op.references) {
        if references == 0 {
            meta.delete_storage(old)?;
            blobs.delete(old.0)?;
            trace!(storage = %old, "storage released");
        } else {
            meta.set_references(old, references)?;
        }
    }

    tx.commit()?;
    Ok(events)
}

/// Produces the content of `target` from the previous blob and the edits.
fn write_content(
    blobs: &dyn BlobStore,
    previous: Option<StorageId>,
    target: StorageId,
    changes: &StorageChanges,
) -> CoreResult<()> {
    let writes = match changes {
        StorageChanges::Truncate => {
            blobs.create(target.0)?;
            return Ok(());
        }
        StorageChanges::Writes(writes) => writes,
    };

    match previous {
        Some(previous) if previous != target => {
            trace!(from = %previous, to = %target, "copy on write");
            blobs.copy(previous.0, target.0)?;
        }
        Some(_) => {}
        None => blobs.create(target.0)?,
    }

    if !writes.is_empty() {
        let ranges: Vec<(u64, &[u8])> = writes
            .iter()
            .map(|write| (write.offset, write.data.as_ref()))
            .collect();
        blobs.write_at(target.0, &ranges)?;
    }
    Ok(())
}
