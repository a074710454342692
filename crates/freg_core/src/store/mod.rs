//! The change graph store.
//!
//! [`ChangeGraphStore`] owns a store root and is the only way to mutate it.
//! Each mutation is planned against the current tables, journaled with
//! every resulting value already computed, and then applied. Observers are
//! notified once the apply has committed.
//!
//! ## Reference Counting
//!
//! A storage row counts the heads and missing entries pointing at its blob.
//! Announcing a change on top of a head adds a reference; defining the
//! change releases the missing entry's reference and the superseded head's.
//! A definition with content edits rewrites the blob in place when nothing
//! else references it and copies it to a new storage id otherwise.
//!
//! ## Failed Mutations
//!
//! When an apply fails its metadata transaction rolls back, but blob writes
//! that already happened stay and the journal entry is kept. The store rolls
//! that entry forward before planning the next mutation, so no later
//! operation is computed against state the entry would overwrite.

mod apply;
mod inspect;

pub use inspect::{Problem, ValidationReport};

use crate::config::Config;
use crate::dir::StoreDir;
use crate::error::{CoreError, CoreResult};
use crate::events::{EventFeed, StoreEvent, Subscription, SubscriptionId};
use crate::fingerprint::environment_fingerprint;
use crate::journal::{AddChange, Journal, JournalOp, NewHead, ReplayStats, UpdateDeleteHead};
use crate::metadata::{Counter, MetadataStore, Stats, TableCounts};
use crate::types::{
    Change, ChangeId, Definition, GlobalChangeId, Head, Instance, InstanceId, Missing, NodeId,
    StorageId, StorageRecord,
};
use freg_storage::{BlobReader, BlobStore, FileBlobStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// State guarded by the store's writer lock.
struct Inner {
    meta: MetadataStore,
    blobs: Box<dyn BlobStore>,
    journal: Journal,
    /// Set when an operation failed after its entry may have been written.
    /// The entry is applied again before anything else is planned.
    unsettled: bool,
}

impl Inner {
    /// Journals `op`, applies it and returns the resulting events.
    fn act(&mut self, op: &JournalOp) -> CoreResult<Vec<StoreEvent>> {
        let result = self
            .journal
            .act(op, |op| apply::apply(&self.meta, self.blobs.as_ref(), op));
        if result.is_err() {
            self.unsettled = true;
        }
        result
    }

    /// Finishes operations left in the journal by a failed [`Inner::act`].
    ///
    /// The failed apply rolled back its rows but may have touched blobs, so
    /// the entry is rolled forward. Until that succeeds every mutation
    /// fails with the replay error.
    fn settle(&mut self) -> CoreResult<Vec<StoreEvent>> {
        if !self.unsettled {
            return Ok(Vec::new());
        }
        let mut events = Vec::new();
        let stats = self.journal.replay(|op| {
            events.extend(apply::apply(&self.meta, self.blobs.as_ref(), &op)?);
            Ok(())
        })?;
        self.unsettled = false;
        if stats.files > 0 {
            warn!(
                operations = stats.operations,
                discarded = stats.discarded,
                "completed operations left by an earlier failure"
            );
        }
        Ok(events)
    }

    /// Returns the recorded reference count of a storage row that must exist.
    fn references(&self, storage: StorageId) -> CoreResult<u64> {
        match self.meta.get_storage(storage)? {
            Some(record) => Ok(record.references),
            None => Err(CoreError::invariant(format!(
                "storage {storage} is referenced but has no record"
            ))),
        }
    }

    fn reserve_storage(&self) -> CoreResult<StorageId> {
        Ok(StorageId(self.meta.take(Counter::Storage)?))
    }
}

/// Summary of a store, as shown by `freg inspect`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreInfo {
    /// The local instance.
    pub instance: Instance,
    /// Environment fingerprint the instance was minted for.
    pub fingerprint: String,
    /// Next node index.
    pub node_counter: u64,
    /// Next change index.
    pub change_counter: u64,
    /// Next storage index.
    pub storage_counter: u64,
    /// Row counts per table.
    pub tables: TableCounts,
    /// Journal files not yet applied.
    pub pending_journal: usize,
}

/// A versioned node store rooted at one directory.
///
/// # Example
///
/// ```rust,ignore
/// use freg_core::{ChangeGraphStore, Change, Config, Definition, GlobalChangeId};
///
/// let store = ChangeGraphStore::open(root, Config::new().instance_name("laptop"))?;
/// let id = GlobalChangeId::new(store.reserve_node()?, store.reserve_change()?);
/// store.add_change(Change { id, parent: None })?;
/// store.define_change(id, Definition::DefineHead { changes, meta })?;
/// ```
///
/// The store serializes its callers internally; it can be shared across
/// threads behind an `Arc`.
pub struct ChangeGraphStore {
    dir: StoreDir,
    inner: Mutex<Inner>,
    events: EventFeed,
    instance: InstanceId,
    replay: ReplayStats,
}

impl std::fmt::Debug for ChangeGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeGraphStore")
            .field("root", &self.dir.root())
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

impl ChangeGraphStore {
    /// Opens the store at `root`, creating it if allowed.
    ///
    /// Pending journal entries are replayed before this returns. If the
    /// directory was moved or copied since the last open, a new instance is
    /// minted and becomes primary.
    ///
    /// # Errors
    ///
    /// - `MissingInstanceName` if a new store would be created without a name
    /// - `StoreNotFound` if the root is absent and creation is disabled
    /// - `StoreLocked` if another handle has the root open
    /// - any error raised while replaying the journal
    pub fn open(root: &Path, config: Config) -> CoreResult<Self> {
        let dir = open_dir_checked(root, &config)?;
        let blobs = FileBlobStore::with_copy_buffer(&dir.storage_dir(), config.copy_buffer_size)?;
        Self::open_dir(dir, config, Box::new(blobs))
    }

    /// Opens the store at `root` with a custom blob store.
    ///
    /// The blob store replaces `<root>/storage`; everything else is kept
    /// under `root` as usual.
    ///
    /// # Errors
    ///
    /// Same as [`ChangeGraphStore::open`].
    pub fn open_with_blobs(
        root: &Path,
        config: Config,
        blobs: Box<dyn BlobStore>,
    ) -> CoreResult<Self> {
        let dir = open_dir_checked(root, &config)?;
        Self::open_dir(dir, config, blobs)
    }

    fn open_dir(dir: StoreDir, config: Config, blobs: Box<dyn BlobStore>) -> CoreResult<Self> {
        let meta = MetadataStore::open(&dir.metadata_path())?;
        let mut journal = Journal::open(&dir.journal_dir(), config.sync_journal)?;
        if let Some(archive) = &config.journal_archive {
            journal = journal.with_archive(archive)?;
        }
        let inner = Inner {
            meta,
            blobs,
            journal,
            unsettled: false,
        };

        let replay = inner.journal.replay(|op| {
            apply::apply(&inner.meta, inner.blobs.as_ref(), &op).map(|_| ())
        })?;

        let instance = establish_instance(&inner.meta, dir.root(), config.instance_name)?;
        debug!(root = %dir.root().display(), %instance, "store opened");

        Ok(Self {
            dir,
            inner: Mutex::new(inner),
            events: EventFeed::new(),
            instance,
            replay,
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.root()
    }

    /// Returns the primary instance, which scopes every id minted here.
    #[must_use]
    pub fn this_instance(&self) -> InstanceId {
        self.instance
    }

    /// Returns what the journal replay did while opening.
    #[must_use]
    pub fn replay_stats(&self) -> ReplayStats {
        self.replay
    }

    /// Reserves a fresh node id. Ids that end up unused are never reissued.
    pub fn reserve_node(&self) -> CoreResult<NodeId> {
        let index = self.inner.lock().meta.take(Counter::Node)?;
        Ok(NodeId::new(self.instance, index))
    }

    /// Reserves a fresh change id.
    pub fn reserve_change(&self) -> CoreResult<ChangeId> {
        let index = self.inner.lock().meta.take(Counter::Change)?;
        Ok(ChangeId::new(self.instance, index))
    }

    /// Reserves a fresh storage id.
    pub fn reserve_storage(&self) -> CoreResult<StorageId> {
        self.inner.lock().reserve_storage()
    }

    /// Announces a change, making it missing until it is defined.
    ///
    /// If the parent is itself missing, the new change takes over its
    /// superseded head and storage and the parent's missing entry is
    /// removed. If the parent is the current head, the new change will
    /// supersede it and takes a reference on its storage.
    ///
    /// Announcing a change that already exists is logged and ignored.
    ///
    /// If an earlier mutation failed after it was journaled, that operation
    /// is completed first.
    ///
    /// # Errors
    ///
    /// Returns an error if journaling or applying fails, including the
    /// completion of an earlier failed operation.
    pub fn add_change(&self, change: Change) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        self.events.emit_all(&inner.settle()?);
        if inner.meta.get_change(change.id)?.is_some() {
            warn!(change = %change.id, "change already added, ignoring");
            return Ok(());
        }

        let mut op = AddChange {
            change,
            head: None,
            storage: None,
            references: None,
            delete_missing: false,
        };
        if let Some(parent) = change.parent {
            let parent_id = change.id.sibling(parent);
            if let Some(missing) = inner.meta.get_missing(parent_id)? {
                op.head = missing.head;
                op.storage = missing.storage;
                op.delete_missing = true;
            } else if let Some(head) = inner.meta.get_head(parent_id)? {
                op.head = Some(parent);
                op.storage = head.storage;
                if let Some(storage) = head.storage {
                    op.references = Some(inner.references(storage)? + 1);
                }
            }
        }

        let events = inner.act(&JournalOp::from(op))?;
        self.events.emit_all(&events);
        Ok(())
    }

    /// Defines a missing change as a new head or as a deletion.
    ///
    /// Defining a change that is not missing is logged and ignored. An
    /// earlier mutation that failed after journaling is completed first.
    ///
    /// # Errors
    ///
    /// Returns an error if journaling or applying fails, or an invariant
    /// error if the reference counts are inconsistent.
    pub fn define_change(&self, id: GlobalChangeId, definition: Definition) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        self.events.emit_all(&inner.settle()?);
        let Some(missing) = inner.meta.get_missing(id)? else {
            warn!(change = %id, "defining a change that is not missing, ignoring");
            return Ok(());
        };

        let mut references = match missing.storage {
            Some(storage) => Some(release(inner.references(storage)?, storage)?),
            None => None,
        };

        let now = unix_now();
        let mut created = now;
        let mut delete_parent = None;
        if let Some(head_id) = missing.head {
            if let Some(head) = inner.meta.get_head(id.sibling(head_id))? {
                if head.storage != missing.storage {
                    return Err(CoreError::invariant(format!(
                        "head {} and missing {id} disagree on storage",
                        head.id
                    )));
                }
                delete_parent = Some(head_id);
                created = head.created;
                if let (Some(count), Some(storage)) = (references, missing.storage) {
                    references = Some(release(count, storage)?);
                }
            }
        }

        let new_head = match definition {
            Definition::DeleteHead => None,
            Definition::DefineHead { changes, meta } => {
                let storage = match (missing.storage, references) {
                    (Some(old), Some(count)) if changes.is_empty() || count == 0 => {
                        references = Some(count + 1);
                        Some(old)
                    }
                    (Some(_), _) => Some(inner.reserve_storage()?),
                    (None, _) if !changes.is_empty() => Some(inner.reserve_storage()?),
                    (None, _) => None,
                };
                Some(NewHead {
                    head: Head {
                        id,
                        storage,
                        meta,
                        created,
                        modified: now,
                    },
                    changes,
                })
            }
        };

        let op = UpdateDeleteHead {
            storage: missing.storage,
            references,
            id,
            delete_parent,
            new_head,
        };
        let events = inner.act(&JournalOp::from(op))?;
        self.events.emit_all(&events);
        Ok(())
    }

    /// Looks up a change.
    pub fn get_change(&self, id: GlobalChangeId) -> CoreResult<Option<Change>> {
        self.inner.lock().meta.get_change(id)
    }

    /// Looks up a head.
    pub fn get_head(&self, id: GlobalChangeId) -> CoreResult<Option<Head>> {
        self.inner.lock().meta.get_head(id)
    }

    /// Looks up a missing entry.
    pub fn get_missing(&self, id: GlobalChangeId) -> CoreResult<Option<Missing>> {
        self.inner.lock().meta.get_missing(id)
    }

    /// Looks up a storage record.
    pub fn get_storage(&self, id: StorageId) -> CoreResult<Option<StorageRecord>> {
        self.inner.lock().meta.get_storage(id)
    }

    /// Lists changes in insertion order.
    pub fn list_changes(&self, offset: u64, count: u64) -> CoreResult<Vec<Change>> {
        self.inner.lock().meta.list_changes(offset, count)
    }

    /// Lists heads in insertion order.
    pub fn list_heads(&self, offset: u64, count: u64) -> CoreResult<Vec<Head>> {
        self.inner.lock().meta.list_heads(offset, count)
    }

    /// Lists missing entries in insertion order.
    pub fn list_missing(&self, offset: u64, count: u64) -> CoreResult<Vec<Missing>> {
        self.inner.lock().meta.list_missing(offset, count)
    }

    /// Lists storage records.
    pub fn list_storage(&self, offset: u64, count: u64) -> CoreResult<Vec<StorageRecord>> {
        self.inner.lock().meta.list_storage(offset, count)
    }

    /// Lists heads directly inside `dir`; `None` lists root-level entries.
    pub fn list_dir_heads(
        &self,
        dir: Option<NodeId>,
        offset: u64,
        count: u64,
    ) -> CoreResult<Vec<Head>> {
        self.inner.lock().meta.list_dir_heads(dir, offset, count)
    }

    /// Lists registered instances.
    pub fn list_instances(&self) -> CoreResult<Vec<Instance>> {
        self.inner.lock().meta.list_instances()
    }

    /// Opens a blob for reading.
    ///
    /// The reader does not hold the store's lock; a later definition that
    /// releases the blob may delete it underneath.
    ///
    /// # Errors
    ///
    /// Returns `StorageNotFound` if there is no record for `id`.
    pub fn open_blob(&self, id: StorageId) -> CoreResult<BlobReader> {
        let inner = self.inner.lock();
        if inner.meta.get_storage(id)?.is_none() {
            return Err(CoreError::StorageNotFound(id));
        }
        Ok(inner.blobs.open(id.0)?)
    }

    /// Reads a whole blob into memory.
    ///
    /// # Errors
    ///
    /// Returns `StorageNotFound` if there is no record for `id`.
    pub fn read_blob(&self, id: StorageId) -> CoreResult<Vec<u8>> {
        let inner = self.inner.lock();
        if inner.meta.get_storage(id)?.is_none() {
            return Err(CoreError::StorageNotFound(id));
        }
        Ok(inner.blobs.read_all(id.0)?)
    }

    /// Subscribes to store events.
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Cancels a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Reads the persisted counters and environment.
    pub fn stats(&self) -> CoreResult<Stats> {
        self.inner.lock().meta.stats()
    }

    /// Counts rows per table.
    pub fn table_counts(&self) -> CoreResult<TableCounts> {
        self.inner.lock().meta.table_counts()
    }

    /// Summarizes the store.
    pub fn info(&self) -> CoreResult<StoreInfo> {
        let inner = self.inner.lock();
        let stats = inner.meta.stats()?;
        let instance = inner
            .meta
            .get_instance(self.instance)?
            .ok_or_else(|| CoreError::invariant(format!("instance {} has no row", self.instance)))?;
        Ok(StoreInfo {
            instance,
            fingerprint: stats.fingerprint,
            node_counter: stats.node_counter,
            change_counter: stats.change_counter,
            storage_counter: stats.storage_counter,
            tables: inner.meta.table_counts()?,
            pending_journal: inner.journal.pending()?.len(),
        })
    }

    /// Checks the tables and blobs against each other.
    ///
    /// Operations left unfinished by a failed mutation are completed first.
    pub fn validate(&self) -> CoreResult<ValidationReport> {
        let mut inner = self.inner.lock();
        self.events.emit_all(&inner.settle()?);
        inspect::validate(&inner.meta, inner.blobs.as_ref())
    }

    /// Writes the change forest as a Graphviz digraph.
    pub fn write_graphviz<W: Write>(&self, out: &mut W) -> CoreResult<()> {
        inspect::write_graphviz(&self.inner.lock().meta, out)
    }
}

/// Takes the root lock, refusing to create a store that would have no
/// instance name.
fn open_dir_checked(root: &Path, config: &Config) -> CoreResult<StoreDir> {
    if !StoreDir::exists(root) && config.create_if_missing && config.instance_name.is_none() {
        return Err(CoreError::MissingInstanceName {
            path: root.to_path_buf(),
        });
    }
    StoreDir::open(root, config.create_if_missing)
}

/// Drops one reference from a count that must hold it.
fn release(count: u64, storage: StorageId) -> CoreResult<u64> {
    count.checked_sub(1).ok_or_else(|| {
        CoreError::invariant(format!("reference count of {storage} would go negative"))
    })
}

/// Returns the primary instance, minting a new one when the store is new or
/// its environment changed.
fn establish_instance(
    meta: &MetadataStore,
    root: &Path,
    name: Option<String>,
) -> CoreResult<InstanceId> {
    let fingerprint = environment_fingerprint(root)?;
    let stats = meta.stats()?;
    if let Some(primary) = stats.primary_instance {
        if stats.fingerprint == fingerprint {
            return Ok(primary);
        }
    }

    let previous = match stats.primary_instance {
        Some(primary) => meta.get_instance(primary)?.map(|instance| instance.name),
        None => None,
    };
    let Some(name) = name.or(previous) else {
        return Err(CoreError::MissingInstanceName {
            path: root.to_path_buf(),
        });
    };

    let tx = meta.begin()?;
    let instance = meta.insert_instance(&name, rand::random())?;
    meta.set_environment(&fingerprint, instance)?;
    tx.commit()?;

    info!(
        %instance,
        name = %name,
        previous = ?stats.primary_instance,
        fingerprint = %fingerprint,
        "minted instance"
    );
    Ok(instance)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
