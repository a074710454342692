//! Identifiers and records of the change graph.

use bytes::Bytes;
use serde::Serialize;
use std::fmt;

/// Identifies one replica of a store.
///
/// Locally minted node and change ids are scoped to the instance that
/// minted them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct InstanceId(pub u32);

impl InstanceId {
    /// Creates an instance id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// Identifies one filesystem entry for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId {
    /// Instance that minted the id.
    pub instance: InstanceId,
    /// Per-instance counter value.
    pub index: u64,
}

impl NodeId {
    /// Creates a node id.
    #[must_use]
    pub const fn new(instance: InstanceId, index: u64) -> Self {
        Self { instance, index }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.n{}", self.instance.0, self.index)
    }
}

/// Identifies one edit event, unique within its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ChangeId {
    /// Instance that minted the id.
    pub instance: InstanceId,
    /// Per-instance counter value.
    pub index: u64,
}

impl ChangeId {
    /// Creates a change id.
    #[must_use]
    pub const fn new(instance: InstanceId, index: u64) -> Self {
        Self { instance, index }
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.c{}", self.instance.0, self.index)
    }
}

/// A change id qualified by its node; unique across the whole store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GlobalChangeId {
    /// The node the change belongs to.
    pub node: NodeId,
    /// The change within the node.
    pub change: ChangeId,
}

impl GlobalChangeId {
    /// Creates a global change id.
    #[must_use]
    pub const fn new(node: NodeId, change: ChangeId) -> Self {
        Self { node, change }
    }

    /// Returns the id of another change on the same node.
    #[must_use]
    pub const fn sibling(self, change: ChangeId) -> Self {
        Self {
            node: self.node,
            change,
        }
    }
}

impl fmt::Display for GlobalChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.change)
    }
}

/// Identifies one blob on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StorageId(pub u64);

impl StorageId {
    /// Creates a storage id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id, which is also the blob's file name.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// An immutable edit event. Root changes have no parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Change {
    /// The change's identity.
    pub id: GlobalChangeId,
    /// The change this one edits, on the same node.
    pub parent: Option<ChangeId>,
}

/// Filesystem metadata of a head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeMeta {
    /// Entry name within its directory.
    pub filename: String,
    /// Containing directory; `None` for root-level entries.
    pub dir: Option<NodeId>,
    /// Whether the entry is writable.
    pub writable: bool,
    /// Whether the entry is executable.
    pub executable: bool,
}

/// The materialized state of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Head {
    /// The change this head materializes.
    pub id: GlobalChangeId,
    /// Content blob; `None` for entries without content such as directories.
    pub storage: Option<StorageId>,
    /// Filesystem metadata.
    pub meta: NodeMeta,
    /// Creation time, seconds since the Unix epoch.
    pub created: u64,
    /// Last modification time, seconds since the Unix epoch.
    pub modified: u64,
}

/// A change that has been announced but not defined yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Missing {
    /// The announced change.
    pub id: GlobalChangeId,
    /// The head this change supersedes once defined.
    pub head: Option<ChangeId>,
    /// The storage this entry co-owns until it is defined.
    pub storage: Option<StorageId>,
}

/// A reference-counted blob record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageRecord {
    /// The blob id.
    pub id: StorageId,
    /// Number of heads and missing entries pointing at the blob.
    pub references: u64,
}

/// A registered replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    /// The instance id.
    pub id: InstanceId,
    /// Human-readable name.
    pub name: String,
    /// Random tag distinguishing installs that chose the same name.
    pub unique: u32,
}

/// One standalone byte-range overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteWrite {
    /// Offset the bytes are written at.
    pub offset: u64,
    /// The bytes.
    pub data: Bytes,
}

impl ByteWrite {
    /// Creates a write of `data` at `offset`.
    pub fn new(offset: u64, data: impl Into<Bytes>) -> Self {
        Self {
            offset,
            data: data.into(),
        }
    }
}

/// Content edits carried by a head definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageChanges {
    /// Writes applied in order on top of the inherited content.
    ///
    /// Writes may overlap and need not be sorted; an empty list keeps the
    /// inherited content as is.
    Writes(Vec<ByteWrite>),
    /// Replace the content with an empty blob.
    Truncate,
}

impl StorageChanges {
    /// Returns true if applying these changes leaves the content untouched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Writes(writes) if writes.is_empty())
    }
}

impl Default for StorageChanges {
    fn default() -> Self {
        Self::Writes(Vec::new())
    }
}

/// What a defined change does to its node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Definition {
    /// Materialize a new head.
    DefineHead {
        /// Content edits relative to the superseded head.
        changes: StorageChanges,
        /// Metadata of the new head.
        meta: NodeMeta,
    },
    /// Delete the node.
    DeleteHead,
}
