//! # freg core
//!
//! Storage engine of the freg versioned filesystem.
//!
//! Every filesystem entry is a *node* with a history of *changes*. A change
//! is first announced with [`ChangeGraphStore::add_change`], which makes it
//! *missing*, and later given content and metadata with
//! [`ChangeGraphStore::define_change`], which turns it into the node's
//! *head*. Head content lives in reference-counted blobs that are shared
//! until an edit forces a copy.
//!
//! This crate provides:
//! - identifiers and records ([`NodeId`], [`GlobalChangeId`], [`Head`], ...)
//! - the SQLite-backed metadata tables ([`MetadataStore`])
//! - the transaction journal that makes each mutation crash safe
//! - the [`ChangeGraphStore`] facade with lookups, listings and events
//!
//! ## On-disk Layout
//!
//! ```text
//! <root>/LOCK
//! <root>/coredb
//! <root>/storage/<storage id>
//! <root>/coretransactions/<session>-<sequence>
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
mod events;
mod fingerprint;
pub mod journal;
mod metadata;
mod store;
mod types;

/// Version of the freg core crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use config::Config;
pub use dir::StoreDir;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use events::{EventFeed, StoreEvent, Subscription, SubscriptionId};
pub use fingerprint::environment_fingerprint;
pub use journal::{Journal, ReplayStats};
pub use metadata::{Counter, MetadataStore, Stats, TableCounts, SCHEMA_VERSION};
pub use store::{ChangeGraphStore, Problem, StoreInfo, ValidationReport};
pub use types::{
    ByteWrite, Change, ChangeId, Definition, GlobalChangeId, Head, Instance, InstanceId, Missing,
    NodeId, NodeMeta, StorageChanges, StorageId, StorageRecord,
};
