//! # freg Testkit
//!
//! Test utilities for freg.
//!
//! This crate provides:
//! - Temporary stores and sample node data
//! - A fault-injecting blob store and journal helpers for crash tests
//! - Whole-store snapshots for before/after comparisons
//! - Property-based generators of edit sequences
//! - A model harness that checks a store against an in-memory model
//!
//! ## Usage
//!
//! ```rust,ignore
//! use freg_testkit::prelude::*;
//!
//! #[test]
//! fn define_a_file() {
//!     let store = TestStore::new();
//!     let id = new_root_change(&store);
//!     define_file(&store, id, "notes.txt", writes(&[(0, "hello")]));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod snapshot;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::snapshot::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use snapshot::*;
