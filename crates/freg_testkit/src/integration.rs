//! Model-checked integration harness.
//!
//! [`ModelHarness`] drives a real store with [`EditAction`]s while keeping
//! the expected heads, their content and the undefined changes in memory,
//! and checks the two against each other on demand.

use crate::fixtures::{define_entry, file_meta, head_content, new_child_change, new_root_change, TestStore};
use crate::generators::{EditAction, EditContent};
use crate::snapshot::StoreSnapshot;
use freg_core::{Definition, GlobalChangeId};
use std::collections::BTreeSet;

/// One head of a node. A forked node has several.
#[derive(Debug, Clone)]
struct Branch {
    head: GlobalChangeId,
    filename: String,
    content: Option<Vec<u8>>,
}

/// An announced change that has not been defined yet.
#[derive(Debug, Clone)]
struct Pending {
    id: GlobalChangeId,
    parent: GlobalChangeId,
    filename: String,
    base: Option<Vec<u8>>,
}

/// A store paired with a model of what it should contain.
pub struct ModelHarness {
    /// The store under test.
    pub store: TestStore,
    branches: Vec<Branch>,
    pending: Vec<Pending>,
    renames: usize,
}

impl ModelHarness {
    /// Creates a harness over an empty store.
    pub fn new() -> Self {
        Self::with_store(TestStore::new())
    }

    /// Creates a harness over an empty store that archives its journal.
    pub fn archiving() -> Self {
        Self::with_store(TestStore::archiving())
    }

    fn with_store(store: TestStore) -> Self {
        Self {
            store,
            branches: Vec::new(),
            pending: Vec::new(),
            renames: 0,
        }
    }

    /// Returns the number of live heads.
    pub fn live_heads(&self) -> usize {
        self.branches.len()
    }

    /// Returns the number of announced changes still undefined.
    pub fn pending_changes(&self) -> usize {
        self.pending.len()
    }

    /// Closes and reopens the store; the model is unchanged.
    pub fn reopen(self) -> Self {
        Self {
            store: self.store.reopen(),
            ..self
        }
    }

    /// Performs one step against the store and the model.
    pub fn apply(&mut self, action: &EditAction) {
        match action {
            EditAction::Create { content } => {
                let id = new_root_change(&self.store);
                let filename = format!("node{}", id.node.index);
                self.define(id, &filename, content);
                self.branches.push(Branch {
                    head: id,
                    filename,
                    content: content.apply_to(None),
                });
            }
            EditAction::Edit { node, content } => {
                if let Some(index) = self.pick(*node) {
                    let id = new_child_change(&self.store, self.branches[index].head);
                    self.supersede(index, id, content, None);
                }
            }
            EditAction::Rename { node } => {
                if let Some(index) = self.pick(*node) {
                    self.renames += 1;
                    let filename = format!("renamed{}", self.renames);
                    let id = new_child_change(&self.store, self.branches[index].head);
                    self.supersede(index, id, &EditContent::Writes(Vec::new()), Some(filename));
                }
            }
            EditAction::Chain { node, content } => {
                if let Some(index) = self.pick(*node) {
                    let first = new_child_change(&self.store, self.branches[index].head);
                    let second = new_child_change(&self.store, first);
                    self.supersede(index, second, content, None);
                }
            }
            EditAction::Delete { node } => {
                if let Some(index) = self.pick(*node) {
                    let id = new_child_change(&self.store, self.branches[index].head);
                    self.store
                        .define_change(id, Definition::DeleteHead)
                        .expect("Failed to delete node");
                    self.branches.swap_remove(index);
                }
            }
            EditAction::Fork {
                node,
                first,
                second,
                swap,
            } => {
                if let Some(index) = self.pick(*node) {
                    let branch = self.branches[index].clone();
                    let mut children = [
                        (new_child_change(&self.store, branch.head), first),
                        (new_child_change(&self.store, branch.head), second),
                    ];
                    if *swap {
                        children.swap(0, 1);
                    }
                    let [(replacing, replacing_content), (sibling, sibling_content)] = children;

                    self.supersede(index, replacing, replacing_content, None);
                    self.define(sibling, &branch.filename, sibling_content);
                    self.branches.push(Branch {
                        head: sibling,
                        filename: branch.filename,
                        content: sibling_content.apply_to(branch.content),
                    });
                }
            }
            EditAction::Announce { node } => {
                if let Some(index) = self.pick(*node) {
                    let branch = &self.branches[index];
                    let id = new_child_change(&self.store, branch.head);
                    self.pending.push(Pending {
                        id,
                        parent: branch.head,
                        filename: branch.filename.clone(),
                        base: branch.content.clone(),
                    });
                }
            }
            EditAction::Resolve { pending, content } => {
                if self.pending.is_empty() {
                    return;
                }
                let pending = self.pending.swap_remove(pending % self.pending.len());
                self.define(pending.id, &pending.filename, content);
                let branch = Branch {
                    head: pending.id,
                    filename: pending.filename,
                    content: content.apply_to(pending.base),
                };
                // Defining a change replaces its parent only while the
                // parent is still a head.
                match self.branches.iter().position(|b| b.head == pending.parent) {
                    Some(index) => self.branches[index] = branch,
                    None => self.branches.push(branch),
                }
            }
        }
    }

    /// Asserts that the store matches the model and is internally
    /// consistent.
    pub fn verify(&self) {
        let report = self.store.validate().expect("Failed to validate store");
        assert!(report.is_clean(), "store problems: {:?}", report.problems);

        let snapshot = StoreSnapshot::capture(&self.store).expect("Failed to capture store");
        let missing: BTreeSet<_> = snapshot.missing.iter().map(|entry| entry.id).collect();
        let pending: BTreeSet<_> = self.pending.iter().map(|entry| entry.id).collect();
        assert_eq!(missing, pending, "undefined changes");
        assert_eq!(snapshot.heads.len(), self.branches.len(), "head count");

        for branch in &self.branches {
            let head = snapshot
                .heads
                .iter()
                .find(|head| head.id == branch.head)
                .unwrap_or_else(|| panic!("head {} is missing", branch.head));
            assert_eq!(head.meta.filename, branch.filename);
            assert_eq!(
                head_content(&self.store, branch.head),
                branch.content,
                "content of {}",
                branch.head
            );
        }
    }

    fn pick(&self, node: usize) -> Option<usize> {
        if self.branches.is_empty() {
            None
        } else {
            Some(node % self.branches.len())
        }
    }

    fn define(&self, id: GlobalChangeId, filename: &str, content: &EditContent) {
        define_entry(&self.store, id, file_meta(filename), content.to_changes());
    }

    fn supersede(
        &mut self,
        index: usize,
        id: GlobalChangeId,
        content: &EditContent,
        filename: Option<String>,
    ) {
        let filename = filename.unwrap_or_else(|| self.branches[index].filename.clone());
        self.define(id, &filename, content);
        let branch = &mut self.branches[index];
        branch.head = id;
        branch.filename = filename;
        branch.content = content.apply_to(branch.content.take());
    }
}

impl Default for ModelHarness {
    fn default() -> Self {
        Self::new()
    }
}
