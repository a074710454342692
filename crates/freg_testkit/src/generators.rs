//! Property-based test generators using proptest.
//!
//! Generates edit histories for the model harness in
//! [`crate::integration`].

use freg_core::{ByteWrite, StorageChanges};
use proptest::prelude::*;

/// Content edits in a form the model can replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditContent {
    /// Byte-range writes, in order.
    Writes(Vec<(u64, Vec<u8>)>),
    /// Empty the content.
    Truncate,
}

impl EditContent {
    /// Converts to the store's edit type.
    pub fn to_changes(&self) -> StorageChanges {
        match self {
            Self::Writes(writes) => StorageChanges::Writes(
                writes
                    .iter()
                    .map(|(offset, data)| ByteWrite::new(*offset, data.clone()))
                    .collect(),
            ),
            Self::Truncate => StorageChanges::Truncate,
        }
    }

    /// Applies the edits to modeled content; `None` means no storage.
    pub fn apply_to(&self, content: Option<Vec<u8>>) -> Option<Vec<u8>> {
        match self {
            Self::Truncate => Some(Vec::new()),
            Self::Writes(writes) if writes.is_empty() => content,
            Self::Writes(writes) => {
                let mut bytes = content.unwrap_or_default();
                for (offset, data) in writes {
                    if data.is_empty() {
                        continue;
                    }
                    let start = *offset as usize;
                    let end = start + data.len();
                    if bytes.len() < end {
                        bytes.resize(end, 0);
                    }
                    bytes[start..end].copy_from_slice(data);
                }
                Some(bytes)
            }
        }
    }
}

/// One step of a generated history.
///
/// `node` picks among live heads modulo their count and `pending` among
/// announced but undefined changes; actions with nothing to pick are
/// skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditAction {
    /// Create a node and define its first head.
    Create {
        /// Initial content.
        content: EditContent,
    },
    /// Supersede a node's head with edited content.
    Edit {
        /// Node pick.
        node: usize,
        /// The edits.
        content: EditContent,
    },
    /// Supersede a node's head keeping its content.
    Rename {
        /// Node pick.
        node: usize,
    },
    /// Announce two chained changes and define only the second.
    Chain {
        /// Node pick.
        node: usize,
        /// Edits of the defined change.
        content: EditContent,
    },
    /// Delete a node.
    Delete {
        /// Node pick.
        node: usize,
    },
    /// Announce two children of one head and define both, leaving the
    /// node with two heads.
    Fork {
        /// Node pick.
        node: usize,
        /// Edits of the first child.
        first: EditContent,
        /// Edits of the second child.
        second: EditContent,
        /// Define the second child before the first.
        swap: bool,
    },
    /// Announce a child of a head and leave it undefined.
    Announce {
        /// Node pick.
        node: usize,
    },
    /// Define a change left undefined by [`EditAction::Announce`].
    Resolve {
        /// Pending change pick.
        pending: usize,
        /// The edits.
        content: EditContent,
    },
}

/// Strategy for content edits with small offsets so writes overlap.
pub fn edit_content_strategy() -> impl Strategy<Value = EditContent> {
    prop_oneof![
        4 => prop::collection::vec(
            (0u64..48, prop::collection::vec(any::<u8>(), 0..16)),
            0..4
        )
        .prop_map(EditContent::Writes),
        1 => Just(EditContent::Truncate),
    ]
}

/// Strategy for a single history step.
pub fn edit_action_strategy() -> impl Strategy<Value = EditAction> {
    prop_oneof![
        3 => edit_content_strategy().prop_map(|content| EditAction::Create { content }),
        4 => (any::<usize>(), edit_content_strategy())
            .prop_map(|(node, content)| EditAction::Edit { node, content }),
        1 => any::<usize>().prop_map(|node| EditAction::Rename { node }),
        1 => (any::<usize>(), edit_content_strategy())
            .prop_map(|(node, content)| EditAction::Chain { node, content }),
        1 => any::<usize>().prop_map(|node| EditAction::Delete { node }),
        1 => (
            any::<usize>(),
            edit_content_strategy(),
            edit_content_strategy(),
            any::<bool>(),
        )
            .prop_map(|(node, first, second, swap)| EditAction::Fork {
                node,
                first,
                second,
                swap,
            }),
        1 => any::<usize>().prop_map(|node| EditAction::Announce { node }),
        1 => (any::<usize>(), edit_content_strategy())
            .prop_map(|(pending, content)| EditAction::Resolve { pending, content }),
    ]
}

/// Strategy for a history of up to `max_len` steps.
pub fn history_strategy(max_len: usize) -> impl Strategy<Value = Vec<EditAction>> {
    prop::collection::vec(edit_action_strategy(), 1..max_len.max(2))
}
