//! Journal messages and the wire layouts of the records they carry.
//!
//! Every value in a message is absolute: reference counts are final
//! counts, not deltas, and rows are written whole. Applying a message a
//! second time therefore lands on the same state.

use crate::types::{
    ByteWrite, Change, ChangeId, GlobalChangeId, Head, InstanceId, NodeId, NodeMeta, StorageChanges,
    StorageId,
};
use freg_wire::{wire_newtype, wire_protocol, wire_struct, WireError, WireFormat, WireInput, WireResult};

wire_newtype!(InstanceId, StorageId);
wire_struct!(NodeId { instance, index });
wire_struct!(ChangeId { instance, index });
wire_struct!(GlobalChangeId { node, change });
wire_struct!(Change { id, parent });
wire_struct!(NodeMeta {
    filename,
    dir,
    writable,
    executable
});
wire_struct!(Head {
    id,
    storage,
    meta,
    created,
    modified
});
wire_struct!(ByteWrite { offset, data });

const WRITES_TAG: u8 = 0;
const TRUNCATE_TAG: u8 = 1;

impl WireFormat for StorageChanges {
    fn wire_size(&self) -> usize {
        1 + match self {
            Self::Writes(writes) => writes.wire_size(),
            Self::Truncate => 0,
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> WireResult<()> {
        match self {
            Self::Writes(writes) => {
                WRITES_TAG.encode_into(out)?;
                writes.encode_into(out)
            }
            Self::Truncate => TRUNCATE_TAG.encode_into(out),
        }
    }

    fn decode_from(input: &mut WireInput<'_>) -> WireResult<Self> {
        match input.take_tag()? {
            WRITES_TAG => Ok(Self::Writes(Vec::decode_from(input)?)),
            TRUNCATE_TAG => Ok(Self::Truncate),
            tag => Err(WireError::UnknownVariant {
                type_name: "StorageChanges",
                tag,
            }),
        }
    }
}

/// Announces a change and makes it missing.
#[derive(Debug, Clone, PartialEq)]
pub struct AddChange {
    /// The announced change.
    pub change: Change,
    /// Head the change will supersede.
    pub head: Option<ChangeId>,
    /// Storage the new missing entry co-owns.
    pub storage: Option<StorageId>,
    /// Final reference count of `storage`, if it changes.
    pub references: Option<u64>,
    /// Whether the parent's missing row is consumed.
    pub delete_missing: bool,
}
wire_struct!(AddChange {
    change,
    head,
    storage,
    references,
    delete_missing
});

impl AddChange {
    /// The missing row this operation consumes, if any.
    #[must_use]
    pub fn consumed_missing(&self) -> Option<GlobalChangeId> {
        if self.delete_missing {
            self.change.parent.map(|parent| self.change.id.sibling(parent))
        } else {
            None
        }
    }
}

/// A head to materialize together with its content edits.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHead {
    /// The head row.
    pub head: Head,
    /// Edits that produce the head's blob.
    pub changes: StorageChanges,
}
wire_struct!(NewHead { head, changes });

/// Defines a missing change as a new head, or as a deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDeleteHead {
    /// Storage the missing entry co-owned.
    pub storage: Option<StorageId>,
    /// Final reference count of `storage`; zero deletes it.
    pub references: Option<u64>,
    /// The change being defined.
    pub id: GlobalChangeId,
    /// Head superseded by this definition.
    pub delete_parent: Option<ChangeId>,
    /// The new head; `None` deletes the node.
    pub new_head: Option<NewHead>,
}
wire_struct!(UpdateDeleteHead {
    storage,
    references,
    id,
    delete_parent,
    new_head
});

wire_protocol! {
    /// Operations recorded in the journal.
    pub enum JournalOp {
        version V0 {
            AddChange(AddChange),
            UpdateDeleteHead(UpdateDeleteHead),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freg_wire::{encode, peek_header, Message, MessageSet, HEADER_SIZE};
    use proptest::prelude::*;

    fn gid(node: u64, change: u64) -> GlobalChangeId {
        GlobalChangeId::new(
            NodeId::new(InstanceId(1), node),
            ChangeId::new(InstanceId(1), change),
        )
    }

    fn round_trip(op: &JournalOp) -> JournalOp {
        let frame = op.encode_message().unwrap();
        let header = peek_header(&frame).unwrap();
        assert_eq!(header.frame_len(), frame.len());
        JournalOp::decode_message(&header, &frame[HEADER_SIZE..]).unwrap()
    }

    #[test]
    fn message_ids() {
        assert_eq!((AddChange::VERSION, AddChange::KIND), (0, 0));
        assert_eq!((UpdateDeleteHead::VERSION, UpdateDeleteHead::KIND), (0, 1));
    }

    #[test]
    fn add_change_layout() {
        let op = AddChange {
            change: Change {
                id: gid(2, 3),
                parent: None,
            },
            head: None,
            storage: Some(StorageId(9)),
            references: None,
            delete_missing: false,
        };
        let bytes = encode(&op).unwrap();
        // 24 id bytes, parent flag, head flag, storage flag + 8, refs flag, bool
        assert_eq!(bytes.len(), 24 + 1 + 1 + 9 + 1 + 1);
        assert_eq!(&bytes[..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[4..12], &2u64.to_le_bytes());
    }

    #[test]
    fn consumed_missing_is_the_parent() {
        let op = AddChange {
            change: Change {
                id: gid(2, 3),
                parent: Some(ChangeId::new(InstanceId(1), 2)),
            },
            head: None,
            storage: None,
            references: None,
            delete_missing: true,
        };
        assert_eq!(op.consumed_missing(), Some(gid(2, 2)));
        let kept = AddChange {
            delete_missing: false,
            ..op
        };
        assert_eq!(kept.consumed_missing(), None);
    }

    #[test]
    fn storage_changes_tags() {
        assert_eq!(encode(&StorageChanges::Truncate).unwrap(), [1]);
        assert_eq!(encode(&StorageChanges::default()).unwrap(), [0, 0, 0]);
        assert_eq!(
            freg_wire::decode::<StorageChanges>(&[2]),
            Err(WireError::UnknownVariant {
                type_name: "StorageChanges",
                tag: 2
            })
        );
    }

    #[test]
    fn update_delete_head_round_trip() {
        let op = JournalOp::from(UpdateDeleteHead {
            storage: Some(StorageId(1)),
            references: Some(0),
            id: gid(1, 2),
            delete_parent: Some(ChangeId::new(InstanceId(1), 1)),
            new_head: Some(NewHead {
                head: Head {
                    id: gid(1, 2),
                    storage: Some(StorageId(2)),
                    meta: NodeMeta {
                        filename: "notes.txt".into(),
                        dir: Some(NodeId::new(InstanceId(1), 7)),
                        writable: true,
                        executable: false,
                    },
                    created: 1_700_000_000,
                    modified: 1_700_000_100,
                },
                changes: StorageChanges::Writes(vec![
                    ByteWrite::new(5, &b"wizard"[..]),
                    ByteWrite::new(3, &b"peanut diva"[..]),
                ]),
            }),
        });
        assert_eq!(round_trip(&op), op);
    }

    #[test]
    fn delete_round_trip() {
        let op = JournalOp::from(UpdateDeleteHead {
            storage: None,
            references: None,
            id: gid(4, 4),
            delete_parent: None,
            new_head: None,
        });
        assert_eq!(round_trip(&op), op);
    }

    fn changes_strategy() -> impl Strategy<Value = StorageChanges> {
        prop_oneof![
            Just(StorageChanges::Truncate),
            prop::collection::vec(
                (any::<u64>(), prop::collection::vec(any::<u8>(), 0..64)),
                0..8
            )
            .prop_map(|writes| StorageChanges::Writes(
                writes
                    .into_iter()
                    .map(|(offset, data)| ByteWrite::new(offset, data))
                    .collect()
            )),
        ]
    }

    proptest! {
        #[test]
        fn storage_changes_round_trip(changes in changes_strategy()) {
            let bytes = encode(&changes).unwrap();
            prop_assert_eq!(bytes.len(), changes.wire_size());
            prop_assert_eq!(freg_wire::decode::<StorageChanges>(&bytes).unwrap(), changes);
        }

        #[test]
        fn add_change_round_trip(
            node in 1u64..1000,
            change in 1u64..1000,
            parent in proptest::option::of(1u64..1000),
            storage in proptest::option::of(1u64..1000),
            references in proptest::option::of(0u64..10),
            delete_missing in any::<bool>(),
        ) {
            let op = JournalOp::from(AddChange {
                change: Change {
                    id: gid(node, change),
                    parent: parent.map(|p| ChangeId::new(InstanceId(1), p)),
                },
                head: parent.map(|p| ChangeId::new(InstanceId(1), p)),
                storage: storage.map(StorageId),
                references,
                delete_missing,
            });
            prop_assert_eq!(round_trip(&op), op);
        }
    }
}
