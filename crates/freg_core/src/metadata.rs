//! Metadata store.
//!
//! Tables live in a SQLite database at `<root>/coredb`:
//!
//! - `Stats`: one row with schema version, environment fingerprint,
//!   primary instance and the node/change/storage counters
//! - `Instances`: registered replicas
//! - `Changes`, `Heads`, `Missing`: keyed by global change id
//! - `Storage`: blob reference counts
//!
//! Statements are prepared once per connection and cached. Listings are
//! ordered by insertion (`rowid`), and upserts update in place so rows
//! keep their position.

use crate::error::{CoreError, CoreResult};
use crate::types::{
    Change, ChangeId, GlobalChangeId, Head, Instance, InstanceId, Missing, NodeId, NodeMeta,
    StorageId, StorageRecord,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;

/// Primary key parameters of a global change id, in column order.
macro_rules! key_params {
    ($id:expr) => {
        params![
            $id.node.instance.0,
            $id.node.index,
            $id.change.instance.0,
            $id.change.index
        ]
    };
}

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 0;

const SCHEMA: &str = r#"
CREATE TABLE "Stats" (
    "Version" INTEGER NOT NULL,
    "InstanceEnvHash" CHAR(16) NOT NULL,
    "InstanceIndex" INTEGER NOT NULL,
    "NodeCounter" INTEGER NOT NULL,
    "ChangeCounter" INTEGER NOT NULL,
    "StorageCounter" INTEGER NOT NULL
);

CREATE TABLE "Changes" (
    "NodeInstance" INTEGER NOT NULL,
    "NodeIndex" INTEGER NOT NULL,
    "ChangeInstance" INTEGER NOT NULL,
    "ChangeIndex" INTEGER NOT NULL,
    "ParentChangeInstance" INTEGER,
    "ParentChangeIndex" INTEGER,
    PRIMARY KEY ("NodeInstance", "NodeIndex", "ChangeInstance", "ChangeIndex")
);

CREATE TABLE "Instances" (
    "Instance" INTEGER PRIMARY KEY AUTOINCREMENT,
    "Name" VARCHAR NOT NULL,
    "Unique" INTEGER NOT NULL
);

CREATE TABLE "Heads" (
    "NodeInstance" INTEGER NOT NULL,
    "NodeIndex" INTEGER NOT NULL,
    "ChangeInstance" INTEGER NOT NULL,
    "ChangeIndex" INTEGER NOT NULL,
    "StorageIndex" INTEGER,
    "Filename" VARCHAR NOT NULL,
    "DirInstance" INTEGER,
    "DirIndex" INTEGER,
    "Writable" BOOLEAN NOT NULL,
    "Executable" BOOLEAN NOT NULL,
    "CreateTimestamp" INTEGER NOT NULL,
    "ModifyTimestamp" INTEGER NOT NULL,
    PRIMARY KEY ("NodeInstance", "NodeIndex", "ChangeInstance", "ChangeIndex")
);

CREATE TABLE "Missing" (
    "NodeInstance" INTEGER NOT NULL,
    "NodeIndex" INTEGER NOT NULL,
    "ChangeInstance" INTEGER NOT NULL,
    "ChangeIndex" INTEGER NOT NULL,
    "HeadInstance" INTEGER,
    "HeadIndex" INTEGER,
    "StorageIndex" INTEGER,
    PRIMARY KEY ("NodeInstance", "NodeIndex", "ChangeInstance", "ChangeIndex")
);

CREATE TABLE "Storage" (
    "StorageIndex" INTEGER PRIMARY KEY,
    "ReferenceCount" INTEGER NOT NULL
);
"#;

/// A persisted id counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Node ids.
    Node,
    /// Change ids.
    Change,
    /// Storage ids.
    Storage,
}

impl Counter {
    fn take_sql(self) -> &'static str {
        match self {
            Self::Node => {
                r#"UPDATE "Stats" SET "NodeCounter" = "NodeCounter" + 1 RETURNING "NodeCounter" - 1"#
            }
            Self::Change => {
                r#"UPDATE "Stats" SET "ChangeCounter" = "ChangeCounter" + 1 RETURNING "ChangeCounter" - 1"#
            }
            Self::Storage => {
                r#"UPDATE "Stats" SET "StorageCounter" = "StorageCounter" + 1 RETURNING "StorageCounter" - 1"#
            }
        }
    }
}

/// The `Stats` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    /// Schema version.
    pub version: u32,
    /// Fingerprint recorded when the primary instance was minted; empty
    /// before the first one.
    pub fingerprint: String,
    /// The primary instance, if one was minted.
    pub primary_instance: Option<InstanceId>,
    /// Next node index.
    pub node_counter: u64,
    /// Next change index.
    pub change_counter: u64,
    /// Next storage index.
    pub storage_counter: u64,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TableCounts {
    /// Registered instances.
    pub instances: u64,
    /// Change rows.
    pub changes: u64,
    /// Head rows.
    pub heads: u64,
    /// Missing rows.
    pub missing: u64,
    /// Storage rows.
    pub storage: u64,
}

/// Typed access to the metadata tables.
#[derive(Debug)]
pub struct MetadataStore {
    conn: Connection,
}

impl MetadataStore {
    /// Opens the metadata store, creating the schema on first use.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` for an unknown schema version, or a
    /// metadata error if the database cannot be opened.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Opens a private in-memory metadata store.
    ///
    /// # Errors
    ///
    /// Returns a metadata error if the schema cannot be created.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> CoreResult<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> CoreResult<()> {
        let exists: bool = self.conn.query_row(
            r#"SELECT count(1) FROM "sqlite_master" WHERE "type" = 'table' AND "name" = ?1"#,
            params!["Stats"],
            |row| row.get(0),
        )?;

        if !exists {
            let tx = self.conn.unchecked_transaction()?;
            tx.execute_batch(SCHEMA)?;
            tx.execute(
                r#"INSERT INTO "Stats" VALUES (?1, '', 0, 1, 1, 1)"#,
                params![SCHEMA_VERSION],
            )?;
            tx.commit()?;
            return Ok(());
        }

        let version: u32 = self
            .conn
            .query_row(r#"SELECT "Version" FROM "Stats" LIMIT 1"#, [], |row| {
                row.get(0)
            })?;
        if version != SCHEMA_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported metadata schema version {version}"
            )));
        }
        Ok(())
    }

    /// Starts a transaction covering every statement until it is committed.
    ///
    /// Dropping the returned transaction rolls it back.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already open.
    pub fn begin(&self) -> CoreResult<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    /// Reads the `Stats` row.
    pub fn stats(&self) -> CoreResult<Stats> {
        let mut stmt = self.conn.prepare_cached(
            r#"SELECT "Version", "InstanceEnvHash", "InstanceIndex", "NodeCounter",
                      "ChangeCounter", "StorageCounter"
               FROM "Stats" LIMIT 1"#,
        )?;
        Ok(stmt.query_row([], |row| {
            let primary: u32 = row.get(2)?;
            Ok(Stats {
                version: row.get(0)?,
                fingerprint: row.get(1)?,
                primary_instance: (primary != 0).then_some(InstanceId(primary)),
                node_counter: row.get(3)?,
                change_counter: row.get(4)?,
                storage_counter: row.get(5)?,
            })
        })?)
    }

    /// Returns the counter's current value and increments it.
    pub fn take(&self, counter: Counter) -> CoreResult<u64> {
        let mut stmt = self.conn.prepare_cached(counter.take_sql())?;
        Ok(stmt.query_row([], |row| row.get(0))?)
    }

    /// Records the environment fingerprint and primary instance.
    pub fn set_environment(&self, fingerprint: &str, primary: InstanceId) -> CoreResult<()> {
        let mut stmt = self
            .conn
            .prepare_cached(r#"UPDATE "Stats" SET "InstanceEnvHash" = ?1, "InstanceIndex" = ?2"#)?;
        stmt.execute(params![fingerprint, primary.0])?;
        Ok(())
    }

    /// Registers an instance and returns its id.
    pub fn insert_instance(&self, name: &str, unique: u32) -> CoreResult<InstanceId> {
        let mut stmt = self.conn.prepare_cached(
            r#"INSERT INTO "Instances" ("Instance", "Name", "Unique") VALUES (NULL, ?1, ?2)"#,
        )?;
        stmt.execute(params![name, unique])?;
        let id = u32::try_from(self.conn.last_insert_rowid())
            .map_err(|_| CoreError::invalid_format("instance id out of range"))?;
        Ok(InstanceId(id))
    }

    /// Looks up an instance.
    pub fn get_instance(&self, id: InstanceId) -> CoreResult<Option<Instance>> {
        let mut stmt = self.conn.prepare_cached(
            r#"SELECT "Instance", "Name", "Unique" FROM "Instances" WHERE "Instance" = ?1"#,
        )?;
        Ok(stmt.query_row(params![id.0], instance_from_row).optional()?)
    }

    /// Lists registered instances in id order.
    pub fn list_instances(&self) -> CoreResult<Vec<Instance>> {
        let mut stmt = self.conn.prepare_cached(
            r#"SELECT "Instance", "Name", "Unique" FROM "Instances" ORDER BY "Instance""#,
        )?;
        let rows = stmt.query_map([], instance_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Inserts a change row; an existing row is left untouched.
    ///
    /// Returns true if the row was inserted.
    pub fn insert_change(&self, change: &Change) -> CoreResult<bool> {
        let mut stmt = self
            .conn
            .prepare_cached(r#"INSERT OR IGNORE INTO "Changes" VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#)?;
        let inserted = stmt.execute(params![
            change.id.node.instance.0,
            change.id.node.index,
            change.id.change.instance.0,
            change.id.change.index,
            change.parent.map(|p| p.instance.0),
            change.parent.map(|p| p.index),
        ])?;
        Ok(inserted > 0)
    }

    /// Looks up a change.
    pub fn get_change(&self, id: GlobalChangeId) -> CoreResult<Option<Change>> {
        let mut stmt = self.conn.prepare_cached(
            r#"SELECT * FROM "Changes"
               WHERE "NodeInstance" = ?1 AND "NodeIndex" = ?2
                 AND "ChangeInstance" = ?3 AND "ChangeIndex" = ?4"#,
        )?;
        Ok(stmt.query_row(key_params!(id), change_from_row).optional()?)
    }

    /// Lists changes in insertion order.
    pub fn list_changes(&self, offset: u64, count: u64) -> CoreResult<Vec<Change>> {
        let mut stmt = self.conn.prepare_cached(
            r#"SELECT * FROM "Changes" ORDER BY rowid LIMIT ?1 OFFSET ?2"#,
        )?;
        let rows = stmt.query_map(params![sql_count(count), sql_count(offset)], change_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Inserts or replaces a missing row.
    pub fn upsert_missing(&self, missing: &Missing) -> CoreResult<()> {
        let mut stmt = self.conn.prepare_cached(
            r#"INSERT INTO "Missing" VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               ON CONFLICT ("NodeInstance", "NodeIndex", "ChangeInstance", "ChangeIndex")
               DO UPDATE SET "HeadInstance" = excluded."HeadInstance",
                             "HeadIndex" = excluded."HeadIndex",
                             "StorageIndex" = excluded."StorageIndex""#,
        )?;
        stmt.execute(params![
            missing.id.node.instance.0,
            missing.id.node.index,
            missing.id.change.instance.0,
            missing.id.change.index,
            missing.head.map(|h| h.instance.0),
            missing.head.map(|h| h.index),
            missing.storage.map(|s| s.0),
        ])?;
        Ok(())
    }

    /// Looks up a missing row.
    pub fn get_missing(&self, id: GlobalChangeId) -> CoreResult<Option<Missing>> {
        let mut stmt = self.conn.prepare_cached(
            r#"SELECT * FROM "Missing"
               WHERE "NodeInstance" = ?1 AND "NodeIndex" = ?2
                 AND "ChangeInstance" = ?3 AND "ChangeIndex" = ?4"#,
        )?;
        Ok(stmt.query_row(key_params!(id), missing_from_row).optional()?)
    }

    /// Deletes a missing row. Returns true if a row was removed.
    pub fn delete_missing(&self, id: GlobalChangeId) -> CoreResult<bool> {
        let mut stmt = self.conn.prepare_cached(
            r#"DELETE FROM "Missing"
               WHERE "NodeInstance" = ?1 AND "NodeIndex" = ?2
                 AND "ChangeInstance" = ?3 AND "ChangeIndex" = ?4"#,
        )?;
        Ok(stmt.execute(key_params!(id))? > 0)
    }

    /// Lists missing rows in insertion order.
    pub fn list_missing(&self, offset: u64, count: u64) -> CoreResult<Vec<Missing>> {
        let mut stmt = self.conn.prepare_cached(
            r#"SELECT * FROM "Missing" ORDER BY rowid LIMIT ?1 OFFSET ?2"#,
        )?;
        let rows = stmt.query_map(params![sql_count(count), sql_count(offset)], missing_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Inserts or replaces a head row.
    pub fn upsert_head(&self, head: &Head) -> CoreResult<()> {
        let mut stmt = self.conn.prepare_cached(
            r#"INSERT INTO "Heads" VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
               ON CONFLICT ("NodeInstance", "NodeIndex", "ChangeInstance", "ChangeIndex")
               DO UPDATE SET "StorageIndex" = excluded."StorageIndex",
                             "Filename" = excluded."Filename",
                             "DirInstance" = excluded."DirInstance",
                             "DirIndex" = excluded."DirIndex",
                             "Writable" = excluded."Writable",
                             "Executable" = excluded."Executable",
                             "CreateTimestamp" = excluded."CreateTimestamp",
                             "ModifyTimestamp" = excluded."ModifyTimestamp""#,
        )?;
        stmt.execute(params![
            head.id.node.instance.0,
            head.id.node.index,
            head.id.change.instance.0,
            head.id.change.index,
            head.storage.map(|s| s.0),
            head.meta.filename,
            head.meta.dir.map(|d| d.instance.0),
            head.meta.dir.map(|d| d.index),
            head.meta.writable,
            head.meta.executable,
            head.created,
            head.modified,
        ])?;
        Ok(())
    }

    /// Looks up a head row.
    pub fn get_head(&self, id: GlobalChangeId) -> CoreResult<Option<Head>> {
        let mut stmt = self.conn.prepare_cached(
            r#"SELECT * FROM "Heads"
               WHERE "NodeInstance" = ?1 AND "NodeIndex" = ?2
                 AND "ChangeInstance" = ?3 AND "ChangeIndex" = ?4"#,
        )?;
        Ok(stmt.query_row(key_params!(id), head_from_row).optional()?)
    }

    /// Deletes a head row. Returns true if a row was removed.
    pub fn delete_head(&self, id: GlobalChangeId) -> CoreResult<bool> {
        let mut stmt = self.conn.prepare_cached(
            r#"DELETE FROM "Heads"
               WHERE "NodeInstance" = ?1 AND "NodeIndex" = ?2
                 AND "ChangeInstance" = ?3 AND "ChangeIndex" = ?4"#,
        )?;
        Ok(stmt.execute(key_params!(id))? > 0)
    }

    /// Lists heads in insertion order.
    pub fn list_heads(&self, offset: u64, count: u64) -> CoreResult<Vec<Head>> {
        let mut stmt = self.conn.prepare_cached(
            r#"SELECT * FROM "Heads" ORDER BY rowid LIMIT ?1 OFFSET ?2"#,
        )?;
        let rows = stmt.query_map(params![sql_count(count), sql_count(offset)], head_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Lists heads directly inside `dir`; `None` lists root-level entries.
    pub fn list_dir_heads(
        &self,
        dir: Option<NodeId>,
        offset: u64,
        count: u64,
    ) -> CoreResult<Vec<Head>> {
        let mut stmt = self.conn.prepare_cached(
            r#"SELECT * FROM "Heads"
               WHERE "DirInstance" IS ?1 AND "DirIndex" IS ?2
               ORDER BY rowid LIMIT ?3 OFFSET ?4"#,
        )?;
        let rows = stmt.query_map(
            params![
                dir.map(|d| d.instance.0),
                dir.map(|d| d.index),
                sql_count(count),
                sql_count(offset)
            ],
            head_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Inserts a storage row unless one exists.
    pub fn insert_storage(&self, id: StorageId, references: u64) -> CoreResult<()> {
        let mut stmt = self
            .conn
            .prepare_cached(r#"INSERT OR IGNORE INTO "Storage" VALUES (?1, ?2)"#)?;
        stmt.execute(params![id.0, references])?;
        Ok(())
    }

    /// Looks up a storage row.
    pub fn get_storage(&self, id: StorageId) -> CoreResult<Option<StorageRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached(r#"SELECT * FROM "Storage" WHERE "StorageIndex" = ?1"#)?;
        Ok(stmt.query_row(params![id.0], storage_from_row).optional()?)
    }

    /// Sets a storage row's reference count.
    pub fn set_references(&self, id: StorageId, references: u64) -> CoreResult<()> {
        let mut stmt = self.conn.prepare_cached(
            r#"UPDATE "Storage" SET "ReferenceCount" = ?2 WHERE "StorageIndex" = ?1"#,
        )?;
        stmt.execute(params![id.0, references])?;
        Ok(())
    }

    /// Deletes a storage row. Returns true if a row was removed.
    pub fn delete_storage(&self, id: StorageId) -> CoreResult<bool> {
        let mut stmt = self
            .conn
            .prepare_cached(r#"DELETE FROM "Storage" WHERE "StorageIndex" = ?1"#)?;
        Ok(stmt.execute(params![id.0])? > 0)
    }

    /// Lists storage rows in id order.
    pub fn list_storage(&self, offset: u64, count: u64) -> CoreResult<Vec<StorageRecord>> {
        let mut stmt = self.conn.prepare_cached(
            r#"SELECT * FROM "Storage" ORDER BY rowid LIMIT ?1 OFFSET ?2"#,
        )?;
        let rows = stmt.query_map(params![sql_count(count), sql_count(offset)], storage_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Counts heads and missing entries pointing at a storage id.
    pub fn count_references(&self, id: StorageId) -> CoreResult<u64> {
        let mut stmt = self.conn.prepare_cached(
            r#"SELECT (SELECT count(*) FROM "Heads" WHERE "StorageIndex" = ?1)
                    + (SELECT count(*) FROM "Missing" WHERE "StorageIndex" = ?1)"#,
        )?;
        Ok(stmt.query_row(params![id.0], |row| row.get(0))?)
    }

    /// Counts rows in every table.
    pub fn table_counts(&self) -> CoreResult<TableCounts> {
        let mut stmt = self.conn.prepare_cached(
            r#"SELECT (SELECT count(*) FROM "Instances"),
                      (SELECT count(*) FROM "Changes"),
                      (SELECT count(*) FROM "Heads"),
                      (SELECT count(*) FROM "Missing"),
                      (SELECT count(*) FROM "Storage")"#,
        )?;
        Ok(stmt.query_row([], |row| {
            Ok(TableCounts {
                instances: row.get(0)?,
                changes: row.get(1)?,
                heads: row.get(2)?,
                missing: row.get(3)?,
                storage: row.get(4)?,
            })
        })?)
    }
}

fn sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn key_at(row: &Row<'_>, start: usize) -> rusqlite::Result<GlobalChangeId> {
    Ok(GlobalChangeId::new(
        NodeId::new(InstanceId(row.get(start)?), row.get(start + 1)?),
        ChangeId::new(InstanceId(row.get(start + 2)?), row.get(start + 3)?),
    ))
}

fn pair_at(row: &Row<'_>, start: usize) -> rusqlite::Result<Option<(InstanceId, u64)>> {
    let instance: Option<u32> = row.get(start)?;
    let index: Option<u64> = row.get(start + 1)?;
    Ok(instance.zip(index).map(|(i, n)| (InstanceId(i), n)))
}

fn instance_from_row(row: &Row<'_>) -> rusqlite::Result<Instance> {
    Ok(Instance {
        id: InstanceId(row.get(0)?),
        name: row.get(1)?,
        unique: row.get(2)?,
    })
}

fn change_from_row(row: &Row<'_>) -> rusqlite::Result<Change> {
    Ok(Change {
        id: key_at(row, 0)?,
        parent: pair_at(row, 4)?.map(|(i, n)| ChangeId::new(i, n)),
    })
}

fn missing_from_row(row: &Row<'_>) -> rusqlite::Result<Missing> {
    Ok(Missing {
        id: key_at(row, 0)?,
        head: pair_at(row, 4)?.map(|(i, n)| ChangeId::new(i, n)),
        storage: row.get::<_, Option<u64>>(6)?.map(StorageId),
    })
}

fn head_from_row(row: &Row<'_>) -> rusqlite::Result<Head> {
    Ok(Head {
        id: key_at(row, 0)?,
        storage: row.get::<_, Option<u64>>(4)?.map(StorageId),
        meta: NodeMeta {
            filename: row.get(5)?,
            dir: pair_at(row, 6)?.map(|(i, n)| NodeId::new(i, n)),
            writable: row.get(8)?,
            executable: row.get(9)?,
        },
        created: row.get(10)?,
        modified: row.get(11)?,
    })
}

fn storage_from_row(row: &Row<'_>) -> rusqlite::Result<StorageRecord> {
    Ok(StorageRecord {
        id: StorageId(row.get(0)?),
        references: row.get(1)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn gid(node: u64, change: u64) -> GlobalChangeId {
        GlobalChangeId::new(
            NodeId::new(InstanceId(1), node),
            ChangeId::new(InstanceId(1), change),
        )
    }

    fn head(id: GlobalChangeId, storage: Option<u64>, dir: Option<NodeId>) -> Head {
        Head {
            id,
            storage: storage.map(StorageId),
            meta: NodeMeta {
                filename: format!("f{}", id.change.index),
                dir,
                writable: true,
                executable: false,
            },
            created: 10,
            modified: 20,
        }
    }

    #[test]
    fn fresh_stats() {
        let meta = MetadataStore::open_in_memory().unwrap();
        let stats = meta.stats().unwrap();
        assert_eq!(stats.version, SCHEMA_VERSION);
        assert_eq!(stats.fingerprint, "");
        assert_eq!(stats.primary_instance, None);
        assert_eq!(
            (stats.node_counter, stats.change_counter, stats.storage_counter),
            (1, 1, 1)
        );
    }

    #[test]
    fn counters_start_at_one_and_are_independent() {
        let meta = MetadataStore::open_in_memory().unwrap();
        assert_eq!(meta.take(Counter::Node).unwrap(), 1);
        assert_eq!(meta.take(Counter::Node).unwrap(), 2);
        assert_eq!(meta.take(Counter::Change).unwrap(), 1);
        assert_eq!(meta.take(Counter::Storage).unwrap(), 1);
        assert_eq!(meta.stats().unwrap().node_counter, 3);
    }

    #[test]
    fn instances_autoincrement() {
        let meta = MetadataStore::open_in_memory().unwrap();
        let a = meta.insert_instance("laptop", 7).unwrap();
        let b = meta.insert_instance("laptop", 8).unwrap();
        assert_eq!(a, InstanceId(1));
        assert_eq!(b, InstanceId(2));

        meta.set_environment("00112233aabbccdd", b).unwrap();
        let stats = meta.stats().unwrap();
        assert_eq!(stats.primary_instance, Some(b));
        assert_eq!(stats.fingerprint, "00112233aabbccdd");
        assert_eq!(meta.get_instance(a).unwrap().unwrap().unique, 7);
        assert_eq!(meta.list_instances().unwrap().len(), 2);
    }

    #[test]
    fn change_insert_is_idempotent() {
        let meta = MetadataStore::open_in_memory().unwrap();
        let change = Change {
            id: gid(1, 2),
            parent: Some(ChangeId::new(InstanceId(1), 1)),
        };
        assert!(meta.insert_change(&change).unwrap());
        assert!(!meta.insert_change(&change).unwrap());
        assert_eq!(meta.get_change(change.id).unwrap(), Some(change));
        assert_eq!(meta.list_changes(0, 10).unwrap(), vec![change]);
    }

    #[test]
    fn missing_upsert_keeps_position() {
        let meta = MetadataStore::open_in_memory().unwrap();
        let first = Missing {
            id: gid(1, 1),
            head: None,
            storage: None,
        };
        let second = Missing {
            id: gid(1, 2),
            head: None,
            storage: Some(StorageId(4)),
        };
        meta.upsert_missing(&first).unwrap();
        meta.upsert_missing(&second).unwrap();

        let updated = Missing {
            storage: Some(StorageId(9)),
            ..first
        };
        meta.upsert_missing(&updated).unwrap();
        assert_eq!(meta.list_missing(0, 10).unwrap(), vec![updated, second]);

        assert!(meta.delete_missing(first.id).unwrap());
        assert!(!meta.delete_missing(first.id).unwrap());
        assert_eq!(meta.get_missing(first.id).unwrap(), None);
    }

    #[test]
    fn head_round_trip_and_dir_listing() {
        let meta = MetadataStore::open_in_memory().unwrap();
        let dir = NodeId::new(InstanceId(1), 1);
        let root_entry = head(gid(1, 1), None, None);
        let file_a = head(gid(2, 2), Some(3), Some(dir));
        let file_b = head(gid(3, 3), Some(4), Some(dir));
        for h in [&root_entry, &file_a, &file_b] {
            meta.upsert_head(h).unwrap();
        }

        assert_eq!(meta.get_head(file_a.id).unwrap(), Some(file_a.clone()));
        assert_eq!(
            meta.list_dir_heads(None, 0, 10).unwrap(),
            vec![root_entry.clone()]
        );
        assert_eq!(
            meta.list_dir_heads(Some(dir), 0, 10).unwrap(),
            vec![file_a.clone(), file_b.clone()]
        );
        assert_eq!(meta.list_dir_heads(Some(dir), 1, 10).unwrap(), vec![file_b]);
        assert!(meta.delete_head(file_a.id).unwrap());
        assert_eq!(meta.list_heads(0, 10).unwrap().len(), 2);
    }

    #[test]
    fn storage_rows_and_reference_counting() {
        let meta = MetadataStore::open_in_memory().unwrap();
        meta.insert_storage(StorageId(5), 1).unwrap();
        meta.insert_storage(StorageId(5), 9).unwrap();
        assert_eq!(meta.get_storage(StorageId(5)).unwrap().unwrap().references, 1);

        meta.set_references(StorageId(5), 2).unwrap();
        assert_eq!(meta.get_storage(StorageId(5)).unwrap().unwrap().references, 2);

        meta.upsert_head(&head(gid(1, 1), Some(5), None)).unwrap();
        meta.upsert_missing(&Missing {
            id: gid(1, 2),
            head: Some(ChangeId::new(InstanceId(1), 1)),
            storage: Some(StorageId(5)),
        })
        .unwrap();
        assert_eq!(meta.count_references(StorageId(5)).unwrap(), 2);

        assert!(meta.delete_storage(StorageId(5)).unwrap());
        assert_eq!(meta.get_storage(StorageId(5)).unwrap(), None);
    }

    #[test]
    fn pagination_is_stable() {
        let meta = MetadataStore::open_in_memory().unwrap();
        for i in 1..=5 {
            meta.insert_storage(StorageId(i), 1).unwrap();
        }
        let page: Vec<u64> = meta
            .list_storage(2, 2)
            .unwrap()
            .into_iter()
            .map(|s| s.id.0)
            .collect();
        assert_eq!(page, vec![3, 4]);
        assert!(meta.list_storage(5, 2).unwrap().is_empty());
    }

    #[test]
    fn reopen_preserves_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coredb");
        {
            let meta = MetadataStore::open(&path).unwrap();
            meta.take(Counter::Change).unwrap();
            meta.insert_storage(StorageId(1), 3).unwrap();
        }
        let meta = MetadataStore::open(&path).unwrap();
        assert_eq!(meta.stats().unwrap().change_counter, 2);
        assert_eq!(meta.table_counts().unwrap().storage, 1);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coredb");
        {
            let meta = MetadataStore::open(&path).unwrap();
            meta.conn
                .execute(r#"UPDATE "Stats" SET "Version" = 99"#, [])
                .unwrap();
        }
        assert!(matches!(
            MetadataStore::open(&path),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn rollback_discards_changes() {
        let meta = MetadataStore::open_in_memory().unwrap();
        {
            let _tx = meta.begin().unwrap();
            meta.insert_storage(StorageId(1), 1).unwrap();
        }
        assert_eq!(meta.get_storage(StorageId(1)).unwrap(), None);

        let tx = meta.begin().unwrap();
        meta.insert_storage(StorageId(2), 1).unwrap();
        tx.commit().unwrap();
        assert!(meta.get_storage(StorageId(2)).unwrap().is_some());
    }
}
