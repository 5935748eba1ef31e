//! SQLite connection handling and schema.
//!
//! A [`Store`] is a cloneable handle on one connection. Every mutation runs
//! inside an `IMMEDIATE` transaction, so the write lock is taken up front and
//! a competing writer on another connection surfaces as
//! [`StoreError::WriteConflict`] once the busy timeout elapses.

use crate::error::{Result, StoreError};
use crate::param::ParamKind;
use flowcore::Id;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Connection settings for file-backed stores.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long a writer waits for the database lock before giving up
    pub busy_timeout: Duration,
    /// Use the write-ahead log so readers are not blocked by writers
    pub journal_wal: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            journal_wal: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) a database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| StoreError::from(e).with_op("open"))?;
        conn.busy_timeout(config.busy_timeout)
            .map_err(|e| StoreError::from(e).with_op("open"))?;
        if config.journal_wal {
            let mode: String = conn
                .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
                .map_err(|e| StoreError::from(e).with_op("open"))?;
            tracing::debug!("Opened {} with journal mode {}", path.display(), mode);
        }
        Self::init(conn)
    }

    /// Private database that lives as long as the handle, for tests and
    /// throwaway runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::from(e).with_op("open"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(&schema())
            .map_err(|e| StoreError::from(e).with_op("migrate"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a transaction open:
        // an uncommitted `Transaction` rolls back on drop.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run a non-transactional read.
    pub(crate) fn read<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let conn = self.lock();
        f(&conn).map_err(|e| e.with_op(op))
    }

    /// Run `f` in one immediate transaction; commits only if `f` succeeds.
    pub(crate) fn write<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StoreError::from(e).with_op(op))?;
        let out = f(&tx).map_err(|e| e.with_op(op))?;
        tx.commit().map_err(|e| StoreError::from(e).with_op(op))?;
        Ok(out)
    }
}

fn schema() -> String {
    let mut sql = String::from(
        "CREATE TABLE IF NOT EXISTS collections (
            id BLOB PRIMARY KEY,
            workspace_id BLOB NOT NULL,
            name TEXT NOT NULL,
            prev BLOB,
            next BLOB,
            updated INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_collections_workspace ON collections(workspace_id);
        CREATE INDEX IF NOT EXISTS idx_collections_prev ON collections(workspace_id, prev);
        ",
    );
    for kind in ParamKind::ALL {
        let t = kind.tables();
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {items} (
                id BLOB PRIMARY KEY,
                example_id BLOB NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                description TEXT NOT NULL,
                enabled INTEGER NOT NULL,
                prev BLOB,
                next BLOB
            );
            CREATE INDEX IF NOT EXISTS idx_{items}_example ON {items}(example_id);
            CREATE INDEX IF NOT EXISTS idx_{items}_prev ON {items}(example_id, prev);
            CREATE TABLE IF NOT EXISTS {views} (
                view_id BLOB PRIMARY KEY,
                origin_id BLOB,
                revision INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS {order} (
                view_id BLOB NOT NULL,
                ref_kind TEXT NOT NULL,
                ref_id BLOB NOT NULL,
                rank TEXT NOT NULL,
                revision INTEGER NOT NULL,
                PRIMARY KEY (view_id, ref_kind, ref_id)
            );
            CREATE INDEX IF NOT EXISTS idx_{order}_rank ON {order}(view_id, rank);
            CREATE INDEX IF NOT EXISTS idx_{order}_ref ON {order}(ref_id);
            CREATE TABLE IF NOT EXISTS {state} (
                view_id BLOB NOT NULL,
                ref_id BLOB NOT NULL,
                suppressed INTEGER NOT NULL DEFAULT 0,
                key TEXT,
                value TEXT,
                description TEXT,
                enabled INTEGER,
                PRIMARY KEY (view_id, ref_id)
            );
            CREATE TABLE IF NOT EXISTS {delta} (
                view_id BLOB NOT NULL,
                ref_id BLOB NOT NULL,
                key TEXT NOT NULL DEFAULT '',
                value TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                enabled INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (view_id, ref_id)
            );
            CREATE INDEX IF NOT EXISTS idx_{delta}_ref ON {delta}(ref_id);
            ",
            items = t.items,
            views = t.views,
            order = t.order,
            state = t.state,
            delta = t.delta,
        ));
    }
    sql
}

#[derive(Debug, thiserror::Error)]
#[error("expected a 16-byte id, found {0} bytes")]
struct BadId(usize);

/// Bind form of an id.
pub(crate) fn key(id: &Id) -> &[u8] {
    id.as_bytes()
}

pub(crate) fn id_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Id> {
    let bytes: Vec<u8> = row.get(idx)?;
    Id::from_slice(&bytes).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Blob,
            Box::new(BadId(bytes.len())),
        )
    })
}

pub(crate) fn opt_id_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Id>> {
    let bytes: Option<Vec<u8>> = row.get(idx)?;
    match bytes {
        None => Ok(None),
        Some(bytes) => Id::from_slice(&bytes).map(Some).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Blob,
                Box::new(BadId(bytes.len())),
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let store = Store::in_memory().unwrap();
        store
            .read("migrate", |conn| Ok(conn.execute_batch(&schema())?))
            .unwrap();
    }

    #[test]
    fn failed_write_rolls_back() {
        let store = Store::in_memory().unwrap();
        let id = Id::now();
        let result: Result<()> = store.write("test", |tx| {
            tx.execute(
                "INSERT INTO collections (id, workspace_id, name, updated) VALUES (?1, ?1, 'x', 0)",
                [key(&id)],
            )?;
            Err(StoreError::NotFound(id))
        });
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        let count: i64 = store
            .read("count", |conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM collections", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }
}
