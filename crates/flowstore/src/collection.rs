use crate::db::{id_at, key, opt_id_at, Store};
use crate::error::{Result, StoreError};
use crate::list::{self, ListSchema, OrderedList};
use chrono::{DateTime, Utc};
use flowcore::Id;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const COLLECTIONS: ListSchema = ListSchema {
    table: "collections",
    parent: "workspace_id",
};

const COLUMNS: &str = "id, workspace_id, name, prev, next, updated";

/// Named collection, ordered within its workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: Id,
    pub workspace_id: Id,
    pub name: String,
    pub prev: Option<Id>,
    pub next: Option<Id>,
    pub updated: DateTime<Utc>,
}

impl Collection {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let updated: i64 = row.get(5)?;
        Ok(Self {
            id: id_at(row, 0)?,
            workspace_id: id_at(row, 1)?,
            name: row.get(2)?,
            prev: opt_id_at(row, 3)?,
            next: opt_id_at(row, 4)?,
            updated: DateTime::from_timestamp_millis(updated).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Collections {
    store: Store,
    list: OrderedList,
}

impl Collections {
    pub fn new(store: &Store) -> Self {
        Self {
            store: store.clone(),
            list: OrderedList::new(store.clone(), COLLECTIONS),
        }
    }

    /// Pointer operations (moves, reorder, verify) over collections.
    pub fn ordered(&self) -> &OrderedList {
        &self.list
    }

    /// Create a collection at the end of its workspace.
    pub fn insert_at_tail(&self, workspace_id: Id, name: impl Into<String>) -> Result<Collection> {
        let id = Id::now();
        let name = name.into();
        self.store.write("insert_at_tail", |tx| {
            tx.execute(
                "INSERT INTO collections (id, workspace_id, name, updated) VALUES (?1, ?2, ?3, ?4)",
                params![key(&id), key(&workspace_id), name, Utc::now().timestamp_millis()],
            )?;
            list::link_tail(tx, &COLLECTIONS, workspace_id, id)?;
            fetch(tx, id)?.ok_or(StoreError::NotFound(id))
        })
    }

    pub fn get(&self, id: Id) -> Result<Option<Collection>> {
        self.store.read("get", |conn| fetch(conn, id))
    }

    pub fn rename(&self, id: Id, name: &str) -> Result<()> {
        self.store.write("rename", |tx| {
            let changed = tx.execute(
                "UPDATE collections SET name = ?2, updated = ?3 WHERE id = ?1",
                params![key(&id), name, Utc::now().timestamp_millis()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
    }

    /// Collections of `workspace_id`, head to tail.
    pub fn list(&self, workspace_id: Id) -> Result<Vec<Collection>> {
        self.store.read("list", |conn| {
            let order = list::order(conn, &COLLECTIONS, workspace_id)?;
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {COLUMNS} FROM collections WHERE workspace_id = ?1"
            ))?;
            let mut rows: HashMap<Id, Collection> = stmt
                .query_map([key(&workspace_id)], Collection::from_row)?
                .map(|r| r.map(|c| (c.id, c)))
                .collect::<rusqlite::Result<_>>()?;
            Ok(order.into_iter().filter_map(|id| rows.remove(&id)).collect())
        })
    }

    /// Delete a collection, stitching its neighbours together.
    pub fn delete(&self, id: Id) -> Result<()> {
        self.list.delete(id)
    }
}

fn fetch(conn: &rusqlite::Connection, id: Id) -> Result<Option<Collection>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM collections WHERE id = ?1"),
            [key(&id)],
            Collection::from_row,
        )
        .optional()?)
}
