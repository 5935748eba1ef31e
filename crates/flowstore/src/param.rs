use crate::db::{id_at, key, opt_id_at, Store};
use crate::error::{Result, StoreError};
use crate::list::{self, ListSchema, OrderedList};
use flowcore::Id;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Family of request parameters. Each kind keeps its own origin items and
/// overlay tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Header,
    Query,
    Form,
    UrlEncoded,
}

/// Table names backing one [`ParamKind`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct KindTables {
    pub items: &'static str,
    pub views: &'static str,
    pub order: &'static str,
    pub state: &'static str,
    pub delta: &'static str,
}

impl ParamKind {
    pub const ALL: [ParamKind; 4] = [
        ParamKind::Header,
        ParamKind::Query,
        ParamKind::Form,
        ParamKind::UrlEncoded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Header => "header",
            ParamKind::Query => "query",
            ParamKind::Form => "form",
            ParamKind::UrlEncoded => "urlencoded",
        }
    }

    pub(crate) fn tables(&self) -> KindTables {
        match self {
            ParamKind::Header => KindTables {
                items: "header_items",
                views: "header_views",
                order: "header_order",
                state: "header_state",
                delta: "header_delta",
            },
            ParamKind::Query => KindTables {
                items: "query_items",
                views: "query_views",
                order: "query_order",
                state: "query_state",
                delta: "query_delta",
            },
            ParamKind::Form => KindTables {
                items: "form_items",
                views: "form_views",
                order: "form_order",
                state: "form_state",
                delta: "form_delta",
            },
            ParamKind::UrlEncoded => KindTables {
                items: "urlencoded_items",
                views: "urlencoded_views",
                order: "urlencoded_order",
                state: "urlencoded_state",
                delta: "urlencoded_delta",
            },
        }
    }

    /// Origin items are ordered per example.
    pub fn schema(&self) -> ListSchema {
        ListSchema {
            table: self.tables().items,
            parent: "example_id",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ParamKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown parameter kind: {s}"))
    }
}

/// Editable fields of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamFields {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

impl ParamFields {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Self::default()
        }
    }
}

impl Default for ParamFields {
    fn default() -> Self {
        Self {
            key: String::new(),
            value: String::new(),
            description: String::new(),
            enabled: true,
        }
    }
}

/// Parameter of an origin example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamItem {
    pub id: Id,
    pub example_id: Id,
    #[serde(flatten)]
    pub fields: ParamFields,
    pub prev: Option<Id>,
    pub next: Option<Id>,
}

const COLUMNS: &str = "id, example_id, key, value, description, enabled, prev, next";

impl ParamItem {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: id_at(row, 0)?,
            example_id: id_at(row, 1)?,
            fields: ParamFields {
                key: row.get(2)?,
                value: row.get(3)?,
                description: row.get(4)?,
                enabled: row.get(5)?,
            },
            prev: opt_id_at(row, 6)?,
            next: opt_id_at(row, 7)?,
        })
    }
}

/// Origin items of one kind.
#[derive(Debug, Clone)]
pub struct Params {
    store: Store,
    kind: ParamKind,
    list: OrderedList,
}

impl Params {
    pub fn new(store: &Store, kind: ParamKind) -> Self {
        Self {
            store: store.clone(),
            kind,
            list: OrderedList::new(store.clone(), kind.schema()),
        }
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn ordered(&self) -> &OrderedList {
        &self.list
    }

    pub fn insert_at_tail(&self, example_id: Id, fields: ParamFields) -> Result<ParamItem> {
        let id = Id::now();
        let kind = self.kind;
        self.store.write("insert_at_tail", |tx| {
            tx.execute(
                &format!(
                    "INSERT INTO {} (id, example_id, key, value, description, enabled)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    kind.tables().items
                ),
                params![
                    key(&id),
                    key(&example_id),
                    fields.key,
                    fields.value,
                    fields.description,
                    fields.enabled
                ],
            )?;
            list::link_tail(tx, &kind.schema(), example_id, id)?;
            fetch(tx, kind, id)?.ok_or(StoreError::NotFound(id))
        })
    }

    pub fn get(&self, id: Id) -> Result<Option<ParamItem>> {
        self.store.read("get", |conn| fetch(conn, self.kind, id))
    }

    pub fn update(&self, id: Id, fields: &ParamFields) -> Result<()> {
        let kind = self.kind;
        self.store.write("update", |tx| {
            let changed = tx.execute(
                &format!(
                    "UPDATE {} SET key = ?2, value = ?3, description = ?4, enabled = ?5 WHERE id = ?1",
                    kind.tables().items
                ),
                params![
                    key(&id),
                    fields.key,
                    fields.value,
                    fields.description,
                    fields.enabled
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
    }

    /// Items of `example_id`, head to tail.
    pub fn list(&self, example_id: Id) -> Result<Vec<ParamItem>> {
        self.store.read("list", |conn| list_items(conn, self.kind, example_id))
    }

    pub fn delete(&self, id: Id) -> Result<()> {
        self.list.delete(id)
    }
}

pub(crate) fn fetch(conn: &Connection, kind: ParamKind, id: Id) -> Result<Option<ParamItem>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM {} WHERE id = ?1", kind.tables().items),
            [key(&id)],
            ParamItem::from_row,
        )
        .optional()?)
}

pub(crate) fn list_items(conn: &Connection, kind: ParamKind, example_id: Id) -> Result<Vec<ParamItem>> {
    let order = list::order(conn, &kind.schema(), example_id)?;
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {COLUMNS} FROM {} WHERE example_id = ?1",
        kind.tables().items
    ))?;
    let mut rows: HashMap<Id, ParamItem> = stmt
        .query_map([key(&example_id)], ParamItem::from_row)?
        .map(|r| r.map(|item| (item.id, item)))
        .collect::<rusqlite::Result<_>>()?;
    Ok(order.into_iter().filter_map(|id| rows.remove(&id)).collect())
}
