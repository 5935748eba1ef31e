//! Doubly-linked ordering of rows that share a parent.
//!
//! Order lives only in the `prev`/`next` pointers of each row; a position
//! is the index reached by walking `next` from the unique head. Entity
//! stores own their tables and call into this module to link, unlink and
//! traverse rows.

mod verify;

pub use verify::{ListProblem, ListReport};

use crate::db::{id_at, key, opt_id_at, Store};
use crate::error::{Result, StoreError};
use flowcore::Id;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use verify::Link;

/// Table holding an ordered entity and the column naming its parent.
///
/// The table must have `id`, `prev` and `next` BLOB columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListSchema {
    pub table: &'static str,
    pub parent: &'static str,
}

/// Requested index of one item in a batch reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub id: Id,
    pub index: usize,
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Before,
    After,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    parent: Id,
    link: Link,
}

/// Ordering operations for one [`ListSchema`].
#[derive(Debug, Clone)]
pub struct OrderedList {
    store: Store,
    schema: ListSchema,
}

impl OrderedList {
    pub fn new(store: Store, schema: ListSchema) -> Self {
        Self { store, schema }
    }

    pub fn schema(&self) -> ListSchema {
        self.schema
    }

    /// Ids of `parent`'s rows, head to tail.
    pub fn list(&self, parent: Id) -> Result<Vec<Id>> {
        self.store.read("list", |conn| order(conn, &self.schema, parent))
    }

    /// Index of the last row, or -1 for an empty parent.
    pub fn get_max_position(&self, parent: Id) -> Result<i64> {
        self.store.read("get_max_position", |conn| {
            Ok(count(conn, &self.schema, parent)? - 1)
        })
    }

    pub fn move_after(&self, item: Id, target: Id) -> Result<()> {
        self.relocate("move_after", item, target, Side::After)
    }

    pub fn move_before(&self, item: Id, target: Id) -> Result<()> {
        self.relocate("move_before", item, target, Side::Before)
    }

    fn relocate(&self, op: &'static str, item: Id, target: Id, side: Side) -> Result<()> {
        if item == target {
            return Err(StoreError::SelfMove(item));
        }
        let schema = &self.schema;
        self.store.write(op, |tx| {
            let moving = entry(tx, schema, item)?.ok_or(StoreError::NotFound(item))?;
            let anchor = entry(tx, schema, target)?.ok_or(StoreError::NotFound(target))?;
            if moving.parent != anchor.parent {
                return Err(StoreError::CrossParent { item, target });
            }
            let in_place = match side {
                Side::After => anchor.link.next == Some(item),
                Side::Before => anchor.link.prev == Some(item),
            };
            if in_place {
                tracing::debug!("{} {} already in place next to {}", op, item, target);
                return Ok(());
            }

            let parent = moving.parent;
            unlink(tx, schema, parent, &moving.link)?;
            // Target pointers may have changed if it was a neighbour.
            let anchor = entry(tx, schema, target)?.ok_or(StoreError::NotFound(target))?;
            let (prev, next) = match side {
                Side::After => (Some(target), anchor.link.next),
                Side::Before => (anchor.link.prev, Some(target)),
            };
            set_links(tx, schema, parent, item, prev, next)?;
            if let Some(prev) = prev {
                set_pointer(tx, schema, parent, prev, "next", Some(item))?;
            }
            if let Some(next) = next {
                set_pointer(tx, schema, parent, next, "prev", Some(item))?;
            }
            tracing::debug!("{} {} -> {} in {}", op, item, target, parent);
            Ok(())
        })
    }

    /// Replace the whole order of `parent`. `ids` must be a permutation of
    /// the parent's current rows.
    pub fn reorder(&self, parent: Id, ids: &[Id]) -> Result<()> {
        let schema = &self.schema;
        self.store.write("reorder", |tx| {
            check_permutation(tx, schema, parent, ids)?;
            write_order(tx, schema, parent, ids)?;
            tracing::debug!("Reordered {} rows of {}", ids.len(), parent);
            Ok(())
        })
    }

    /// Rewrite pointers from the best-effort traversal order. Safe to run on
    /// any parent, healthy or not.
    pub fn compact(&self, parent: Id) -> Result<()> {
        let schema = &self.schema;
        self.store.write("compact", |tx| {
            let links = links(tx, schema, parent)?;
            let order = verify::repair_order(&links);
            write_order(tx, schema, parent, &order)?;
            tracing::debug!("Compacted {} rows of {}", order.len(), parent);
            Ok(())
        })
    }

    /// Place `item` at `index`, shifting the rows after it.
    pub fn update_position(&self, item: Id, index: usize) -> Result<()> {
        let schema = &self.schema;
        self.store.write("update_position", |tx| {
            let moving = entry(tx, schema, item)?.ok_or(StoreError::NotFound(item))?;
            let mut ids = order(tx, schema, moving.parent)?;
            if index >= ids.len() {
                return Err(StoreError::PositionOutOfRange {
                    index,
                    len: ids.len(),
                });
            }
            ids.retain(|id| *id != item);
            ids.insert(index, item);
            write_order(tx, schema, moving.parent, &ids)
        })
    }

    /// Batch form of [`update_position`](Self::update_position). The batch
    /// is a full replacement: it must name every row of the parent exactly
    /// once, with indexes `0..len`.
    pub fn update_positions(&self, positions: &[Position]) -> Result<()> {
        let Some(first) = positions.first() else {
            return Ok(());
        };
        let schema = &self.schema;
        self.store.write("update_positions", |tx| {
            let parent = entry(tx, schema, first.id)?
                .ok_or(StoreError::NotFound(first.id))?
                .parent;
            let mut slots: Vec<Option<Id>> = vec![None; positions.len()];
            for position in positions {
                match slots.get_mut(position.index) {
                    Some(slot) if slot.is_none() => *slot = Some(position.id),
                    _ => return Err(StoreError::SetMismatch { parent }),
                }
            }
            let ids: Vec<Id> = slots.into_iter().flatten().collect();
            check_permutation(tx, schema, parent, &ids)?;
            write_order(tx, schema, parent, &ids)
        })
    }

    /// Unlink `item` from its list, stitching its neighbours, and delete
    /// its row.
    pub fn delete(&self, item: Id) -> Result<()> {
        let schema = &self.schema;
        self.store.write("delete", |tx| remove(tx, schema, item))
    }

    /// Walk `parent`'s pointers and report every inconsistency found.
    pub fn verify(&self, parent: Id) -> Result<ListReport> {
        let report = self.store.read("verify", |conn| {
            Ok(verify::inspect(&links(conn, &self.schema, parent)?))
        })?;
        if !report.is_ok() {
            tracing::warn!(
                "{} list of {} has {} problem(s): {:?}",
                self.schema.table,
                parent,
                report.problems.len(),
                report.problems
            );
        }
        Ok(report)
    }
}

fn count(conn: &Connection, schema: &ListSchema, parent: Id) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} = ?1",
        schema.table, schema.parent
    );
    Ok(conn.query_row(&sql, [key(&parent)], |row| row.get(0))?)
}

fn entry(conn: &Connection, schema: &ListSchema, id: Id) -> Result<Option<Entry>> {
    let sql = format!(
        "SELECT {}, prev, next FROM {} WHERE id = ?1",
        schema.parent, schema.table
    );
    Ok(conn
        .query_row(&sql, [key(&id)], |row| {
            Ok(Entry {
                parent: id_at(row, 0)?,
                link: Link {
                    id,
                    prev: opt_id_at(row, 1)?,
                    next: opt_id_at(row, 2)?,
                },
            })
        })
        .optional()?)
}

fn links(conn: &Connection, schema: &ListSchema, parent: Id) -> Result<Vec<Link>> {
    let sql = format!(
        "SELECT id, prev, next FROM {} WHERE {} = ?1",
        schema.table, schema.parent
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map([key(&parent)], |row| {
        Ok(Link {
            id: id_at(row, 0)?,
            prev: opt_id_at(row, 1)?,
            next: opt_id_at(row, 2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Strict head-to-tail traversal. Fails with `BrokenList` unless the walk
/// from the single head visits every row of the parent exactly once.
pub(crate) fn order(conn: &Connection, schema: &ListSchema, parent: Id) -> Result<Vec<Id>> {
    let total = count(conn, schema, parent)?;
    if total == 0 {
        return Ok(Vec::new());
    }
    let heads_sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} = ?1 AND prev IS NULL",
        schema.table, schema.parent
    );
    let heads: i64 = conn.query_row(&heads_sql, [key(&parent)], |row| row.get(0))?;
    if heads != 1 {
        return Err(StoreError::BrokenList {
            parent,
            reason: format!("{heads} head rows"),
        });
    }

    // Bounded by the row count so a cycle ends the recursion.
    let sql = format!(
        "WITH RECURSIVE chain(id, next, pos) AS (
            SELECT id, next, 0 FROM {t} WHERE {p} = ?1 AND prev IS NULL
            UNION ALL
            SELECT item.id, item.next, chain.pos + 1
            FROM {t} AS item JOIN chain ON item.id = chain.next
            WHERE item.{p} = ?1 AND chain.pos < ?2
        )
        SELECT id FROM chain ORDER BY pos",
        t = schema.table,
        p = schema.parent
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let ids = stmt
        .query_map(params![key(&parent), total], |row| id_at(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if ids.len() as i64 != total {
        return Err(StoreError::BrokenList {
            parent,
            reason: format!("traversal reached {} of {} rows", ids.len(), total),
        });
    }
    Ok(ids)
}

/// Link a freshly inserted row (both pointers null) after the current tail.
pub(crate) fn link_tail(conn: &Connection, schema: &ListSchema, parent: Id, id: Id) -> Result<()> {
    let sql = format!(
        "SELECT id FROM {} WHERE {} = ?1 AND next IS NULL AND id != ?2",
        schema.table, schema.parent
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let tails = stmt
        .query_map([key(&parent), key(&id)], |row| id_at(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    match tails.as_slice() {
        [] if count(conn, schema, parent)? > 1 => Err(StoreError::BrokenList {
            parent,
            reason: "no tail row".to_string(),
        }),
        [] => Ok(()),
        [tail] => {
            set_pointer(conn, schema, parent, id, "prev", Some(*tail))?;
            set_pointer(conn, schema, parent, *tail, "next", Some(id))
        }
        many => Err(StoreError::BrokenList {
            parent,
            reason: format!("{} tail rows", many.len()),
        }),
    }
}

/// Unlink and delete one row.
pub(crate) fn remove(conn: &Connection, schema: &ListSchema, id: Id) -> Result<()> {
    let entry = entry(conn, schema, id)?.ok_or(StoreError::NotFound(id))?;
    unlink(conn, schema, entry.parent, &entry.link)?;
    conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", schema.table),
        [key(&id)],
    )?;
    tracing::debug!("Removed {} from {} of {}", id, schema.table, entry.parent);
    Ok(())
}

fn unlink(conn: &Connection, schema: &ListSchema, parent: Id, link: &Link) -> Result<()> {
    if let Some(prev) = link.prev {
        set_pointer(conn, schema, parent, prev, "next", link.next)?;
    }
    if let Some(next) = link.next {
        set_pointer(conn, schema, parent, next, "prev", link.prev)?;
    }
    set_links(conn, schema, parent, link.id, None, None)
}

fn set_pointer(
    conn: &Connection,
    schema: &ListSchema,
    parent: Id,
    id: Id,
    column: &'static str,
    value: Option<Id>,
) -> Result<()> {
    let sql = format!(
        "UPDATE {} SET {} = ?2 WHERE id = ?1 AND {} = ?3",
        schema.table, column, schema.parent
    );
    let changed = conn.execute(
        &sql,
        params![key(&id), value.as_ref().map(key), key(&parent)],
    )?;
    if changed == 0 {
        return Err(StoreError::BrokenList {
            parent,
            reason: format!("pointer to missing row {id}"),
        });
    }
    Ok(())
}

fn set_links(
    conn: &Connection,
    schema: &ListSchema,
    parent: Id,
    id: Id,
    prev: Option<Id>,
    next: Option<Id>,
) -> Result<()> {
    let sql = format!(
        "UPDATE {} SET prev = ?2, next = ?3 WHERE id = ?1 AND {} = ?4",
        schema.table, schema.parent
    );
    let changed = conn.execute(
        &sql,
        params![
            key(&id),
            prev.as_ref().map(key),
            next.as_ref().map(key),
            key(&parent)
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(id));
    }
    Ok(())
}

fn check_permutation(conn: &Connection, schema: &ListSchema, parent: Id, ids: &[Id]) -> Result<()> {
    let current: HashSet<Id> = links(conn, schema, parent)?.into_iter().map(|l| l.id).collect();
    let given: HashSet<Id> = ids.iter().copied().collect();
    if given.len() != ids.len() || current != given {
        return Err(StoreError::SetMismatch { parent });
    }
    Ok(())
}

fn write_order(conn: &Connection, schema: &ListSchema, parent: Id, ids: &[Id]) -> Result<()> {
    for (i, id) in ids.iter().enumerate() {
        let prev = i.checked_sub(1).map(|p| ids[p]);
        let next = ids.get(i + 1).copied();
        set_links(conn, schema, parent, *id, prev, next)?;
    }
    Ok(())
}
