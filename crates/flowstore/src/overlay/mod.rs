//! Per-view overlay of parameter items.
//!
//! A view (delta example) shows the items of its origin example in its own
//! order, with per-field overrides, suppressed origin items and items of its
//! own. Order rows carry a rank; listing walks them in rank order and
//! resolves each to an origin item (plus overrides) or a delta item.

mod merge;
pub mod rank;

pub use merge::{ItemSource, OverlayItem, ParamPatch};

use crate::db::{id_at, key, opt_id_at, Store};
use crate::error::{Result, StoreError};
use crate::param::{self, KindTables, ParamFields, ParamKind};
use flowcore::Id;
use merge::StateRow;
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefKind {
    Origin,
    Delta,
}

impl RefKind {
    fn as_str(&self) -> &'static str {
        match self {
            RefKind::Origin => "origin",
            RefKind::Delta => "delta",
        }
    }

    fn parse(s: &str) -> rusqlite::Result<Self> {
        match s {
            "origin" => Ok(RefKind::Origin),
            "delta" => Ok(RefKind::Delta),
            other => Err(rusqlite::Error::InvalidColumnType(
                1,
                format!("ref_kind '{other}'"),
                rusqlite::types::Type::Text,
            )),
        }
    }
}

#[derive(Debug, Clone)]
struct OrderRow {
    kind: RefKind,
    ref_id: Id,
    rank: String,
}

/// Overlay operations for one parameter kind.
#[derive(Debug, Clone)]
pub struct Overlay {
    store: Store,
    kind: ParamKind,
}

impl Overlay {
    pub fn new(store: &Store, kind: ParamKind) -> Self {
        Self {
            store: store.clone(),
            kind,
        }
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    /// Give every visible origin item of `origin` an order row in `view`.
    /// Items already ordered or suppressed are left alone, so repeated calls
    /// only pick up origin items added since the last one.
    pub fn ensure_seeded(&self, view: Id, origin: Id) -> Result<()> {
        self.store
            .write("ensure_seeded", |tx| seed(tx, self.kind, view, origin))
    }

    /// Merged items of `view` in rank order.
    pub fn list(&self, view: Id, origin: Id) -> Result<Vec<OverlayItem>> {
        let kind = self.kind;
        self.store.write("list", |tx| {
            seed(tx, kind, view, origin)?;
            let mut items = Vec::new();
            for row in order_rows(tx, kind.tables(), view)? {
                if let Some(item) = resolve(tx, kind, view, origin, &row)? {
                    items.push(item);
                }
            }
            Ok(items)
        })
    }

    /// Merged form of one item, or `None` when it is hidden in `view`.
    pub fn get(&self, view: Id, origin: Id, item: Id) -> Result<Option<OverlayItem>> {
        let kind = self.kind;
        self.store.write("get", |tx| {
            seed(tx, kind, view, origin)?;
            match order_row(tx, kind.tables(), view, item)? {
                Some(row) => resolve(tx, kind, view, origin, &row),
                None => Ok(None),
            }
        })
    }

    /// Add a blank view-local item at the end of `view`.
    pub fn create_delta(&self, view: Id) -> Result<Id> {
        let t = self.kind.tables();
        self.store.write("create_delta", |tx| {
            let id = Id::now();
            touch_view(tx, t, view)?;
            tx.execute(
                &format!("INSERT INTO {} (view_id, ref_id) VALUES (?1, ?2)", t.delta),
                [key(&view), key(&id)],
            )?;
            append(tx, t, view, RefKind::Delta, id)?;
            tracing::debug!("Created delta {} in {} view {}", id, self.kind, view);
            Ok(id)
        })
    }

    /// Apply `patch` to a delta item, or record it as overrides of an origin
    /// item.
    pub fn update(&self, view: Id, item: Id, patch: &ParamPatch) -> Result<()> {
        let kind = self.kind;
        let t = kind.tables();
        self.store.write("update", |tx| {
            if delta_fields(tx, t, view, item)?.is_some() {
                tx.execute(
                    &format!(
                        "UPDATE {} SET key = COALESCE(?3, key), value = COALESCE(?4, value),
                         description = COALESCE(?5, description), enabled = COALESCE(?6, enabled)
                         WHERE view_id = ?1 AND ref_id = ?2",
                        t.delta
                    ),
                    params![
                        key(&view),
                        key(&item),
                        patch.key,
                        patch.value,
                        patch.description,
                        patch.enabled
                    ],
                )?;
            } else if origin_known(tx, kind, view, item)? {
                tx.execute(
                    &format!(
                        "INSERT INTO {} (view_id, ref_id, key, value, description, enabled)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                         ON CONFLICT (view_id, ref_id) DO UPDATE SET
                            key = COALESCE(excluded.key, key),
                            value = COALESCE(excluded.value, value),
                            description = COALESCE(excluded.description, description),
                            enabled = COALESCE(excluded.enabled, enabled)",
                        t.state
                    ),
                    params![
                        key(&view),
                        key(&item),
                        patch.key,
                        patch.value,
                        patch.description,
                        patch.enabled
                    ],
                )?;
            } else {
                return Err(StoreError::UnknownItem(item));
            }
            tracing::debug!("Updated {} in view {}", item, view);
            Ok(())
        })
    }

    /// Move `item` directly after (or before) `target` in `view`.
    pub fn move_item(&self, view: Id, origin: Id, item: Id, target: Id, after: bool) -> Result<()> {
        if item == target {
            return Err(StoreError::SelfMove(item));
        }
        let kind = self.kind;
        let t = kind.tables();
        self.store.write("move", |tx| {
            seed(tx, kind, view, origin)?;
            if order_row(tx, t, view, item)?.is_none() {
                return Err(StoreError::UnknownItem(item));
            }
            if order_row(tx, t, view, target)?.is_none() {
                return Err(StoreError::UnknownItem(target));
            }
            let rank = match slot_rank(tx, t, view, item, target, after)? {
                Some(rank) => rank,
                None => {
                    rerank(tx, t, view)?;
                    slot_rank(tx, t, view, item, target, after)?
                        .ok_or(StoreError::RankExhausted { view })?
                }
            };
            let revision = bump_revision(tx, t, view)?;
            tx.execute(
                &format!(
                    "UPDATE {} SET rank = ?3, revision = ?4 WHERE view_id = ?1 AND ref_id = ?2",
                    t.order
                ),
                params![key(&view), key(&item), rank, revision],
            )?;
            tracing::debug!(
                "Moved {} {} {} in view {} (revision {})",
                item,
                if after { "after" } else { "before" },
                target,
                view,
                revision
            );
            Ok(())
        })
    }

    /// Drop a delta item, or suppress an origin item in `view`.
    pub fn delete(&self, view: Id, item: Id) -> Result<()> {
        let kind = self.kind;
        let t = kind.tables();
        self.store.write("delete", |tx| {
            if delta_fields(tx, t, view, item)?.is_some() {
                tx.execute(
                    &format!("DELETE FROM {} WHERE view_id = ?1 AND ref_id = ?2", t.delta),
                    [key(&view), key(&item)],
                )?;
            } else if origin_known(tx, kind, view, item)? {
                tx.execute(
                    &format!(
                        "INSERT INTO {} (view_id, ref_id, suppressed) VALUES (?1, ?2, 1)
                         ON CONFLICT (view_id, ref_id) DO UPDATE SET suppressed = 1",
                        t.state
                    ),
                    [key(&view), key(&item)],
                )?;
            } else {
                return Err(StoreError::UnknownItem(item));
            }
            tx.execute(
                &format!("DELETE FROM {} WHERE view_id = ?1 AND ref_id = ?2", t.order),
                [key(&view), key(&item)],
            )?;
            tracing::debug!("Deleted {} from view {}", item, view);
            Ok(())
        })
    }

    /// Blank a delta item, or drop every override of an origin item. A
    /// suppressed origin item stays suppressed.
    pub fn reset(&self, view: Id, item: Id) -> Result<()> {
        let kind = self.kind;
        let t = kind.tables();
        self.store.write("reset", |tx| {
            if delta_fields(tx, t, view, item)?.is_some() {
                let blank = ParamFields::default();
                tx.execute(
                    &format!(
                        "UPDATE {} SET key = ?3, value = ?4, description = ?5, enabled = ?6
                         WHERE view_id = ?1 AND ref_id = ?2",
                        t.delta
                    ),
                    params![
                        key(&view),
                        key(&item),
                        blank.key,
                        blank.value,
                        blank.description,
                        blank.enabled
                    ],
                )?;
            } else if origin_known(tx, kind, view, item)? {
                tx.execute(
                    &format!(
                        "UPDATE {} SET key = NULL, value = NULL, description = NULL, enabled = NULL
                         WHERE view_id = ?1 AND ref_id = ?2",
                        t.state
                    ),
                    [key(&view), key(&item)],
                )?;
            } else {
                return Err(StoreError::UnknownItem(item));
            }
            Ok(())
        })
    }

    /// Bring a suppressed origin item back, at the end of `view` if it has
    /// no order row. Overrides survive.
    pub fn undelete(&self, view: Id, item: Id) -> Result<()> {
        let kind = self.kind;
        let t = kind.tables();
        self.store.write("undelete", |tx| {
            let ref_kind = if delta_fields(tx, t, view, item)?.is_some() {
                RefKind::Delta
            } else if origin_known(tx, kind, view, item)? {
                tx.execute(
                    &format!(
                        "UPDATE {} SET suppressed = 0 WHERE view_id = ?1 AND ref_id = ?2",
                        t.state
                    ),
                    [key(&view), key(&item)],
                )?;
                RefKind::Origin
            } else {
                return Err(StoreError::UnknownItem(item));
            };
            if order_row(tx, t, view, item)?.is_none() {
                touch_view(tx, t, view)?;
                append(tx, t, view, ref_kind, item)?;
            }
            Ok(())
        })
    }

    /// View that owns `item`: the view of a delta item, otherwise the first
    /// view ordering it.
    pub fn resolve_view(&self, item: Id) -> Result<Option<Id>> {
        let t = self.kind.tables();
        self.store.read("resolve_view", |conn| {
            let delta = conn
                .query_row(
                    &format!("SELECT view_id FROM {} WHERE ref_id = ?1", t.delta),
                    [key(&item)],
                    |row| id_at(row, 0),
                )
                .optional()?;
            if delta.is_some() {
                return Ok(delta);
            }
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT view_id FROM {} WHERE ref_id = ?1 ORDER BY view_id LIMIT 1",
                        t.order
                    ),
                    [key(&item)],
                    |row| id_at(row, 0),
                )
                .optional()?)
        })
    }

    /// Revision of `view`'s ordering; 0 until the first move.
    pub fn revision(&self, view: Id) -> Result<i64> {
        let t = self.kind.tables();
        self.store.read("revision", |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT revision FROM {} WHERE view_id = ?1", t.views),
                    [key(&view)],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0))
        })
    }
}

fn seed(conn: &Connection, kind: ParamKind, view: Id, origin: Id) -> Result<()> {
    let t = kind.tables();
    bind_origin(conn, t, view, origin)?;
    let mut seeded = 0;
    for item in param::list_items(conn, kind, origin)? {
        if order_row(conn, t, view, item.id)?.is_some() {
            continue;
        }
        if state(conn, t, view, item.id)?.is_some_and(|s| s.suppressed) {
            continue;
        }
        append(conn, t, view, RefKind::Origin, item.id)?;
        seeded += 1;
    }
    if seeded > 0 {
        tracing::debug!("Seeded {} {} item(s) into view {}", seeded, kind, view);
    }
    Ok(())
}

fn resolve(
    conn: &Connection,
    kind: ParamKind,
    view: Id,
    origin: Id,
    row: &OrderRow,
) -> Result<Option<OverlayItem>> {
    let t = kind.tables();
    match row.kind {
        RefKind::Origin => {
            let item = param::fetch(conn, kind, row.ref_id)?.filter(|i| i.example_id == origin);
            match item {
                Some(item) => Ok(merge::coalesce(&item, state(conn, t, view, row.ref_id)?.as_ref())),
                None => {
                    tracing::warn!(
                        "Skipping dangling origin ref {} in {} view {}",
                        row.ref_id,
                        kind,
                        view
                    );
                    Ok(None)
                }
            }
        }
        RefKind::Delta => match delta_fields(conn, t, view, row.ref_id)? {
            Some(fields) => Ok(Some(OverlayItem {
                id: row.ref_id,
                source: ItemSource::Delta,
                fields,
            })),
            None => {
                tracing::warn!(
                    "Skipping dangling delta ref {} in {} view {}",
                    row.ref_id,
                    kind,
                    view
                );
                Ok(None)
            }
        },
    }
}

/// Known as an origin item in this view, even if currently hidden. Items of
/// any other example are not. A view not yet bound to an origin is bound to
/// the item's example.
fn origin_known(conn: &Connection, kind: ParamKind, view: Id, item: Id) -> Result<bool> {
    let t = kind.tables();
    if order_row(conn, t, view, item)?.is_some_and(|r| r.kind == RefKind::Origin)
        || state(conn, t, view, item)?.is_some()
    {
        return Ok(true);
    }
    let Some(found) = param::fetch(conn, kind, item)? else {
        return Ok(false);
    };
    match view_origin(conn, t, view)? {
        Some(origin) => Ok(found.example_id == origin),
        None => {
            bind_origin(conn, t, view, found.example_id)?;
            Ok(true)
        }
    }
}

fn touch_view(conn: &Connection, t: KindTables, view: Id) -> Result<()> {
    conn.execute(
        &format!("INSERT OR IGNORE INTO {} (view_id) VALUES (?1)", t.views),
        [key(&view)],
    )?;
    Ok(())
}

/// Record `origin` as the view's origin unless it already has one.
fn bind_origin(conn: &Connection, t: KindTables, view: Id, origin: Id) -> Result<()> {
    touch_view(conn, t, view)?;
    conn.execute(
        &format!(
            "UPDATE {} SET origin_id = ?2 WHERE view_id = ?1 AND origin_id IS NULL",
            t.views
        ),
        [key(&view), key(&origin)],
    )?;
    Ok(())
}

fn view_origin(conn: &Connection, t: KindTables, view: Id) -> Result<Option<Id>> {
    Ok(conn
        .query_row(
            &format!("SELECT origin_id FROM {} WHERE view_id = ?1", t.views),
            [key(&view)],
            |row| opt_id_at(row, 0),
        )
        .optional()?
        .flatten())
}

fn current_revision(conn: &Connection, t: KindTables, view: Id) -> Result<i64> {
    Ok(conn
        .query_row(
            &format!("SELECT revision FROM {} WHERE view_id = ?1", t.views),
            [key(&view)],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0))
}

fn bump_revision(conn: &Connection, t: KindTables, view: Id) -> Result<i64> {
    touch_view(conn, t, view)?;
    conn.execute(
        &format!(
            "UPDATE {} SET revision = revision + 1 WHERE view_id = ?1",
            t.views
        ),
        [key(&view)],
    )?;
    current_revision(conn, t, view)
}

fn order_rows(conn: &Connection, t: KindTables, view: Id) -> Result<Vec<OrderRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT ref_kind, ref_id, rank FROM {} WHERE view_id = ?1 ORDER BY rank, ref_id",
        t.order
    ))?;
    let rows = stmt.query_map([key(&view)], |row| {
        let kind: String = row.get(0)?;
        Ok(OrderRow {
            kind: RefKind::parse(&kind)?,
            ref_id: id_at(row, 1)?,
            rank: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn order_row(conn: &Connection, t: KindTables, view: Id, ref_id: Id) -> Result<Option<OrderRow>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT ref_kind, rank FROM {} WHERE view_id = ?1 AND ref_id = ?2",
                t.order
            ),
            [key(&view), key(&ref_id)],
            |row| {
                let kind: String = row.get(0)?;
                Ok(OrderRow {
                    kind: RefKind::parse(&kind)?,
                    ref_id,
                    rank: row.get(1)?,
                })
            },
        )
        .optional()?)
}

fn state(conn: &Connection, t: KindTables, view: Id, ref_id: Id) -> Result<Option<StateRow>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT suppressed, key, value, description, enabled FROM {}
                 WHERE view_id = ?1 AND ref_id = ?2",
                t.state
            ),
            [key(&view), key(&ref_id)],
            |row| {
                Ok(StateRow {
                    suppressed: row.get(0)?,
                    overrides: ParamPatch {
                        key: row.get(1)?,
                        value: row.get(2)?,
                        description: row.get(3)?,
                        enabled: row.get(4)?,
                    },
                })
            },
        )
        .optional()?)
}

fn delta_fields(conn: &Connection, t: KindTables, view: Id, ref_id: Id) -> Result<Option<ParamFields>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT key, value, description, enabled FROM {}
                 WHERE view_id = ?1 AND ref_id = ?2",
                t.delta
            ),
            [key(&view), key(&ref_id)],
            |row| {
                Ok(ParamFields {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    description: row.get(2)?,
                    enabled: row.get(3)?,
                })
            },
        )
        .optional()?)
}

/// Insert an order row after the current last rank of `view`.
fn append(conn: &Connection, t: KindTables, view: Id, kind: RefKind, ref_id: Id) -> Result<()> {
    let rank = match rank::after(last_rank(conn, t, view)?.as_deref()) {
        Some(rank) => rank,
        None => {
            rerank(conn, t, view)?;
            rank::after(last_rank(conn, t, view)?.as_deref())
                .ok_or(StoreError::RankExhausted { view })?
        }
    };
    let revision = current_revision(conn, t, view)?;
    conn.execute(
        &format!(
            "INSERT INTO {} (view_id, ref_kind, ref_id, rank, revision) VALUES (?1, ?2, ?3, ?4, ?5)",
            t.order
        ),
        params![key(&view), kind.as_str(), key(&ref_id), rank, revision],
    )?;
    Ok(())
}

fn last_rank(conn: &Connection, t: KindTables, view: Id) -> Result<Option<String>> {
    Ok(conn.query_row(
        &format!("SELECT MAX(rank) FROM {} WHERE view_id = ?1", t.order),
        [key(&view)],
        |row| row.get(0),
    )?)
}

/// Rank strictly between `target` and its neighbour on the requested side,
/// ignoring `item`'s own row.
fn slot_rank(
    conn: &Connection,
    t: KindTables,
    view: Id,
    item: Id,
    target: Id,
    after: bool,
) -> Result<Option<String>> {
    let rows: Vec<OrderRow> = order_rows(conn, t, view)?
        .into_iter()
        .filter(|r| r.ref_id != item)
        .collect();
    let idx = rows
        .iter()
        .position(|r| r.ref_id == target)
        .ok_or(StoreError::UnknownItem(target))?;
    let (prev, next) = if after {
        (Some(&rows[idx]), rows.get(idx + 1))
    } else {
        (idx.checked_sub(1).map(|p| &rows[p]), Some(&rows[idx]))
    };
    Ok(rank::between(
        prev.map(|r| r.rank.as_str()),
        next.map(|r| r.rank.as_str()),
    ))
}

/// Renumber every order row of `view` with evenly spaced ranks.
fn rerank(conn: &Connection, t: KindTables, view: Id) -> Result<()> {
    let rows = order_rows(conn, t, view)?;
    let revision = bump_revision(conn, t, view)?;
    for (row, rank) in rows.iter().zip(rank::spread(rows.len())) {
        conn.execute(
            &format!(
                "UPDATE {} SET rank = ?3, revision = ?4 WHERE view_id = ?1 AND ref_id = ?2",
                t.order
            ),
            params![key(&view), key(&row.ref_id), rank, revision],
        )?;
    }
    tracing::info!(
        "Re-ranked {} row(s) of view {} at revision {}",
        rows.len(),
        view,
        revision
    );
    Ok(())
}
