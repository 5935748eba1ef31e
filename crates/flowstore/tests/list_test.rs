// crates/flowstore/tests/list_test.rs

use flowcore::Id;
use flowstore::{
    Collections, ErrorKind, ListProblem, Position, Store, StoreConfig, StoreError,
};
use std::collections::HashSet;
use std::thread;

fn workspace(n: usize) -> (Collections, Id, Vec<Id>) {
    let store = Store::in_memory().unwrap();
    let collections = Collections::new(&store);
    let ws = Id::now();
    let ids = (0..n)
        .map(|i| collections.insert_at_tail(ws, format!("c{i}")).unwrap().id)
        .collect();
    (collections, ws, ids)
}

fn assert_order(collections: &Collections, ws: Id, expected: &[Id]) {
    let report = collections.ordered().verify(ws).unwrap();
    assert!(report.is_ok(), "{:?}", report.problems);
    assert_eq!(report.len, expected.len());
    assert_eq!(collections.ordered().list(ws).unwrap(), expected);
}

#[test]
fn test_empty_parent() {
    let (collections, ws, _) = workspace(0);
    assert!(collections.list(ws).unwrap().is_empty());
    assert_eq!(collections.ordered().get_max_position(ws).unwrap(), -1);
    let report = collections.ordered().verify(ws).unwrap();
    assert!(report.is_ok());
    assert_eq!(report.head, None);
}

#[test]
fn test_insert_at_tail_links_rows() {
    let (collections, ws, ids) = workspace(3);
    let listed = collections.list(ws).unwrap();
    assert_eq!(
        listed.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        vec!["c0", "c1", "c2"]
    );
    assert_eq!(listed[0].prev, None);
    assert_eq!(listed[0].next, Some(ids[1]));
    assert_eq!(listed[1].prev, Some(ids[0]));
    assert_eq!(listed[2].next, None);
    assert_eq!(collections.ordered().get_max_position(ws).unwrap(), 2);

    let report = collections.ordered().verify(ws).unwrap();
    assert_eq!(report.head, Some(ids[0]));
    assert_eq!(report.tail, Some(ids[2]));
}

#[test]
fn test_moves() {
    let (collections, ws, ids) = workspace(4);
    let (a, b, c, d) = (ids[0], ids[1], ids[2], ids[3]);
    let list = collections.ordered();

    list.move_after(a, c).unwrap();
    assert_order(&collections, ws, &[b, c, a, d]);

    list.move_before(d, b).unwrap();
    assert_order(&collections, ws, &[d, b, c, a]);

    list.move_after(d, a).unwrap();
    assert_order(&collections, ws, &[b, c, a, d]);

    list.move_before(b, d).unwrap();
    assert_order(&collections, ws, &[c, a, b, d]);
}

#[test]
fn test_adjacent_move_is_noop() {
    let (collections, ws, ids) = workspace(3);
    collections.ordered().move_after(ids[1], ids[0]).unwrap();
    collections.ordered().move_before(ids[1], ids[2]).unwrap();
    assert_order(&collections, ws, &ids);
}

#[test]
fn test_move_errors() {
    let (collections, _, ids) = workspace(2);
    let list = collections.ordered();

    let err = list.move_after(ids[0], ids[0]).unwrap_err();
    assert!(matches!(err, StoreError::SelfMove(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);

    let missing = Id::now();
    assert!(matches!(
        list.move_before(ids[0], missing),
        Err(StoreError::NotFound(id)) if id == missing
    ));

    let other = collections.insert_at_tail(Id::now(), "elsewhere").unwrap();
    assert!(matches!(
        list.move_after(ids[0], other.id),
        Err(StoreError::CrossParent { .. })
    ));
}

#[test]
fn test_move_after_then_back_before_old_successor() {
    let (collections, ws, ids) = workspace(5);
    let list = collections.ordered();
    let (x, old_next, y) = (ids[1], ids[2], ids[3]);

    list.move_after(x, y).unwrap();
    assert_ne!(list.list(ws).unwrap(), ids);
    list.move_before(x, old_next).unwrap();
    assert_order(&collections, ws, &ids);
}

#[test]
fn test_reorder() {
    let (collections, ws, ids) = workspace(4);
    let list = collections.ordered();

    let reversed: Vec<Id> = ids.iter().rev().copied().collect();
    list.reorder(ws, &reversed).unwrap();
    assert_order(&collections, ws, &reversed);

    let current = list.list(ws).unwrap();
    list.reorder(ws, &current).unwrap();
    assert_order(&collections, ws, &reversed);

    assert!(matches!(
        list.reorder(ws, &ids[..3]),
        Err(StoreError::SetMismatch { .. })
    ));
    let duplicated = vec![ids[0], ids[0], ids[1], ids[2]];
    assert!(matches!(
        list.reorder(ws, &duplicated),
        Err(StoreError::SetMismatch { .. })
    ));
    let foreign = vec![ids[0], ids[1], ids[2], Id::now()];
    assert!(matches!(
        list.reorder(ws, &foreign),
        Err(StoreError::SetMismatch { .. })
    ));
    assert_order(&collections, ws, &reversed);
}

#[test]
fn test_update_position() {
    let (collections, ws, ids) = workspace(4);
    let list = collections.ordered();

    list.update_position(ids[3], 0).unwrap();
    assert_order(&collections, ws, &[ids[3], ids[0], ids[1], ids[2]]);

    list.update_position(ids[3], 3).unwrap();
    assert_order(&collections, ws, &ids);

    assert!(matches!(
        list.update_position(ids[0], 4),
        Err(StoreError::PositionOutOfRange { index: 4, len: 4 })
    ));
}

#[test]
fn test_update_positions_requires_full_set() {
    let (collections, ws, ids) = workspace(3);
    let list = collections.ordered();

    let full = [
        Position { id: ids[0], index: 2 },
        Position { id: ids[1], index: 0 },
        Position { id: ids[2], index: 1 },
    ];
    list.update_positions(&full).unwrap();
    assert_order(&collections, ws, &[ids[1], ids[2], ids[0]]);

    let partial = [Position { id: ids[0], index: 0 }];
    assert!(matches!(
        list.update_positions(&partial),
        Err(StoreError::SetMismatch { .. })
    ));
    let clashing = [
        Position { id: ids[0], index: 0 },
        Position { id: ids[1], index: 0 },
        Position { id: ids[2], index: 1 },
    ];
    assert!(matches!(
        list.update_positions(&clashing),
        Err(StoreError::SetMismatch { .. })
    ));
}

#[test]
fn test_delete_stitches_neighbours() {
    let (collections, ws, ids) = workspace(4);
    collections.delete(ids[1]).unwrap();
    assert_order(&collections, ws, &[ids[0], ids[2], ids[3]]);
    collections.delete(ids[0]).unwrap();
    collections.delete(ids[3]).unwrap();
    assert_order(&collections, ws, &[ids[2]]);
    assert!(collections.get(ids[1]).unwrap().is_none());
    assert!(matches!(
        collections.delete(ids[1]),
        Err(StoreError::NotFound(_))
    ));

    let appended = collections.insert_at_tail(ws, "late").unwrap();
    assert_order(&collections, ws, &[ids[2], appended.id]);
}

#[test]
fn test_rename_keeps_position() {
    let (collections, ws, ids) = workspace(2);
    collections.rename(ids[0], "renamed").unwrap();
    let listed = collections.list(ws).unwrap();
    assert_eq!(listed[0].name, "renamed");
    assert_eq!(listed[0].id, ids[0]);
    assert!(matches!(
        collections.rename(Id::now(), "x"),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn test_compact_repairs_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let store = Store::open(&path, &StoreConfig::default()).unwrap();
    let collections = Collections::new(&store);
    let ws = Id::now();
    let ids: Vec<Id> = (0..4)
        .map(|i| collections.insert_at_tail(ws, format!("c{i}")).unwrap().id)
        .collect();

    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE collections SET prev = NULL WHERE id = ?1",
            [ids[2].as_bytes().as_slice()],
        )
        .unwrap();
    }

    let report = collections.ordered().verify(ws).unwrap();
    assert!(report.problems.contains(&ListProblem::MultipleHeads {
        heads: vec![ids[0], ids[2]]
    }));
    assert!(report.problems.contains(&ListProblem::AsymmetricLink {
        from: ids[1],
        to: ids[2]
    }));
    let err = collections.list(ws).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);

    collections.ordered().compact(ws).unwrap();
    assert_order(&collections, ws, &ids);
    collections.ordered().compact(ws).unwrap();
    assert_order(&collections, ws, &ids);
}

/// Pseudo-random but reproducible pair of distinct indexes.
fn pair(seed: usize, n: usize) -> (usize, usize) {
    let a = (seed * 7 + 3) % n;
    let b = (a + 1 + (seed * 5 + 1) % (n - 1)) % n;
    (a, b)
}

fn retrying(op: impl Fn() -> Result<(), StoreError>) {
    loop {
        match op() {
            Err(e) if e.is_retryable() => thread::yield_now(),
            other => return other.unwrap(),
        }
    }
}

#[test]
fn test_concurrent_moves_shared_handle() {
    let (collections, ws, ids) = workspace(8);
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let collections = collections.clone();
            let ids = ids.clone();
            thread::spawn(move || {
                let (a, b) = pair(t, ids.len());
                retrying(|| {
                    if t % 2 == 0 {
                        collections.ordered().move_after(ids[a], ids[b])
                    } else {
                        collections.ordered().move_before(ids[a], ids[b])
                    }
                });
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let order = collections.ordered().list(ws).unwrap();
    assert_eq!(order.len(), 8);
    let unique: HashSet<Id> = order.iter().copied().collect();
    assert_eq!(unique, ids.iter().copied().collect::<HashSet<_>>());
    assert!(collections.ordered().verify(ws).unwrap().is_ok());
}

#[test]
fn test_concurrent_moves_separate_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contended.db");
    let config = StoreConfig::default();
    let store = Store::open(&path, &config).unwrap();
    let collections = Collections::new(&store);
    let ws = Id::now();
    let ids: Vec<Id> = (0..8)
        .map(|i| collections.insert_at_tail(ws, format!("c{i}")).unwrap().id)
        .collect();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let path = path.clone();
            let config = config.clone();
            let ids = ids.clone();
            thread::spawn(move || {
                let store = Store::open(&path, &config).unwrap();
                let collections = Collections::new(&store);
                for round in 0..5 {
                    let (a, b) = pair(t * 5 + round, ids.len());
                    retrying(|| {
                        if round % 2 == 0 {
                            collections.ordered().move_after(ids[a], ids[b])
                        } else {
                            collections.ordered().move_before(ids[a], ids[b])
                        }
                    });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let report = collections.ordered().verify(ws).unwrap();
    assert!(report.is_ok(), "{:?}", report.problems);
    assert_eq!(report.len, 8);
    let order = collections.ordered().list(ws).unwrap();
    let unique: HashSet<Id> = order.iter().copied().collect();
    assert_eq!(unique.len(), 8);
}
