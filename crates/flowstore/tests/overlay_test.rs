// crates/flowstore/tests/overlay_test.rs

use flowcore::Id;
use flowstore::{
    ErrorKind, ItemSource, Overlay, OverlayItem, ParamFields, ParamKind, ParamPatch, Params, Store,
    StoreError,
};

struct Fixture {
    params: Params,
    overlay: Overlay,
    origin: Id,
    view: Id,
    items: Vec<Id>,
}

fn fixture(kind: ParamKind, keys: &[&str]) -> Fixture {
    let store = Store::in_memory().unwrap();
    let params = Params::new(&store, kind);
    let origin = Id::now();
    let items = keys
        .iter()
        .map(|k| {
            params
                .insert_at_tail(origin, ParamFields::new(*k, format!("{k}-value")))
                .unwrap()
                .id
        })
        .collect();
    Fixture {
        overlay: Overlay::new(&store, kind),
        params,
        origin,
        view: Id::now(),
        items,
    }
}

impl Fixture {
    fn list(&self) -> Vec<OverlayItem> {
        self.overlay.list(self.view, self.origin).unwrap()
    }

    fn ids(&self) -> Vec<Id> {
        self.list().into_iter().map(|i| i.id).collect()
    }
}

#[test]
fn test_origin_suppression_and_delta() {
    let f = fixture(ParamKind::Header, &["h1", "h2", "h3"]);
    let (h1, h2, h3) = (f.items[0], f.items[1], f.items[2]);
    let (view, origin) = (f.view, f.origin);

    f.overlay.ensure_seeded(view, origin).unwrap();
    f.overlay.update(view, h2, &ParamPatch::value("X")).unwrap();
    f.overlay.delete(view, h3).unwrap();
    let d1 = f.overlay.create_delta(view).unwrap();
    f.overlay.move_item(view, origin, d1, h1, false).unwrap();

    let listed = f.list();
    let summary: Vec<(Id, ItemSource)> = listed.iter().map(|i| (i.id, i.source)).collect();
    assert_eq!(
        summary,
        vec![
            (d1, ItemSource::Delta),
            (h1, ItemSource::Origin),
            (h2, ItemSource::Mixed)
        ]
    );
    assert_eq!(listed[2].fields.value, "X");
    assert_eq!(listed[2].fields.key, "h2");
    assert_eq!(listed[0].fields, ParamFields::default());
}

#[test]
fn test_seeding_is_idempotent() {
    let f = fixture(ParamKind::Query, &["a", "b"]);
    f.overlay.ensure_seeded(f.view, f.origin).unwrap();
    let once = f.list();
    f.overlay.ensure_seeded(f.view, f.origin).unwrap();
    f.overlay.ensure_seeded(f.view, f.origin).unwrap();
    assert_eq!(f.list(), once);
    assert_eq!(f.ids(), f.items);
    assert!(once.iter().all(|i| i.source == ItemSource::Origin));
    assert_eq!(f.overlay.revision(f.view).unwrap(), 0);
}

#[test]
fn test_list_seeds_lazily_and_picks_up_new_origin_items() {
    let f = fixture(ParamKind::Form, &["a"]);
    assert_eq!(f.ids(), f.items);

    let later = f
        .params
        .insert_at_tail(f.origin, ParamFields::new("b", "2"))
        .unwrap();
    assert_eq!(f.ids(), vec![f.items[0], later.id]);
}

#[test]
fn test_update_then_reset_restores_origin() {
    let f = fixture(ParamKind::Header, &["Accept"]);
    let item = f.items[0];
    let patch = ParamPatch {
        value: Some("application/json".to_string()),
        enabled: Some(false),
        ..ParamPatch::default()
    };
    f.overlay.update(f.view, item, &patch).unwrap();
    let mixed = f.overlay.get(f.view, f.origin, item).unwrap().unwrap();
    assert_eq!(mixed.source, ItemSource::Mixed);
    assert!(!mixed.fields.enabled);

    f.overlay.reset(f.view, item).unwrap();
    let restored = f.overlay.get(f.view, f.origin, item).unwrap().unwrap();
    assert_eq!(restored.source, ItemSource::Origin);
    assert_eq!(restored.fields, f.params.get(item).unwrap().unwrap().fields);
}

#[test]
fn test_patches_accumulate() {
    let f = fixture(ParamKind::Query, &["q"]);
    let item = f.items[0];
    f.overlay.update(f.view, item, &ParamPatch::value("1")).unwrap();
    f.overlay
        .update(
            f.view,
            item,
            &ParamPatch {
                description: Some("page".to_string()),
                ..ParamPatch::default()
            },
        )
        .unwrap();
    let merged = f.overlay.get(f.view, f.origin, item).unwrap().unwrap();
    assert_eq!(merged.fields.value, "1");
    assert_eq!(merged.fields.description, "page");
}

#[test]
fn test_delete_and_undelete_origin_item() {
    let f = fixture(ParamKind::Header, &["a", "b", "c"]);
    let (a, b, c) = (f.items[0], f.items[1], f.items[2]);
    f.overlay.update(f.view, a, &ParamPatch::value("kept")).unwrap();
    f.overlay.delete(f.view, a).unwrap();
    assert_eq!(f.ids(), vec![b, c]);
    assert_eq!(f.overlay.get(f.view, f.origin, a).unwrap(), None);

    // Suppression survives reset and reseeding.
    f.overlay.reset(f.view, a).unwrap();
    f.overlay.ensure_seeded(f.view, f.origin).unwrap();
    assert_eq!(f.ids(), vec![b, c]);

    f.overlay.update(f.view, a, &ParamPatch::value("back")).unwrap();
    f.overlay.undelete(f.view, a).unwrap();
    let listed = f.list();
    assert_eq!(listed.last().map(|i| i.id), Some(a));
    assert_eq!(listed[2].source, ItemSource::Mixed);
    assert_eq!(listed[2].fields.value, "back");
}

#[test]
fn test_delta_items() {
    let f = fixture(ParamKind::UrlEncoded, &["x"]);
    f.overlay.ensure_seeded(f.view, f.origin).unwrap();
    let d = f.overlay.create_delta(f.view).unwrap();
    f.overlay
        .update(
            f.view,
            d,
            &ParamPatch {
                key: Some("token".to_string()),
                value: Some("abc".to_string()),
                ..ParamPatch::default()
            },
        )
        .unwrap();
    let item = f.overlay.get(f.view, f.origin, d).unwrap().unwrap();
    assert_eq!(item.source, ItemSource::Delta);
    assert_eq!(item.fields.key, "token");
    assert_eq!(f.ids(), vec![f.items[0], d]);

    f.overlay.reset(f.view, d).unwrap();
    let blank = f.overlay.get(f.view, f.origin, d).unwrap().unwrap();
    assert_eq!(blank.fields, ParamFields::default());

    assert_eq!(f.overlay.resolve_view(d).unwrap(), Some(f.view));
    f.overlay.delete(f.view, d).unwrap();
    assert_eq!(f.ids(), vec![f.items[0]]);
    assert_eq!(f.overlay.resolve_view(d).unwrap(), None);
    assert!(matches!(
        f.overlay.delete(f.view, d),
        Err(StoreError::UnknownItem(_))
    ));
}

#[test]
fn test_unknown_items() {
    let f = fixture(ParamKind::Header, &["a"]);
    let ghost = Id::now();
    let err = f
        .overlay
        .move_item(f.view, f.origin, f.items[0], ghost, true)
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownItem(id) if id == ghost));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(matches!(
        f.overlay.update(f.view, ghost, &ParamPatch::value("v")),
        Err(StoreError::UnknownItem(_))
    ));
    assert!(matches!(
        f.overlay.reset(f.view, ghost),
        Err(StoreError::UnknownItem(_))
    ));
    assert!(matches!(
        f.overlay.undelete(f.view, ghost),
        Err(StoreError::UnknownItem(_))
    ));
    assert!(matches!(
        f.overlay.move_item(f.view, f.origin, f.items[0], f.items[0], true),
        Err(StoreError::SelfMove(_))
    ));
}

#[test]
fn test_moves_bump_revision() {
    let f = fixture(ParamKind::Query, &["a", "b", "c"]);
    let (a, b, c) = (f.items[0], f.items[1], f.items[2]);
    f.overlay.move_item(f.view, f.origin, a, c, true).unwrap();
    assert_eq!(f.ids(), vec![b, c, a]);
    f.overlay.move_item(f.view, f.origin, c, b, false).unwrap();
    assert_eq!(f.ids(), vec![c, b, a]);
    assert_eq!(f.overlay.revision(f.view).unwrap(), 2);
    assert_eq!(f.overlay.resolve_view(a).unwrap(), Some(f.view));
}

#[test]
fn test_rank_exhaustion_reranks_transparently() {
    let f = fixture(ParamKind::Header, &["a", "b", "c"]);
    let (a, b, c) = (f.items[0], f.items[1], f.items[2]);
    let moves = 200;
    for i in 0..moves {
        if i % 2 == 0 {
            f.overlay.move_item(f.view, f.origin, c, b, false).unwrap();
            assert_eq!(f.ids(), vec![a, c, b]);
        } else {
            f.overlay.move_item(f.view, f.origin, b, c, false).unwrap();
            assert_eq!(f.ids(), vec![a, b, c]);
        }
    }
    // Every move bumps once; each re-rank adds one more.
    assert!(f.overlay.revision(f.view).unwrap() > moves);
}

#[test]
fn test_dangling_origin_refs_are_skipped() {
    let f = fixture(ParamKind::Form, &["a", "b"]);
    f.overlay.ensure_seeded(f.view, f.origin).unwrap();
    f.params.delete(f.items[0]).unwrap();
    assert_eq!(f.ids(), vec![f.items[1]]);
}

#[test]
fn test_kinds_are_isolated() {
    let store = Store::in_memory().unwrap();
    let origin = Id::now();
    let view = Id::now();
    Params::new(&store, ParamKind::Header)
        .insert_at_tail(origin, ParamFields::new("h", "1"))
        .unwrap();
    let query = Overlay::new(&store, ParamKind::Query);
    assert!(query.list(view, origin).unwrap().is_empty());
    let header = Overlay::new(&store, ParamKind::Header);
    assert_eq!(header.list(view, origin).unwrap().len(), 1);
}

#[test]
fn test_views_are_independent() {
    let f = fixture(ParamKind::Header, &["a", "b"]);
    let other = Id::now();
    f.overlay.delete(f.view, f.items[0]).unwrap();
    assert_eq!(f.ids(), vec![f.items[1]]);
    let listed = f.overlay.list(other, f.origin).unwrap();
    assert_eq!(
        listed.into_iter().map(|i| i.id).collect::<Vec<_>>(),
        f.items
    );
}

#[test]
fn test_items_of_another_origin_are_unknown() {
    let f = fixture(ParamKind::Header, &["a"]);
    f.overlay.ensure_seeded(f.view, f.origin).unwrap();
    let foreign = f
        .params
        .insert_at_tail(Id::now(), ParamFields::new("b", "elsewhere"))
        .unwrap()
        .id;

    let rejected = [
        f.overlay.update(f.view, foreign, &ParamPatch::value("X")),
        f.overlay.delete(f.view, foreign),
        f.overlay.reset(f.view, foreign),
        f.overlay.undelete(f.view, foreign),
        f.overlay.move_item(f.view, f.origin, f.items[0], foreign, true),
        f.overlay.move_item(f.view, f.origin, foreign, f.items[0], false),
    ];
    for result in rejected {
        assert!(
            matches!(result, Err(StoreError::UnknownItem(id)) if id == foreign),
            "{result:?}"
        );
    }
    assert_eq!(f.overlay.resolve_view(foreign).unwrap(), None);
    assert_eq!(f.ids(), f.items);
    assert_eq!(f.overlay.revision(f.view).unwrap(), 0);
}

#[test]
fn test_first_override_binds_unseeded_view_to_its_origin() {
    let f = fixture(ParamKind::Query, &["a"]);
    let foreign = f
        .params
        .insert_at_tail(Id::now(), ParamFields::new("b", "elsewhere"))
        .unwrap()
        .id;

    f.overlay
        .update(f.view, f.items[0], &ParamPatch::value("1"))
        .unwrap();
    assert!(matches!(
        f.overlay.update(f.view, foreign, &ParamPatch::value("2")),
        Err(StoreError::UnknownItem(_))
    ));
    let listed = f.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].source, ItemSource::Mixed);
}
