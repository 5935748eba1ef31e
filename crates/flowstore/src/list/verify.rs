use flowcore::Id;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Pointer row of one list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Link {
    pub id: Id,
    pub prev: Option<Id>,
    pub next: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum ListProblem {
    NoHead,
    MultipleHeads { heads: Vec<Id> },
    NoTail,
    MultipleTails { tails: Vec<Id> },
    /// `from.next == to` but `to.prev != from`, or the mirror case.
    AsymmetricLink { from: Id, to: Id },
    /// Following `next` from the head came back to `at`.
    Cycle { at: Id },
    Unreachable { ids: Vec<Id> },
    /// A pointer names a row outside this parent.
    ScopeViolation { id: Id, points_to: Id },
}

/// Result of walking one parent's pointer graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListReport {
    pub len: usize,
    pub head: Option<Id>,
    pub tail: Option<Id>,
    pub problems: Vec<ListProblem>,
}

impl ListReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Best-effort traversal: rows reachable from the first head, then every
/// remaining row in id order. This is the order `compact` writes back.
pub(crate) fn repair_order(links: &[Link]) -> Vec<Id> {
    let by_id: HashMap<Id, &Link> = links.iter().map(|l| (l.id, l)).collect();
    let mut sorted: Vec<&Link> = links.iter().collect();
    sorted.sort_by_key(|l| l.id);

    let mut order = Vec::with_capacity(links.len());
    let mut seen = HashSet::new();
    let mut cursor = sorted.iter().find(|l| l.prev.is_none()).map(|l| l.id);
    while let Some(id) = cursor {
        if !seen.insert(id) {
            break;
        }
        order.push(id);
        cursor = by_id.get(&id).and_then(|l| l.next).filter(|n| by_id.contains_key(n));
    }
    for link in sorted {
        if seen.insert(link.id) {
            order.push(link.id);
        }
    }
    order
}

pub(crate) fn inspect(links: &[Link]) -> ListReport {
    let by_id: HashMap<Id, &Link> = links.iter().map(|l| (l.id, l)).collect();
    let mut sorted: Vec<&Link> = links.iter().collect();
    sorted.sort_by_key(|l| l.id);

    let mut problems = Vec::new();
    if links.is_empty() {
        return ListReport {
            len: 0,
            head: None,
            tail: None,
            problems,
        };
    }

    let heads: Vec<Id> = sorted.iter().filter(|l| l.prev.is_none()).map(|l| l.id).collect();
    let tails: Vec<Id> = sorted.iter().filter(|l| l.next.is_none()).map(|l| l.id).collect();
    match heads.len() {
        0 => problems.push(ListProblem::NoHead),
        1 => {}
        _ => problems.push(ListProblem::MultipleHeads {
            heads: heads.clone(),
        }),
    }
    match tails.len() {
        0 => problems.push(ListProblem::NoTail),
        1 => {}
        _ => problems.push(ListProblem::MultipleTails {
            tails: tails.clone(),
        }),
    }

    for link in &sorted {
        for pointer in [link.prev, link.next].into_iter().flatten() {
            if !by_id.contains_key(&pointer) {
                problems.push(ListProblem::ScopeViolation {
                    id: link.id,
                    points_to: pointer,
                });
            }
        }
    }

    let mut asymmetric = Vec::new();
    for link in &sorted {
        if let Some(next) = link.next.and_then(|n| by_id.get(&n)) {
            if next.prev != Some(link.id) {
                asymmetric.push((link.id, next.id));
            }
        }
        if let Some(prev) = link.prev.and_then(|p| by_id.get(&p)) {
            if prev.next != Some(link.id) && !asymmetric.contains(&(prev.id, link.id)) {
                asymmetric.push((prev.id, link.id));
            }
        }
    }
    problems.extend(
        asymmetric
            .into_iter()
            .map(|(from, to)| ListProblem::AsymmetricLink { from, to }),
    );

    let mut seen = HashSet::new();
    let mut cursor = heads.first().copied();
    while let Some(id) = cursor {
        if !seen.insert(id) {
            problems.push(ListProblem::Cycle { at: id });
            break;
        }
        cursor = by_id.get(&id).and_then(|l| l.next).filter(|n| by_id.contains_key(n));
    }

    let unreachable: Vec<Id> = sorted
        .iter()
        .map(|l| l.id)
        .filter(|id| !seen.contains(id))
        .collect();
    if !unreachable.is_empty() {
        problems.push(ListProblem::Unreachable { ids: unreachable });
    }

    ListReport {
        len: links.len(),
        head: (heads.len() == 1).then(|| heads[0]),
        tail: (tails.len() == 1).then(|| tails[0]),
        problems,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize) -> (Vec<Id>, Vec<Link>) {
        let ids: Vec<Id> = (0..n).map(|_| Id::now()).collect();
        let links = ids
            .iter()
            .enumerate()
            .map(|(i, &id)| Link {
                id,
                prev: i.checked_sub(1).map(|p| ids[p]),
                next: ids.get(i + 1).copied(),
            })
            .collect();
        (ids, links)
    }

    #[test]
    fn healthy_chain_has_no_problems() {
        let (ids, links) = chain(4);
        let report = inspect(&links);
        assert!(report.is_ok(), "{:?}", report.problems);
        assert_eq!(report.len, 4);
        assert_eq!(report.head, Some(ids[0]));
        assert_eq!(report.tail, Some(ids[3]));
        assert_eq!(repair_order(&links), ids);
    }

    #[test]
    fn detects_cycle_and_missing_head() {
        let (ids, mut links) = chain(3);
        links[0].prev = Some(ids[2]);
        links[2].next = Some(ids[0]);
        let report = inspect(&links);
        assert!(report.problems.contains(&ListProblem::NoHead));
        assert!(report.problems.contains(&ListProblem::NoTail));
        assert_eq!(repair_order(&links), ids);
    }

    #[test]
    fn detects_asymmetry_and_scope() {
        let (ids, mut links) = chain(3);
        let stranger = Id::now();
        links[1].prev = None;
        links[2].next = Some(stranger);
        let report = inspect(&links);
        assert!(report.problems.contains(&ListProblem::MultipleHeads {
            heads: vec![ids[0], ids[1]]
        }));
        assert!(report.problems.contains(&ListProblem::AsymmetricLink {
            from: ids[0],
            to: ids[1]
        }));
        assert!(report.problems.contains(&ListProblem::ScopeViolation {
            id: ids[2],
            points_to: stranger
        }));
        assert!(report.problems.contains(&ListProblem::NoTail));
    }

    #[test]
    fn stray_rows_are_unreachable_and_repair_appends_them() {
        let (ids, mut links) = chain(3);
        links[1].next = None;
        links[2].prev = None;
        links[2].next = Some(ids[2]);
        let report = inspect(&links);
        assert!(report
            .problems
            .contains(&ListProblem::Unreachable { ids: vec![ids[2]] }));
        assert_eq!(repair_order(&links), ids);
    }
}
