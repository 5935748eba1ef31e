use crate::Id;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Label on an outgoing edge, used by branching and looping nodes to pick
/// which successors run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeHandle {
    #[default]
    Unspecified,
    Then,
    Else,
    Loop,
}

/// Directed edge `source -> target` inside one flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: Id,
    pub flow_id: Id,
    pub source_id: Id,
    pub target_id: Id,
    #[serde(default)]
    pub handle: EdgeHandle,
}

impl Edge {
    pub fn new(flow_id: Id, source_id: Id, target_id: Id, handle: EdgeHandle) -> Self {
        Self {
            id: Id::now(),
            flow_id,
            source_id,
            target_id,
            handle,
        }
    }
}

/// Adjacency `source -> (handle -> [target])`, built once before a run.
#[derive(Debug, Clone, Default)]
pub struct EdgesMap {
    map: HashMap<Id, HashMap<EdgeHandle, Vec<Id>>>,
}

impl EdgesMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_edges<'a>(edges: impl IntoIterator<Item = &'a Edge>) -> Self {
        let mut map = Self::new();
        for edge in edges {
            map.insert(edge.source_id, edge.handle, edge.target_id);
        }
        map
    }

    pub fn insert(&mut self, source: Id, handle: EdgeHandle, target: Id) {
        self.map
            .entry(source)
            .or_default()
            .entry(handle)
            .or_default()
            .push(target);
    }

    /// Targets reached from `source` through `handle`, in insertion order.
    pub fn targets(&self, source: Id, handle: EdgeHandle) -> &[Id] {
        self.map
            .get(&source)
            .and_then(|handles| handles.get(&handle))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Targets for several handles, concatenated in the order given.
    pub fn targets_for(&self, source: Id, handles: &[EdgeHandle]) -> Vec<Id> {
        handles
            .iter()
            .flat_map(|h| self.targets(source, *h).iter().copied())
            .collect()
    }

    /// Every outgoing target of `source` regardless of handle.
    pub fn all_targets(&self, source: Id) -> Vec<Id> {
        self.targets_for(
            source,
            &[
                EdgeHandle::Unspecified,
                EdgeHandle::Then,
                EdgeHandle::Else,
                EdgeHandle::Loop,
            ],
        )
    }

    pub fn has_outgoing(&self, source: Id) -> bool {
        self.map
            .get(&source)
            .is_some_and(|handles| handles.values().any(|t| !t.is_empty()))
    }

    /// In-degree per target over all handles.
    pub fn in_degrees(&self) -> HashMap<Id, u32> {
        let mut degrees = HashMap::new();
        for handles in self.map.values() {
            for target in handles.values().flatten() {
                *degrees.entry(*target).or_insert(0) += 1;
            }
        }
        degrees
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_are_grouped_by_handle() {
        let (cond, yes, no) = (Id::now(), Id::now(), Id::now());
        let mut map = EdgesMap::new();
        map.insert(cond, EdgeHandle::Then, yes);
        map.insert(cond, EdgeHandle::Else, no);

        assert_eq!(map.targets(cond, EdgeHandle::Then), &[yes]);
        assert_eq!(map.targets(cond, EdgeHandle::Else), &[no]);
        assert!(map.targets(cond, EdgeHandle::Loop).is_empty());
        assert_eq!(map.all_targets(cond), vec![yes, no]);
        assert!(!map.has_outgoing(yes));
    }

    #[test]
    fn in_degree_counts_every_handle() {
        let (a, b, j) = (Id::now(), Id::now(), Id::now());
        let mut map = EdgesMap::new();
        map.insert(a, EdgeHandle::Unspecified, j);
        map.insert(b, EdgeHandle::Then, j);
        map.insert(a, EdgeHandle::Unspecified, b);

        let degrees = map.in_degrees();
        assert_eq!(degrees.get(&j), Some(&2));
        assert_eq!(degrees.get(&b), Some(&1));
        assert_eq!(degrees.get(&a), None);
    }
}
