use crate::{EdgesMap, Id, Node, StatusSink};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;

/// Run-scoped variables shared by all nodes of one run.
pub type VarMap = HashMap<String, serde_json::Value>;

pub type NodeMap = HashMap<Id, Arc<dyn Node>>;

/// Shared request passed to every node invocation of a run.
///
/// Created per run and discarded afterwards; nothing here is persisted.
#[derive(Clone)]
pub struct FlowRequest {
    pub vars: Arc<RwLock<VarMap>>,
    pub node_map: Arc<NodeMap>,
    pub edges: Arc<EdgesMap>,
    pub status: StatusSink,
    pub timeout: Option<Duration>,
    pub pending: PendingCounters,
}

impl FlowRequest {
    pub fn new(node_map: Arc<NodeMap>, edges: Arc<EdgesMap>, status: StatusSink) -> Self {
        Self {
            vars: Arc::new(RwLock::new(VarMap::new())),
            node_map,
            edges,
            status,
            timeout: None,
            pending: PendingCounters::default(),
        }
    }

    pub fn with_vars(mut self, vars: VarMap) -> Self {
        self.vars = Arc::new(RwLock::new(vars));
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn node(&self, id: Id) -> Option<&Arc<dyn Node>> {
        self.node_map.get(&id)
    }

    pub async fn read_var(&self, name: &str) -> Option<serde_json::Value> {
        self.vars.read().await.get(name).cloned()
    }

    pub async fn write_var(&self, name: impl Into<String>, value: serde_json::Value) {
        self.vars.write().await.insert(name.into(), value);
    }

    pub async fn snapshot(&self) -> VarMap {
        self.vars.read().await.clone()
    }
}

/// Resolve `path` in `vars`; the first segment names the variable.
pub fn lookup_path<'a>(vars: &'a VarMap, path: &str) -> Option<&'a serde_json::Value> {
    let mut segments = path.split('.').map(str::trim);
    let mut current = vars.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            serde_json::Value::Object(map) => map.get(segment)?,
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Remaining-predecessor counters for fan-in nodes (in-degree > 1).
///
/// Owned by the scheduling coordinator; the lock only makes the request
/// shareable with worker tasks, which never touch it.
#[derive(Debug, Clone, Default)]
pub struct PendingCounters {
    inner: Arc<Mutex<HashMap<Id, u32>>>,
}

impl PendingCounters {
    /// Reset from in-degree counts, keeping only fan-in nodes.
    pub fn init(&self, in_degrees: &HashMap<Id, u32>) {
        let mut counters = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        counters.clear();
        counters.extend(
            in_degrees
                .iter()
                .filter(|(_, degree)| **degree > 1)
                .map(|(id, degree)| (*id, *degree)),
        );
    }

    /// Record one satisfied predecessor of `target`; `true` when it is ready.
    pub fn arrive(&self, target: Id) -> bool {
        let mut counters = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match counters.get_mut(&target) {
            None => true,
            Some(count) if *count <= 1 => {
                counters.remove(&target);
                true
            }
            Some(count) => {
                *count -= 1;
                false
            }
        }
    }

    pub fn remaining(&self, target: Id) -> Option<u32> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&target)
            .copied()
    }
}
