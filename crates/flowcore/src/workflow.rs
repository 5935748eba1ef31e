use crate::{Edge, EdgeHandle, Id, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type FlowId = Id;
pub type NodeId = Id;

/// Serializable flow document, the authoring form of a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSpec {
    pub id: FlowId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Explicit start node; defaults to the single `noop-start` node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NodeId>,
    /// Per-batch timeout in milliseconds; `None` or 0 disables it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Initial variables for every run.
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
}

impl FlowSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Id::now(),
            name: name.into(),
            description: None,
            start: None,
            timeout_ms: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            variables: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id;
        self.nodes.push(node);
        id
    }

    pub fn connect(&mut self, source: NodeId, target: NodeId) {
        self.connect_via(source, EdgeHandle::Unspecified, target);
    }

    pub fn connect_via(&mut self, source: NodeId, handle: EdgeHandle, target: NodeId) {
        self.edges.push(Edge::new(self.id, source, target, handle));
    }
}

/// Node entry of a flow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl NodeSpec {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            id: Id::now(),
            kind,
            name: name.into(),
            config: serde_json::Map::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(|v| v.as_u64())
    }
}

/// What a looping node does when one iteration fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    #[default]
    Fail,
    Ignore,
    Break,
}
