use crate::{FlowGraph, GraphBuilder};
use flowcore::{FlowSpec, GraphError, Node, NodeKind, NodeSpec};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Factory trait for creating node instances
pub trait NodeFactory: Send + Sync {
    /// Create a node instance from its flow-document entry
    fn create(&self, spec: &NodeSpec) -> Result<Arc<dyn Node>, GraphError>;

    /// Node kind this factory builds
    fn kind(&self) -> NodeKind;

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::default()
    }
}

/// Metadata about a node kind
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub description: String,
    pub category: String,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Registry of available node kinds
pub struct NodeRegistry {
    factories: HashMap<NodeKind, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a node factory, replacing any factory for the same kind
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let kind = factory.kind();
        tracing::debug!("Registering node kind: {}", kind);
        self.factories.insert(kind, factory);
    }

    pub fn create_node(&self, spec: &NodeSpec) -> Result<Arc<dyn Node>, GraphError> {
        let factory = self
            .factories
            .get(&spec.kind)
            .ok_or_else(|| GraphError::UnknownNodeKind(spec.kind.to_string()))?;
        factory.create(spec)
    }

    /// Instantiate every node of `spec` and validate the result into a graph.
    pub fn prepare(&self, spec: &FlowSpec) -> Result<FlowGraph, GraphError> {
        let nodes = spec
            .nodes
            .iter()
            .map(|node| self.create_node(node))
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = GraphBuilder::new(spec.id)
            .nodes(nodes)
            .edges(spec.edges.iter().cloned())
            .timeout(spec.timeout_ms.map(Duration::from_millis))
            .variables(spec.variables.clone().into_iter().collect());
        if let Some(start) = spec.start {
            builder = builder.start(start);
        }
        builder.build()
    }

    /// Registered kinds in declaration order
    pub fn list_node_kinds(&self) -> Vec<NodeKind> {
        NodeKind::ALL
            .into_iter()
            .filter(|k| self.factories.contains_key(k))
            .collect()
    }

    pub fn get_metadata(&self, kind: NodeKind) -> Option<NodeMetadata> {
        self.factories.get(&kind).map(|f| f.metadata())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
