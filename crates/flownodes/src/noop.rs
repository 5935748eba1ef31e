use async_trait::async_trait;
use flowcore::{FlowRequest, GraphError, Id, Node, NodeError, NodeKind, NodeSpec, RunContext};
use flowruntime::{NodeFactory, NodeMetadata};
use std::sync::Arc;

/// Pass-through node: schedules every outgoing target.
///
/// As `noop-start` it is the entry point of a flow and stays off the status
/// stream.
pub struct NoopNode {
    id: Id,
    name: String,
    kind: NodeKind,
}

impl NoopNode {
    pub fn new(id: Id, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: NodeKind::Noop,
        }
    }

    pub fn start(id: Id, name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::NoopStart,
            ..Self::new(id, name)
        }
    }
}

#[async_trait]
impl Node for NoopNode {
    fn id(&self) -> Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    async fn run(&self, _ctx: &RunContext, req: &FlowRequest) -> Result<Vec<Id>, NodeError> {
        Ok(req.edges.all_targets(self.id))
    }
}

pub struct NoopNodeFactory {
    kind: NodeKind,
}

impl NoopNodeFactory {
    pub fn start() -> Self {
        Self {
            kind: NodeKind::NoopStart,
        }
    }

    pub fn plain() -> Self {
        Self {
            kind: NodeKind::Noop,
        }
    }
}

impl NodeFactory for NoopNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Arc<dyn Node>, GraphError> {
        let node = match self.kind {
            NodeKind::NoopStart => NoopNode::start(spec.id, spec.name.clone()),
            _ => NoopNode::new(spec.id, spec.name.clone()),
        };
        Ok(Arc::new(node))
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn metadata(&self) -> NodeMetadata {
        let description = match self.kind {
            NodeKind::NoopStart => "Flow entry point",
            _ => "Forward to every successor",
        };
        NodeMetadata {
            description: description.to_string(),
            category: "control".to_string(),
        }
    }
}
