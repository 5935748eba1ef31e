use async_trait::async_trait;
use flowcore::{FlowRequest, GraphError, Id, Node, NodeError, NodeKind, NodeSpec, RunContext};
use flowruntime::{NodeFactory, NodeMetadata};
use std::sync::Arc;
use std::time::Duration;

/// Delay execution for a specified duration
pub struct DelayNode {
    id: Id,
    name: String,
    delay: Duration,
}

impl DelayNode {
    pub fn new(id: Id, name: impl Into<String>, delay: Duration) -> Self {
        Self {
            id,
            name: name.into(),
            delay,
        }
    }
}

#[async_trait]
impl Node for DelayNode {
    fn id(&self) -> Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Delay
    }

    async fn run(&self, ctx: &RunContext, req: &FlowRequest) -> Result<Vec<Id>, NodeError> {
        tracing::debug!("Delaying {} for {}ms", self.name, self.delay.as_millis());
        ctx.sleep(self.delay).await?;
        Ok(req.edges.all_targets(self.id))
    }
}

pub struct DelayNodeFactory;

impl NodeFactory for DelayNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Arc<dyn Node>, GraphError> {
        // Default to 1 second if not specified
        let delay_ms = spec.config_u64("delay_ms").unwrap_or(1000);
        Ok(Arc::new(DelayNode::new(
            spec.id,
            spec.name.clone(),
            Duration::from_millis(delay_ms),
        )))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Delay
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
        }
    }
}
