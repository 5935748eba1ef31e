use crate::Evaluator;
use async_trait::async_trait;
use flowcore::{
    EdgeHandle, ErrorPolicy, FlowError, FlowRequest, GraphError, Id, Node, NodeError, NodeKind,
    NodeSpec, RunContext,
};
use flowruntime::{run_subgraph, NodeFactory, NodeMetadata};
use serde_json::{json, Value as Json};
use std::sync::Arc;

/// Successors taken once the loop is over.
const EXIT_HANDLES: [EdgeHandle; 2] = [EdgeHandle::Then, EdgeHandle::Unspecified];

enum Step {
    Continue,
    Break,
}

/// Run one pass of the `loop` body and apply the iteration error policy.
async fn iterate(
    ctx: &RunContext,
    req: &FlowRequest,
    node: &str,
    body: &[Id],
    policy: ErrorPolicy,
) -> Result<Step, NodeError> {
    match run_subgraph(ctx, req, body).await {
        Ok(()) => Ok(Step::Continue),
        Err(FlowError::Canceled) => Err(NodeError::Canceled),
        Err(FlowError::DeadlineExceeded) => Err(NodeError::Timeout),
        Err(e) => match policy {
            ErrorPolicy::Fail => Err(NodeError::ExecutionFailed(format!(
                "loop body of '{node}' failed: {e}"
            ))),
            ErrorPolicy::Ignore => {
                tracing::debug!("Ignoring failed iteration of {}: {}", node, e);
                Ok(Step::Continue)
            }
            ErrorPolicy::Break => {
                tracing::debug!("Breaking loop {} after failure: {}", node, e);
                Ok(Step::Break)
            }
        },
    }
}

fn error_policy(spec: &NodeSpec) -> Result<ErrorPolicy, GraphError> {
    match spec.config.get("error_policy") {
        None => Ok(ErrorPolicy::default()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| GraphError::InvalidConfig {
            node: spec.name.clone(),
            reason: format!("error_policy: {e}"),
        }),
    }
}

/// Counted loop: runs the `loop` body `iterations` times.
pub struct ForNode {
    id: Id,
    name: String,
    iterations: u64,
    policy: ErrorPolicy,
}

impl ForNode {
    pub fn new(id: Id, name: impl Into<String>, iterations: u64, policy: ErrorPolicy) -> Self {
        Self {
            id,
            name: name.into(),
            iterations,
            policy,
        }
    }
}

#[async_trait]
impl Node for ForNode {
    fn id(&self) -> Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::For
    }

    async fn run(&self, ctx: &RunContext, req: &FlowRequest) -> Result<Vec<Id>, NodeError> {
        let body = req.edges.targets(self.id, EdgeHandle::Loop).to_vec();
        for index in 0..self.iterations {
            ctx.check()?;
            req.write_var(self.name.clone(), json!({ "index": index }))
                .await;
            if body.is_empty() {
                continue;
            }
            if let Step::Break = iterate(ctx, req, &self.name, &body, self.policy).await? {
                break;
            }
        }
        Ok(req.edges.targets_for(self.id, &EXIT_HANDLES))
    }
}

pub struct ForNodeFactory;

impl NodeFactory for ForNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Arc<dyn Node>, GraphError> {
        let iterations = spec
            .config_u64("iterations")
            .ok_or_else(|| GraphError::InvalidConfig {
                node: spec.name.clone(),
                reason: "missing or non-integer 'iterations'".to_string(),
            })?;
        Ok(Arc::new(ForNode::new(
            spec.id,
            spec.name.clone(),
            iterations,
            error_policy(spec)?,
        )))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::For
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Repeat the loop branch a fixed number of times".to_string(),
            category: "control".to_string(),
        }
    }
}

/// Runs the `loop` body once per element of an evaluated sequence. Arrays
/// iterate their items, objects their entries.
pub struct ForEachNode {
    id: Id,
    name: String,
    items: String,
    policy: ErrorPolicy,
    evaluator: Arc<dyn Evaluator>,
}

impl ForEachNode {
    pub fn new(
        id: Id,
        name: impl Into<String>,
        items: impl Into<String>,
        policy: ErrorPolicy,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            items: items.into(),
            policy,
            evaluator,
        }
    }
}

#[async_trait]
impl Node for ForEachNode {
    fn id(&self) -> Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::ForEach
    }

    async fn run(&self, ctx: &RunContext, req: &FlowRequest) -> Result<Vec<Id>, NodeError> {
        let sequence = {
            let vars = req.vars.read().await;
            self.evaluator.eval(&self.items, &vars)?
        };
        let entries: Vec<(Json, Json)> = match sequence {
            Json::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (json!(i), item))
                .collect(),
            Json::Object(map) => map.into_iter().map(|(k, v)| (Json::String(k), v)).collect(),
            other => {
                return Err(NodeError::InvalidInput {
                    field: self.items.clone(),
                    reason: format!("expected array or object, got {other}"),
                })
            }
        };

        let body = req.edges.targets(self.id, EdgeHandle::Loop).to_vec();
        for (index, (key, value)) in entries.into_iter().enumerate() {
            ctx.check()?;
            req.write_var(
                self.name.clone(),
                json!({ "index": index, "key": key, "value": value }),
            )
            .await;
            if body.is_empty() {
                continue;
            }
            if let Step::Break = iterate(ctx, req, &self.name, &body, self.policy).await? {
                break;
            }
        }
        Ok(req.edges.targets_for(self.id, &EXIT_HANDLES))
    }
}

pub struct ForEachNodeFactory {
    evaluator: Arc<dyn Evaluator>,
}

impl ForEachNodeFactory {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self { evaluator }
    }
}

impl NodeFactory for ForEachNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Arc<dyn Node>, GraphError> {
        let items = spec
            .config_str("items")
            .ok_or_else(|| GraphError::InvalidConfig {
                node: spec.name.clone(),
                reason: "missing 'items'".to_string(),
            })?;
        Ok(Arc::new(ForEachNode::new(
            spec.id,
            spec.name.clone(),
            items,
            error_policy(spec)?,
            self.evaluator.clone(),
        )))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::ForEach
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Repeat the loop branch for each element of a sequence".to_string(),
            category: "control".to_string(),
        }
    }
}
