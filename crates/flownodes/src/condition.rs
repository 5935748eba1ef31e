use crate::Evaluator;
use async_trait::async_trait;
use flowcore::{
    EdgeHandle, FlowRequest, GraphError, Id, Node, NodeError, NodeKind, NodeSpec, RunContext,
};
use flowruntime::{NodeFactory, NodeMetadata};
use serde_json::json;
use std::sync::Arc;

/// Two-way branch: `then` targets when the expression is truthy, `else`
/// targets otherwise.
pub struct ConditionNode {
    id: Id,
    name: String,
    expression: String,
    evaluator: Arc<dyn Evaluator>,
}

impl ConditionNode {
    pub fn new(
        id: Id,
        name: impl Into<String>,
        expression: impl Into<String>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            expression: expression.into(),
            evaluator,
        }
    }
}

#[async_trait]
impl Node for ConditionNode {
    fn id(&self) -> Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Condition
    }

    async fn run(&self, ctx: &RunContext, req: &FlowRequest) -> Result<Vec<Id>, NodeError> {
        ctx.check()?;
        let result = {
            let vars = req.vars.read().await;
            self.evaluator.eval_bool(&self.expression, &vars)?
        };
        req.write_var(self.name.clone(), json!({ "result": result }))
            .await;

        let handle = if result {
            EdgeHandle::Then
        } else {
            EdgeHandle::Else
        };
        tracing::debug!("Condition {} took {:?}", self.name, handle);
        Ok(req.edges.targets(self.id, handle).to_vec())
    }
}

pub struct ConditionNodeFactory {
    evaluator: Arc<dyn Evaluator>,
}

impl ConditionNodeFactory {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self { evaluator }
    }
}

impl NodeFactory for ConditionNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Arc<dyn Node>, GraphError> {
        let expression = spec
            .config_str("condition")
            .ok_or_else(|| GraphError::InvalidConfig {
                node: spec.name.clone(),
                reason: "missing 'condition'".to_string(),
            })?;
        Ok(Arc::new(ConditionNode::new(
            spec.id,
            spec.name.clone(),
            expression,
            self.evaluator.clone(),
        )))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Condition
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Branch on an expression".to_string(),
            category: "control".to_string(),
        }
    }
}
