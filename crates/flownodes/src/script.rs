use async_trait::async_trait;
use flowcore::{FlowRequest, GraphError, Id, Node, NodeError, NodeKind, NodeSpec, RunContext, VarMap};
use flowruntime::{NodeFactory, NodeMetadata};
use serde_json::Value as Json;
use std::sync::Arc;

/// Runs user scripts for `js` nodes. The engine has no embedded
/// interpreter; hosts inject one.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Execute `code` against a snapshot of the run's variables and return
    /// the script's result.
    async fn run(&self, code: &str, vars: VarMap) -> Result<Json, NodeError>;
}

/// Executes a script and stores its result under the node name.
pub struct JsNode {
    id: Id,
    name: String,
    code: String,
    runner: Option<Arc<dyn ScriptRunner>>,
}

impl JsNode {
    pub fn new(
        id: Id,
        name: impl Into<String>,
        code: impl Into<String>,
        runner: Option<Arc<dyn ScriptRunner>>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            code: code.into(),
            runner,
        }
    }
}

#[async_trait]
impl Node for JsNode {
    fn id(&self) -> Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Js
    }

    async fn run(&self, ctx: &RunContext, req: &FlowRequest) -> Result<Vec<Id>, NodeError> {
        let runner = self
            .runner
            .as_ref()
            .ok_or_else(|| NodeError::Configuration("no script runner configured".to_string()))?;
        let vars = req.snapshot().await;

        let value = tokio::select! {
            value = runner.run(&self.code, vars) => value?,
            _ = ctx.done() => {
                ctx.check()?;
                return Err(NodeError::Canceled);
            }
        };
        req.write_var(self.name.clone(), value).await;
        Ok(req.edges.all_targets(self.id))
    }
}

pub struct JsNodeFactory {
    runner: Option<Arc<dyn ScriptRunner>>,
}

impl JsNodeFactory {
    pub fn new(runner: Option<Arc<dyn ScriptRunner>>) -> Self {
        Self { runner }
    }
}

impl NodeFactory for JsNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Arc<dyn Node>, GraphError> {
        let code = spec.config_str("code").ok_or_else(|| GraphError::InvalidConfig {
            node: spec.name.clone(),
            reason: "missing 'code'".to_string(),
        })?;
        Ok(Arc::new(JsNode::new(
            spec.id,
            spec.name.clone(),
            code,
            self.runner.clone(),
        )))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Js
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Run a user script through the host's script runner".to_string(),
            category: "script".to_string(),
        }
    }
}
