//! Standard node library
//!
//! Built-in node variants. Collaborators that perform I/O or evaluate user
//! code (HTTP transport, expression evaluator, script runner) are injected
//! through [`Collaborators`].

mod condition;
mod eval;
mod http;
mod loops;
mod noop;
mod script;
mod time;

pub use condition::{ConditionNode, ConditionNodeFactory};
pub use eval::{truthy, Evaluator, PathEvaluator};
pub use http::{
    render, HttpClient, HttpRequest, HttpResponse, ReqwestClient, RequestNode, RequestNodeFactory,
    RequestTemplate,
};
pub use loops::{ForEachNode, ForEachNodeFactory, ForNode, ForNodeFactory};
pub use noop::{NoopNode, NoopNodeFactory};
pub use script::{JsNode, JsNodeFactory, ScriptRunner};
pub use time::{DelayNode, DelayNodeFactory};
use flowruntime::NodeRegistry;

use std::sync::Arc;

/// Injected implementations used by the built-in nodes
#[derive(Clone)]
pub struct Collaborators {
    pub http: Arc<dyn HttpClient>,
    pub evaluator: Arc<dyn Evaluator>,
    pub scripts: Option<Arc<dyn ScriptRunner>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            http: Arc::new(ReqwestClient::new()),
            evaluator: Arc::new(PathEvaluator),
            scripts: None,
        }
    }
}

/// Register all standard nodes with default collaborators
pub fn register_all(registry: &mut NodeRegistry) {
    register_with(registry, Collaborators::default());
}

/// Register all standard nodes with the given collaborators
pub fn register_with(registry: &mut NodeRegistry, collaborators: Collaborators) {
    registry.register(Arc::new(NoopNodeFactory::start()));
    registry.register(Arc::new(NoopNodeFactory::plain()));
    registry.register(Arc::new(RequestNodeFactory::new(collaborators.http)));
    registry.register(Arc::new(ConditionNodeFactory::new(collaborators.evaluator.clone())));
    registry.register(Arc::new(ForNodeFactory));
    registry.register(Arc::new(ForEachNodeFactory::new(collaborators.evaluator)));
    registry.register(Arc::new(JsNodeFactory::new(collaborators.scripts)));
    registry.register(Arc::new(DelayNodeFactory));
}
