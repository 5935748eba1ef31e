use crate::{FlowStatus, Id};
use thiserror::Error;

/// Terminal error of a flow run.
#[derive(Error, Debug, Clone)]
pub enum FlowError {
    #[error("Node {node_id} failed: {source}")]
    Node {
        node_id: Id,
        #[source]
        source: NodeError,
    },

    #[error("Invalid graph: {0}")]
    Graph(#[from] GraphError),

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Canceled")]
    Canceled,

    #[error("Worker task failed: {0}")]
    Join(String),
}

impl FlowError {
    /// Terminal flow status reported for this error.
    pub fn status(&self) -> FlowStatus {
        match self {
            FlowError::Canceled => FlowStatus::Canceled,
            _ => FlowStatus::Failed,
        }
    }
}

/// Failure raised inside a node's `run`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing variable: {0}")]
    MissingVariable(String),

    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Timed out")]
    Timeout,

    #[error("Canceled")]
    Canceled,
}

/// Graph preparation failures. These are validation errors and are never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Edge {edge_id} belongs to flow {edge_flow}, graph is flow {graph_flow}")]
    CrossFlowEdge {
        edge_id: Id,
        edge_flow: Id,
        graph_flow: Id,
    },

    #[error("Cyclic dependency detected")]
    CyclicDependency,

    #[error("Node not found: {0}")]
    NodeNotFound(Id),

    #[error("Missing start node: {0}")]
    MissingStart(String),

    #[error("Duplicate node name in flow: {0}")]
    DuplicateNodeName(String),

    #[error("Unknown node kind: {0}")]
    UnknownNodeKind(String),

    #[error("Invalid config for node '{node}': {reason}")]
    InvalidConfig { node: String, reason: String },
}
