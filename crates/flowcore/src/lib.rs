//! Core abstractions for the flow engine
//!
//! Identifiers, the node capability trait, edges and the per-run request and
//! status types shared by the runner, the built-in nodes and the store.

mod edge;
mod error;
pub mod events;
mod id;
mod node;
mod request;
mod workflow;

pub use edge::{Edge, EdgeHandle, EdgesMap};
pub use error::{FlowError, GraphError, NodeError};
pub use events::*;
pub use id::Id;
pub use node::{Node, NodeKind, RunContext};
pub use request::{lookup_path, FlowRequest, NodeMap, PendingCounters, VarMap};
pub use workflow::{ErrorPolicy, FlowId, FlowSpec, NodeId, NodeSpec};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
