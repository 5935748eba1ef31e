//! Flow execution runtime
//!
//! Graph preparation, the batch scheduler that runs a prepared graph with
//! bounded fan-out and fan-in synchronization, sub-graph execution for
//! looping nodes, and the node registry.

mod executor;
mod graph;
mod loader;
mod registry;
mod runtime;
mod subgraph;

pub use executor::FlowRunner;
pub use graph::{FlowGraph, GraphBuilder};
pub use loader::{load_flow, LoadError};
pub use registry::{NodeFactory, NodeMetadata, NodeRegistry};
pub use runtime::{FlowRuntime, RunHandle, RunOutcome, RuntimeConfig};
pub use subgraph::run_subgraph;
