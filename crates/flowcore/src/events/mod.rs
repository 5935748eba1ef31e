// crates/flowcore/src/events/mod.rs

mod status;

pub use status::{FlowNodeStatus, FlowStatus, FlowStatusSink, NodeState, StatusSink};
