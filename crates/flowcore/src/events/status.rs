use crate::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Lifecycle state reported for a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Running,
    Success,
    Failure,
    Canceled,
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NodeState::Running)
    }
}

/// Per-node status event streamed while a flow runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNodeStatus {
    pub node_id: Id,
    pub name: String,
    pub state: NodeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Flow-level status: `Starting` first, then exactly one terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Starting,
    Success,
    Failed,
    Canceled,
}

impl FlowStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FlowStatus::Starting)
    }
}

/// Send side of the node status stream.
///
/// Sends wait for buffer room, so a consumer that stops draining stalls the
/// sender. A dropped receiver is not an error: events are discarded.
#[derive(Debug, Clone)]
pub struct StatusSink {
    sender: mpsc::Sender<FlowNodeStatus>,
}

impl StatusSink {
    pub fn new(sender: mpsc::Sender<FlowNodeStatus>) -> Self {
        Self { sender }
    }

    /// Sink plus receiver over a fresh bounded channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<FlowNodeStatus>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(sender), receiver)
    }

    pub async fn send(&self, status: FlowNodeStatus) {
        if self.sender.send(status).await.is_err() {
            tracing::trace!("status receiver dropped, discarding event");
        }
    }

    pub async fn running(&self, node_id: Id, name: &str) {
        self.send(Self::event(node_id, name, NodeState::Running)).await;
    }

    pub async fn success(&self, node_id: Id, name: &str, output: Option<serde_json::Value>) {
        let mut status = Self::event(node_id, name, NodeState::Success);
        status.output = output;
        self.send(status).await;
    }

    pub async fn failure(&self, node_id: Id, name: &str, error: impl ToString) {
        let mut status = Self::event(node_id, name, NodeState::Failure);
        status.error = Some(error.to_string());
        self.send(status).await;
    }

    pub async fn canceled(&self, node_id: Id, name: &str) {
        self.send(Self::event(node_id, name, NodeState::Canceled)).await;
    }

    fn event(node_id: Id, name: &str, state: NodeState) -> FlowNodeStatus {
        FlowNodeStatus {
            node_id,
            name: name.to_string(),
            state,
            output: None,
            error: None,
            timestamp: Utc::now(),
        }
    }
}

/// Send side of the flow status stream.
#[derive(Debug, Clone)]
pub struct FlowStatusSink {
    sender: mpsc::Sender<FlowStatus>,
}

impl FlowStatusSink {
    pub fn new(sender: mpsc::Sender<FlowStatus>) -> Self {
        Self { sender }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<FlowStatus>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(sender), receiver)
    }

    pub async fn send(&self, status: FlowStatus) {
        if self.sender.send(status).await.is_err() {
            tracing::trace!("flow status receiver dropped, discarding {:?}", status);
        }
    }
}
