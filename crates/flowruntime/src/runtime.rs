use crate::{registry::NodeRegistry, FlowGraph, FlowRunner};
use flowcore::{
    FlowError, FlowNodeStatus, FlowSpec, FlowStatus, FlowStatusSink, RunContext, StatusSink,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Main runtime: a node registry plus a runner sharing one configuration
pub struct FlowRuntime {
    registry: Arc<NodeRegistry>,
    runner: FlowRunner,
}

impl FlowRuntime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(NodeRegistry::new()), config)
    }

    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        Self {
            registry,
            runner: FlowRunner::with_config(config),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        self.runner.config()
    }

    /// Validate a flow document into a runnable graph
    pub fn prepare(&self, spec: &FlowSpec) -> Result<FlowGraph, FlowError> {
        Ok(self.registry.prepare(spec)?)
    }

    /// Start running `graph` on a new task and hand back the two streams.
    pub fn start(&self, ctx: RunContext, graph: FlowGraph) -> RunHandle {
        let config = self.config();
        let (status, statuses) = StatusSink::channel(config.status_buffer);
        let (flow_status, flow_statuses) = FlowStatusSink::channel(config.flow_status_buffer);
        let runner = self.runner.clone();
        let task = tokio::spawn(async move { runner.run(&ctx, &graph, status, flow_status).await });
        RunHandle {
            statuses,
            flow_statuses,
            task,
        }
    }

    /// Prepare and start a flow document
    pub fn execute(&self, ctx: RunContext, spec: &FlowSpec) -> Result<RunHandle, FlowError> {
        let graph = self.prepare(spec)?;
        Ok(self.start(ctx, graph))
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Streams and completion of a started run
pub struct RunHandle {
    pub statuses: mpsc::Receiver<FlowNodeStatus>,
    pub flow_statuses: mpsc::Receiver<FlowStatus>,
    pub task: JoinHandle<Result<(), FlowError>>,
}

impl RunHandle {
    /// Drain both streams until they close, then return everything observed.
    pub async fn collect(mut self) -> RunOutcome {
        let mut statuses = Vec::new();
        let mut flow_statuses = Vec::new();
        let (mut node_open, mut flow_open) = (true, true);
        while node_open || flow_open {
            tokio::select! {
                next = self.statuses.recv(), if node_open => match next {
                    Some(status) => statuses.push(status),
                    None => node_open = false,
                },
                next = self.flow_statuses.recv(), if flow_open => match next {
                    Some(status) => flow_statuses.push(status),
                    None => flow_open = false,
                },
            }
        }
        let result = match self.task.await {
            Ok(result) => result,
            Err(e) => Err(FlowError::Join(e.to_string())),
        };
        RunOutcome {
            statuses,
            flow_statuses,
            result,
        }
    }
}

/// Everything a run emitted, in arrival order
#[derive(Debug)]
pub struct RunOutcome {
    pub statuses: Vec<FlowNodeStatus>,
    pub flow_statuses: Vec<FlowStatus>,
    pub result: Result<(), FlowError>,
}

impl RunOutcome {
    /// Terminal flow status, if one was emitted
    pub fn terminal(&self) -> Option<FlowStatus> {
        self.flow_statuses.iter().copied().find(FlowStatus::is_terminal)
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Ready nodes started per batch
    pub max_concurrency: usize,
    /// Node status channel capacity
    pub status_buffer: usize,
    /// Flow status channel capacity
    pub flow_status_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            status_buffer: 100,
            flow_status_buffer: 8,
        }
    }
}
