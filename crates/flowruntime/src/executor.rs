use crate::{FlowGraph, RuntimeConfig};
use flowcore::{
    FlowError, FlowRequest, FlowStatus, FlowStatusSink, GraphError, Id, Node, NodeError,
    RunContext, StatusSink,
};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

type WorkerResult = Option<(Arc<dyn Node>, Result<Vec<Id>, NodeError>)>;

/// Executes a [`FlowGraph`] in batches of at most `max_concurrency` ready
/// nodes.
///
/// One coordinator owns the queue and the fan-in counters; the nodes of a
/// batch run on worker tasks that all join before the next batch starts.
#[derive(Debug, Clone)]
pub struct FlowRunner {
    config: RuntimeConfig,
}

impl FlowRunner {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Run `graph` to completion.
    ///
    /// `flow_status` receives `Starting` and then exactly one terminal
    /// status. Both sinks are dropped on return, which closes the streams
    /// once no other clone is alive.
    pub async fn run(
        &self,
        ctx: &RunContext,
        graph: &FlowGraph,
        status: StatusSink,
        flow_status: FlowStatusSink,
    ) -> Result<(), FlowError> {
        let started = Instant::now();
        flow_status.send(FlowStatus::Starting).await;
        tracing::info!("Starting flow {} (graph {})", graph.flow_id, graph.id);

        let req = graph.request(status);
        let result = self.schedule(ctx, &req, graph.start_id).await;
        drop(req);

        let terminal = match &result {
            Ok(()) => FlowStatus::Success,
            Err(e) => e.status(),
        };
        match &result {
            Ok(()) => tracing::info!(
                "Flow {} succeeded in {}ms",
                graph.flow_id,
                started.elapsed().as_millis()
            ),
            Err(e) => tracing::warn!(
                "Flow {} ended {:?} after {}ms: {}",
                graph.flow_id,
                terminal,
                started.elapsed().as_millis(),
                e
            ),
        }
        flow_status.send(terminal).await;
        result
    }

    async fn schedule(
        &self,
        ctx: &RunContext,
        req: &FlowRequest,
        start: Id,
    ) -> Result<(), FlowError> {
        let max_concurrency = self.config.max_concurrency.max(1);
        let mut queue = VecDeque::from([start]);

        while !queue.is_empty() {
            if ctx.is_canceled() {
                return Err(cancel_error(ctx));
            }

            let batch_size = max_concurrency.min(queue.len());
            let batch: Vec<Id> = queue.drain(..batch_size).collect();
            tracing::debug!("Running batch of {} ({} queued)", batch.len(), queue.len());

            let batch_len = batch.len();
            let batch_ctx = match req.timeout {
                Some(timeout) => ctx.with_timeout(timeout),
                None => ctx.child(),
            };

            let nodes = batch
                .iter()
                .map(|id| req.node(*id).cloned().ok_or(GraphError::NodeNotFound(*id)))
                .collect::<Result<Vec<_>, _>>()?;

            let mut running = FuturesUnordered::new();
            for node in &nodes {
                if !node.kind().is_silent() {
                    req.status.running(node.id(), node.name()).await;
                }
                running.push(spawn_worker(node.clone(), batch_ctx.clone(), req.clone()));
            }

            let mut results = Vec::with_capacity(batch_len);
            let mut cut_short = false;
            loop {
                tokio::select! {
                    biased;
                    joined = running.next() => match joined {
                        None => break,
                        Some(Ok(Some(result))) => results.push(result),
                        Some(Ok(None)) => {}
                        Some(Err(join_err)) => {
                            tracing::error!("Worker task failed: {}", join_err);
                            batch_ctx.cancel();
                            drain(&mut running).await;
                            return Err(FlowError::Join(join_err.to_string()));
                        }
                    },
                    _ = batch_ctx.done() => {
                        cut_short = true;
                        break;
                    }
                }
            }

            // Workers that saw the batch end return no result, so a short
            // batch is interrupted even when every worker has already joined.
            if cut_short || results.len() < batch_len {
                batch_ctx.cancel();
                drain(&mut running).await;
                let err = if ctx.is_canceled() {
                    FlowError::Canceled
                } else {
                    FlowError::DeadlineExceeded
                };
                tracing::warn!("Batch interrupted: {}", err);
                for node in nodes.iter().filter(|n| !n.kind().is_silent()) {
                    req.status.canceled(node.id(), node.name()).await;
                }
                return Err(err);
            }

            let mut first_failure = None;
            for (node, result) in results {
                match result {
                    Err(e) => {
                        tracing::error!("Node {} ({}) failed: {}", node.name(), node.id(), e);
                        req.status.failure(node.id(), node.name(), &e).await;
                        first_failure.get_or_insert(FlowError::Node {
                            node_id: node.id(),
                            source: e,
                        });
                    }
                    Ok(next_ids) => {
                        if !node.kind().is_silent() {
                            let output = req.read_var(node.name()).await;
                            req.status.success(node.id(), node.name(), output).await;
                        }
                        if first_failure.is_some() {
                            continue;
                        }
                        for next in next_ids {
                            if !req.node_map.contains_key(&next) {
                                return Err(GraphError::NodeNotFound(next).into());
                            }
                            if req.pending.arrive(next) {
                                queue.push_back(next);
                            }
                        }
                    }
                }
            }
            if let Some(err) = first_failure {
                return Err(err);
            }
        }

        Ok(())
    }
}

impl Default for FlowRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_worker(node: Arc<dyn Node>, ctx: RunContext, req: FlowRequest) -> JoinHandle<WorkerResult> {
    tokio::spawn(async move {
        let result = tokio::select! {
            biased;
            _ = ctx.done() => return None,
            result = node.run(&ctx, &req) => result,
        };
        if ctx.is_canceled() || ctx.deadline_passed() {
            return None;
        }
        Some((node, result))
    })
}

async fn drain(running: &mut FuturesUnordered<JoinHandle<WorkerResult>>) {
    while running.next().await.is_some() {}
}

fn cancel_error(ctx: &RunContext) -> FlowError {
    if ctx.deadline_passed() {
        FlowError::DeadlineExceeded
    } else {
        FlowError::Canceled
    }
}
