use flowcore::{FlowError, FlowRequest, GraphError, Id, NodeError, RunContext};
use std::collections::{HashMap, HashSet, VecDeque};

/// Run the part of the graph reachable from `entries` to completion, one
/// node at a time, on the caller's task.
///
/// Looping nodes use this for their `loop` body. Fan-in inside the body
/// waits for every predecessor that is itself part of the body. Status events
/// go to the request's sink like those of the main scheduler.
pub async fn run_subgraph(
    ctx: &RunContext,
    req: &FlowRequest,
    entries: &[Id],
) -> Result<(), FlowError> {
    let mut pending = body_in_degrees(req, entries)?;
    let mut queue: VecDeque<Id> = entries.iter().copied().collect();

    while let Some(id) = queue.pop_front() {
        if let Err(e) = ctx.check() {
            return Err(interrupted(e));
        }
        let node = req
            .node(id)
            .cloned()
            .ok_or(GraphError::NodeNotFound(id))?;

        if !node.kind().is_silent() {
            req.status.running(node.id(), node.name()).await;
        }
        let next_ids = match node.run(ctx, req).await {
            Ok(next_ids) => next_ids,
            Err(e) => {
                if let Err(stop) = ctx.check() {
                    if !node.kind().is_silent() {
                        req.status.canceled(node.id(), node.name()).await;
                    }
                    return Err(interrupted(stop));
                }
                req.status.failure(node.id(), node.name(), &e).await;
                return Err(FlowError::Node {
                    node_id: node.id(),
                    source: e,
                });
            }
        };
        if !node.kind().is_silent() {
            let output = req.read_var(node.name()).await;
            req.status.success(node.id(), node.name(), output).await;
        }

        for next in next_ids {
            if !req.node_map.contains_key(&next) {
                return Err(GraphError::NodeNotFound(next).into());
            }
            match pending.get_mut(&next) {
                Some(count) if *count > 1 => *count -= 1,
                _ => {
                    pending.remove(&next);
                    queue.push_back(next);
                }
            }
        }
    }
    Ok(())
}

fn interrupted(e: NodeError) -> FlowError {
    match e {
        NodeError::Timeout => FlowError::DeadlineExceeded,
        _ => FlowError::Canceled,
    }
}

/// In-degrees of body nodes, counting only edges whose source is in the body.
fn body_in_degrees(req: &FlowRequest, entries: &[Id]) -> Result<HashMap<Id, u32>, GraphError> {
    let mut body = HashSet::new();
    let mut frontier: Vec<Id> = entries.to_vec();
    while let Some(id) = frontier.pop() {
        if !req.node_map.contains_key(&id) {
            return Err(GraphError::NodeNotFound(id));
        }
        if body.insert(id) {
            frontier.extend(req.edges.all_targets(id));
        }
    }

    let mut degrees = HashMap::new();
    for source in &body {
        for target in req.edges.all_targets(*source) {
            *degrees.entry(target).or_insert(0u32) += 1;
        }
    }
    degrees.retain(|_, degree| *degree > 1);
    Ok(degrees)
}
