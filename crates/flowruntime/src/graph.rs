use flowcore::{
    Edge, EdgesMap, FlowRequest, GraphError, Id, Node, NodeKind, NodeMap, StatusSink, VarMap,
};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Immutable, validated graph ready to run.
#[derive(Clone)]
pub struct FlowGraph {
    pub id: Id,
    pub flow_id: Id,
    pub start_id: Id,
    pub nodes: Arc<NodeMap>,
    pub edges: Arc<EdgesMap>,
    pub timeout: Option<Duration>,
    pub variables: VarMap,
    in_degrees: HashMap<Id, u32>,
}

impl FlowGraph {
    /// Fresh per-run request: new var map seeded from the graph's variables
    /// and pending counters initialised for fan-in nodes.
    pub fn request(&self, status: StatusSink) -> FlowRequest {
        let req = FlowRequest::new(self.nodes.clone(), self.edges.clone(), status)
            .with_vars(self.variables.clone())
            .with_timeout(self.timeout);
        req.pending.init(&self.in_degrees);
        req
    }
}

impl std::fmt::Debug for FlowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowGraph")
            .field("id", &self.id)
            .field("flow_id", &self.flow_id)
            .field("start_id", &self.start_id)
            .field("nodes", &self.nodes.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Collects nodes and edges and validates them into a [`FlowGraph`].
pub struct GraphBuilder {
    flow_id: Id,
    start: Option<Id>,
    timeout: Option<Duration>,
    nodes: Vec<Arc<dyn Node>>,
    edges: Vec<Edge>,
    variables: VarMap,
}

impl GraphBuilder {
    pub fn new(flow_id: Id) -> Self {
        Self {
            flow_id,
            start: None,
            timeout: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            variables: VarMap::new(),
        }
    }

    pub fn node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn nodes(mut self, nodes: impl IntoIterator<Item = Arc<dyn Node>>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    pub fn edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn edges(mut self, edges: impl IntoIterator<Item = Edge>) -> Self {
        self.edges.extend(edges);
        self
    }

    pub fn start(mut self, start: Id) -> Self {
        self.start = Some(start);
        self
    }

    /// Per-batch timeout; zero disables it.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn variables(mut self, variables: VarMap) -> Self {
        self.variables = variables;
        self
    }

    pub fn build(self) -> Result<FlowGraph, GraphError> {
        let mut node_map = NodeMap::new();
        let mut names = HashSet::new();
        for node in self.nodes {
            if !names.insert(node.name().to_string()) {
                return Err(GraphError::DuplicateNodeName(node.name().to_string()));
            }
            node_map.insert(node.id(), node);
        }

        for edge in &self.edges {
            if edge.flow_id != self.flow_id {
                return Err(GraphError::CrossFlowEdge {
                    edge_id: edge.id,
                    edge_flow: edge.flow_id,
                    graph_flow: self.flow_id,
                });
            }
            for end in [edge.source_id, edge.target_id] {
                if !node_map.contains_key(&end) {
                    return Err(GraphError::NodeNotFound(end));
                }
            }
        }

        check_acyclic(&node_map, &self.edges)?;
        let start_id = resolve_start(self.start, &node_map)?;

        let edges = EdgesMap::from_edges(&self.edges);
        let in_degrees = edges.in_degrees();

        tracing::debug!(
            "Prepared flow {}: {} nodes, {} edges, start {}",
            self.flow_id,
            node_map.len(),
            self.edges.len(),
            start_id
        );

        Ok(FlowGraph {
            id: Id::now(),
            flow_id: self.flow_id,
            start_id,
            nodes: Arc::new(node_map),
            edges: Arc::new(edges),
            timeout: self.timeout,
            variables: self.variables,
            in_degrees,
        })
    }
}

fn check_acyclic(nodes: &NodeMap, edges: &[Edge]) -> Result<(), GraphError> {
    let mut graph: DiGraph<Id, ()> = DiGraph::new();
    let index: HashMap<Id, NodeIndex> = nodes.keys().map(|id| (*id, graph.add_node(*id))).collect();
    for edge in edges {
        let (Some(from), Some(to)) = (index.get(&edge.source_id), index.get(&edge.target_id)) else {
            return Err(GraphError::NodeNotFound(edge.source_id));
        };
        graph.add_edge(*from, *to, ());
    }
    toposort(&graph, None)
        .map(|_| ())
        .map_err(|_| GraphError::CyclicDependency)
}

fn resolve_start(explicit: Option<Id>, nodes: &NodeMap) -> Result<Id, GraphError> {
    if let Some(start) = explicit {
        return if nodes.contains_key(&start) {
            Ok(start)
        } else {
            Err(GraphError::NodeNotFound(start))
        };
    }
    let mut starts = nodes
        .values()
        .filter(|n| n.kind() == NodeKind::NoopStart)
        .map(|n| n.id());
    match (starts.next(), starts.next()) {
        (Some(start), None) => Ok(start),
        (None, _) => Err(GraphError::MissingStart("no noop-start node".to_string())),
        (Some(_), Some(_)) => Err(GraphError::MissingStart(
            "several noop-start nodes, pick one explicitly".to_string(),
        )),
    }
}
