use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use epistle_core::error::{EpistleError, Result};

use super::edge::{Edge, END};
use super::node::GraphNode;
use super::state::GraphState;

/// Assembles a [`StateGraph`].
///
/// `compile` validates the wiring: the entry point must name a node, and
/// every edge target must be a node or [`END`]. Construction bugs surface
/// here instead of mid-run.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: HashMap<String, Arc<dyn GraphNode>>,
    edges: HashMap<String, Edge>,
    entry: Option<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(mut self, name: impl Into<String>, node: impl GraphNode) -> Self {
        self.nodes.insert(name.into(), Arc::new(node));
        self
    }

    /// Add an unconditional edge. `to` may be [`END`].
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.insert(from.into(), Edge::direct(to));
        self
    }

    /// Add a conditional edge: after `from` runs, `router` picks a branch
    /// label which the branch table maps to a target node (or [`END`]).
    pub fn add_conditional_edges<F>(
        mut self,
        from: impl Into<String>,
        router: F,
        branches: &[(&str, &str)],
    ) -> Self
    where
        F: Fn(&GraphState) -> String + Send + Sync + 'static,
    {
        self.edges
            .insert(from.into(), Edge::conditional(router, branches));
        self
    }

    pub fn set_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    pub fn compile(self) -> Result<StateGraph> {
        let entry = self
            .entry
            .ok_or_else(|| EpistleError::Graph("no entry point set".into()))?;

        if !self.nodes.contains_key(&entry) {
            return Err(EpistleError::Graph(format!(
                "entry point '{}' is not a node",
                entry
            )));
        }

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(EpistleError::Graph(format!(
                    "edge out of unknown node '{}'",
                    from
                )));
            }
            for target in edge.targets() {
                if target != END && !self.nodes.contains_key(target) {
                    return Err(EpistleError::Graph(format!(
                        "edge from '{}' to unknown node '{}'",
                        from, target
                    )));
                }
            }
        }

        Ok(StateGraph {
            nodes: self.nodes,
            edges: self.edges,
            entry,
        })
    }
}

/// State after one completed node.
#[derive(Debug, Clone)]
pub struct StepSnapshot {
    /// Which node just ran.
    pub node: String,
    /// The state with that node's update merged.
    pub state: GraphState,
}

/// Result of a full graph run.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Per-node snapshots in execution order.
    pub steps: Vec<StepSnapshot>,
    /// The final state.
    pub state: GraphState,
}

/// A compiled, runnable graph.
pub struct StateGraph {
    nodes: HashMap<String, Arc<dyn GraphNode>>,
    edges: HashMap<String, Edge>,
    entry: String,
}

impl std::fmt::Debug for StateGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateGraph")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.edges.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .finish()
    }
}

impl StateGraph {
    /// Walk the graph from the entry node.
    ///
    /// One node runs at a time. Each node's update is merged atomically
    /// after it returns `Ok`; a node error propagates with nothing merged
    /// for that step. A node with no outgoing edge terminates the run, as
    /// does any edge reaching [`END`]. There is no retry here.
    pub async fn run(&self, initial: GraphState) -> Result<ExecutionResult> {
        let mut state = initial;
        let mut steps = Vec::new();
        let mut current = self.entry.clone();

        loop {
            let node = self.nodes.get(&current).ok_or_else(|| {
                EpistleError::Graph(format!("node '{}' not found in graph", current))
            })?;

            debug!(node = %current, "Executing graph node");
            let update = node.run(state.clone()).await?;
            state.apply(update);

            steps.push(StepSnapshot {
                node: current.clone(),
                state: state.clone(),
            });

            let next = match self.edges.get(&current) {
                Some(Edge::Direct(to)) => to.clone(),
                Some(Edge::Conditional { router, branches }) => {
                    let label = router(&state);
                    match branches.get(&label) {
                        Some(target) => target.clone(),
                        None => {
                            return Err(EpistleError::Routing {
                                node: current,
                                label,
                            });
                        }
                    }
                }
                None => {
                    debug!(node = %current, "No outgoing edge, graph complete");
                    break;
                }
            };

            if next == END {
                break;
            }
            current = next;
        }

        Ok(ExecutionResult { steps, state })
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;

    use epistle_core::error::Result as CoreResult;
    use epistle_core::types::ChatMessage;

    use super::*;
    use crate::graph::state::StateUpdate;

    /// Appends its own name to a "trace" field.
    struct TraceNode(&'static str);

    impl GraphNode for TraceNode {
        fn run(&self, state: GraphState) -> BoxFuture<'_, CoreResult<StateUpdate>> {
            Box::pin(async move {
                let trace = match state.get_str("trace") {
                    Some(prev) => format!("{},{}", prev, self.0),
                    None => self.0.to_string(),
                };
                Ok(StateUpdate::field_str("trace", trace))
            })
        }
    }

    /// Fails unconditionally.
    struct FailingNode;

    impl GraphNode for FailingNode {
        fn run(&self, _state: GraphState) -> BoxFuture<'_, CoreResult<StateUpdate>> {
            Box::pin(async { Err(EpistleError::LlmRequest("boom".into())) })
        }
    }

    /// Appends one message per visit so a router can count visits.
    struct TickNode;

    impl GraphNode for TickNode {
        fn run(&self, _state: GraphState) -> BoxFuture<'_, CoreResult<StateUpdate>> {
            Box::pin(async { Ok(StateUpdate::message(ChatMessage::assistant_text("tick"))) })
        }
    }

    #[tokio::test]
    async fn test_linear_graph_visits_in_order_and_halts() {
        let graph = GraphBuilder::new()
            .add_node("a", TraceNode("a"))
            .add_node("b", TraceNode("b"))
            .add_node("c", TraceNode("c"))
            .set_entry_point("a")
            .add_edge("a", "b")
            .add_edge("b", "c")
            .add_edge("c", END)
            .compile()
            .unwrap();

        let result = graph.run(GraphState::new()).await.unwrap();
        let visited: Vec<&str> = result.steps.iter().map(|s| s.node.as_str()).collect();
        assert_eq!(visited, vec!["a", "b", "c"]);
        assert_eq!(result.state.get_str("trace"), Some("a,b,c"));
    }

    #[tokio::test]
    async fn test_snapshot_per_step() {
        let graph = GraphBuilder::new()
            .add_node("a", TraceNode("a"))
            .add_node("b", TraceNode("b"))
            .set_entry_point("a")
            .add_edge("a", "b")
            .add_edge("b", END)
            .compile()
            .unwrap();

        let result = graph.run(GraphState::new()).await.unwrap();
        assert_eq!(result.steps[0].state.get_str("trace"), Some("a"));
        assert_eq!(result.steps[1].state.get_str("trace"), Some("a,b"));
    }

    #[tokio::test]
    async fn test_conditional_cycle_until_router_ends() {
        // tick cycles back onto itself until two messages have accumulated.
        let graph = GraphBuilder::new()
            .add_node("tick", TickNode)
            .set_entry_point("tick")
            .add_conditional_edges(
                "tick",
                |s: &GraphState| {
                    if s.messages().len() < 2 {
                        "again".into()
                    } else {
                        "end".into()
                    }
                },
                &[("again", "tick"), ("end", END)],
            )
            .compile()
            .unwrap();

        let result = graph.run(GraphState::new()).await.unwrap();
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.state.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_branch_label_is_routing_error() {
        let graph = GraphBuilder::new()
            .add_node("a", TraceNode("a"))
            .set_entry_point("a")
            .add_conditional_edges("a", |_s: &GraphState| "nowhere".into(), &[("end", END)])
            .compile()
            .unwrap();

        let err = graph.run(GraphState::new()).await.unwrap_err();
        match err {
            EpistleError::Routing { node, label } => {
                assert_eq!(node, "a");
                assert_eq!(label, "nowhere");
            }
            other => panic!("expected routing error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_node_error_propagates_without_merging() {
        let graph = GraphBuilder::new()
            .add_node("a", TraceNode("a"))
            .add_node("bad", FailingNode)
            .set_entry_point("a")
            .add_edge("a", "bad")
            .add_edge("bad", END)
            .compile()
            .unwrap();

        let err = graph.run(GraphState::new()).await.unwrap_err();
        assert!(matches!(err, EpistleError::LlmRequest(_)));
    }

    #[tokio::test]
    async fn test_node_without_outgoing_edge_terminates() {
        let graph = GraphBuilder::new()
            .add_node("only", TraceNode("only"))
            .set_entry_point("only")
            .compile()
            .unwrap();

        let result = graph.run(GraphState::new()).await.unwrap();
        assert_eq!(result.steps.len(), 1);
    }

    #[test]
    fn test_compile_rejects_missing_entry() {
        let err = GraphBuilder::new()
            .add_node("a", TraceNode("a"))
            .compile()
            .unwrap_err();
        assert!(matches!(err, EpistleError::Graph(_)));
    }

    #[test]
    fn test_compile_rejects_unknown_entry() {
        let err = GraphBuilder::new()
            .add_node("a", TraceNode("a"))
            .set_entry_point("missing")
            .compile()
            .unwrap_err();
        assert!(matches!(err, EpistleError::Graph(_)));
    }

    #[test]
    fn test_compile_rejects_edge_to_unknown_node() {
        let err = GraphBuilder::new()
            .add_node("a", TraceNode("a"))
            .set_entry_point("a")
            .add_edge("a", "ghost")
            .compile()
            .unwrap_err();
        assert!(matches!(err, EpistleError::Graph(_)));
    }
}
