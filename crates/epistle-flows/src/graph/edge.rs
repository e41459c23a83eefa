use std::collections::HashMap;
use std::sync::Arc;

use super::state::GraphState;

/// Terminal sentinel. Routing to `END` stops the run. Not a node name.
pub const END: &str = "__end__";

/// Routing function for conditional edges: state in, branch label out.
pub type Router = Arc<dyn Fn(&GraphState) -> String + Send + Sync>;

/// Outgoing edge of a node.
pub enum Edge {
    /// Unconditional successor (a node name or [`END`]).
    Direct(String),
    /// Router evaluated against the just-updated state; the produced label
    /// is looked up in the branch table. An unknown label is a run error.
    Conditional {
        router: Router,
        branches: HashMap<String, String>,
    },
}

impl Edge {
    pub fn direct(to: impl Into<String>) -> Self {
        Self::Direct(to.into())
    }

    pub fn conditional<F>(router: F, branches: &[(&str, &str)]) -> Self
    where
        F: Fn(&GraphState) -> String + Send + Sync + 'static,
    {
        Self::Conditional {
            router: Arc::new(router),
            branches: branches
                .iter()
                .map(|(label, target)| (label.to_string(), target.to_string()))
                .collect(),
        }
    }

    /// Every node name this edge can reach (branch targets or the direct
    /// successor), used for compile-time validation.
    pub(crate) fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Direct(to) => vec![to.as_str()],
            Edge::Conditional { branches, .. } => {
                branches.values().map(|t| t.as_str()).collect()
            }
        }
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct(to) => f.debug_tuple("Direct").field(to).finish(),
            Edge::Conditional { branches, .. } => f
                .debug_struct("Conditional")
                .field("branches", branches)
                .finish(),
        }
    }
}
