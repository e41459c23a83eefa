use futures::future::BoxFuture;

use epistle_core::error::Result;

use super::state::{GraphState, StateUpdate};

/// A unit of work in the graph.
///
/// A node receives a snapshot of the shared state and returns the partial
/// update it wants merged. Nodes never mutate the state directly and never
/// see a partially merged state: the executor owns the merge.
///
/// An error return aborts the run with nothing merged for that step.
pub trait GraphNode: Send + Sync + 'static {
    fn run(&self, state: GraphState) -> BoxFuture<'_, Result<StateUpdate>>;
}
