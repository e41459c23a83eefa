pub mod email;
pub mod graph;
pub mod roleplay;

#[cfg(test)]
pub(crate) mod testing;

pub use graph::{GraphBuilder, GraphNode, GraphState, StateGraph, StateUpdate, END};
