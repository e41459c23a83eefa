//! State graph engine — shared-state workflow orchestration.
//!
//! A workflow is a directed graph of named nodes over one shared
//! [`GraphState`]. Each node reads the state and returns a
//! [`StateUpdate`] — new messages to append plus fields to overwrite.
//! Edges are either direct or conditional (a router closure picks a
//! branch label evaluated against the just-updated state).
//!
//! [`GraphBuilder`] assembles and validates the graph; the compiled
//! [`StateGraph`] walks it from the entry node, merging each update and
//! recording a state snapshot per step, until an edge reaches [`END`].

pub mod edge;
pub mod executor;
pub mod node;
pub mod state;

pub use edge::{Edge, Router, END};
pub use executor::{ExecutionResult, GraphBuilder, StateGraph, StepSnapshot};
pub use node::GraphNode;
pub use state::{GraphState, StateUpdate};
