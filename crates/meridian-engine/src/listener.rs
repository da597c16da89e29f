//! Execution listeners.
//!
//! A listener observes node dispatch and completion. Callbacks run on the
//! thread that triggers them (workers for node events, the executor's
//! calling thread for graph events) and must not block for long. A panic
//! inside a callback is caught and logged; it does not affect the node or
//! graph being reported.

use std::fmt;

use meridian_traits::ComputationTarget;

use crate::node::NodeId;
use crate::state::NodeExecutionState;

/// Observer of executor progress.
pub trait ExecutionListener: Send + Sync + fmt::Debug {
    /// A graph is about to be executed.
    fn on_graph_started(&self, _target: &ComputationTarget, _node_count: usize) {}

    /// A node was handed to a worker.
    fn on_node_dispatched(&self, _node: NodeId, _job_id: u64) {}

    /// A node reached a terminal state.
    fn on_node_completed(&self, _node: NodeId, _state: NodeExecutionState) {}

    /// A graph finished executing.
    fn on_graph_completed(&self, _target: &ComputationTarget) {}
}

/// Listener that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl ExecutionListener for NoopListener {}
