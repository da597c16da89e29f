//! Per-cycle node execution state.
//!
//! State lives in a slot array parallel to the model's node arena, one
//! atomic per node. Every transition is a compare-and-swap, so a node
//! reaches exactly one terminal state exactly once, and membership checks
//! never wait on unrelated transitions.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use meridian_traits::ValueSpecification;

use crate::error::{EngineError, EngineResult};
use crate::node::NodeId;

/// Execution state of one node within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeExecutionState {
    /// Not dispatched yet.
    NotStarted = 0,
    /// Dispatched to a worker.
    Executing = 1,
    /// Completed successfully; outputs are in the cache.
    Executed = 2,
    /// Failed; no outputs were written.
    Failed = 3,
}

impl NodeExecutionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Executing,
            2 => Self::Executed,
            3 => Self::Failed,
            _ => Self::NotStarted,
        }
    }

    /// Returns true for `Executed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Failed)
    }
}

impl fmt::Display for NodeExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Executing => write!(f, "executing"),
            Self::Executed => write!(f, "executed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why a node failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Inputs absent from the cache (live data miss or upstream failure).
    MissingInputs(Vec<ValueSpecification>),
    /// The calculation function faulted.
    FunctionFault(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingInputs(specs) => {
                let names: Vec<String> = specs.iter().map(|s| s.to_string()).collect();
                write!(f, "missing inputs: {}", names.join(", "))
            }
            Self::FunctionFault(msg) => write!(f, "function fault: {}", msg),
        }
    }
}

/// Node counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    /// Nodes never dispatched.
    pub not_started: usize,
    /// Nodes currently running.
    pub executing: usize,
    /// Nodes executed successfully.
    pub executed: usize,
    /// Nodes failed.
    pub failed: usize,
}

impl StateCounts {
    /// Total of all states.
    pub fn total(&self) -> usize {
        self.not_started + self.executing + self.executed + self.failed
    }
}

/// Tracks the execution state of every node of a model for one cycle.
#[derive(Debug)]
pub struct NodeStateTracker {
    states: Vec<AtomicU8>,
    failures: RwLock<HashMap<NodeId, FailureReason>>,
    executed: AtomicUsize,
    failed: AtomicUsize,
}

impl NodeStateTracker {
    /// Creates a tracker with every node `NotStarted`.
    pub fn new(node_count: usize) -> Self {
        Self {
            states: (0..node_count)
                .map(|_| AtomicU8::new(NodeExecutionState::NotStarted as u8))
                .collect(),
            failures: RwLock::new(HashMap::new()),
            executed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    fn slot(&self, node: NodeId) -> EngineResult<&AtomicU8> {
        self.states
            .get(node.index())
            .ok_or_else(|| EngineError::invariant(format!("{} is not tracked", node)))
    }

    fn transition(
        &self,
        node: NodeId,
        from: NodeExecutionState,
        to: NodeExecutionState,
    ) -> EngineResult<()> {
        self.slot(node)?
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| {
                EngineError::invariant(format!(
                    "{} cannot move from {} to {}: it is {}",
                    node,
                    from,
                    to,
                    NodeExecutionState::from_u8(actual)
                ))
            })
    }

    /// Number of tracked nodes.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if no nodes are tracked.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Current state of a node, `None` if the node is not tracked.
    pub fn state(&self, node: NodeId) -> Option<NodeExecutionState> {
        self.states
            .get(node.index())
            .map(|s| NodeExecutionState::from_u8(s.load(Ordering::Acquire)))
    }

    /// Marks a node as dispatched.
    pub fn begin(&self, node: NodeId) -> EngineResult<()> {
        self.transition(
            node,
            NodeExecutionState::NotStarted,
            NodeExecutionState::Executing,
        )
    }

    /// Marks a running node as executed.
    pub fn mark_executed(&self, node: NodeId) -> EngineResult<()> {
        self.transition(
            node,
            NodeExecutionState::Executing,
            NodeExecutionState::Executed,
        )?;
        self.executed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Marks a running node as failed and records why.
    pub fn mark_failed(&self, node: NodeId, reason: FailureReason) -> EngineResult<()> {
        self.transition(node, NodeExecutionState::Executing, NodeExecutionState::Failed)?;
        self.failures.write().insert(node, reason);
        self.failed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns true if the node executed successfully.
    pub fn is_executed(&self, node: NodeId) -> bool {
        self.state(node) == Some(NodeExecutionState::Executed)
    }

    /// Returns true if the node failed.
    pub fn is_failed(&self, node: NodeId) -> bool {
        self.state(node) == Some(NodeExecutionState::Failed)
    }

    /// Failure reason of a failed node.
    pub fn failure_reason(&self, node: NodeId) -> Option<FailureReason> {
        self.failures.read().get(&node).cloned()
    }

    fn nodes_in(&self, state: NodeExecutionState) -> Vec<NodeId> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.load(Ordering::Acquire) == state as u8)
            .map(|(i, _)| NodeId(i as u32))
            .collect()
    }

    /// Nodes that executed successfully, by id.
    pub fn executed_nodes(&self) -> Vec<NodeId> {
        self.nodes_in(NodeExecutionState::Executed)
    }

    /// Nodes that failed, by id.
    pub fn failed_nodes(&self) -> Vec<NodeId> {
        self.nodes_in(NodeExecutionState::Failed)
    }

    /// Counts nodes by state.
    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for slot in &self.states {
            match NodeExecutionState::from_u8(slot.load(Ordering::Acquire)) {
                NodeExecutionState::NotStarted => counts.not_started += 1,
                NodeExecutionState::Executing => counts.executing += 1,
                NodeExecutionState::Executed => counts.executed += 1,
                NodeExecutionState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Number of nodes that reached `Executed`.
    pub fn executed_count(&self) -> usize {
        self.executed.load(Ordering::Relaxed)
    }

    /// Number of nodes that reached `Failed`.
    pub fn failed_count(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_lifecycle() {
        let tracker = NodeStateTracker::new(3);
        assert_eq!(tracker.state(NodeId(0)), Some(NodeExecutionState::NotStarted));
        assert_eq!(tracker.state(NodeId(3)), None);

        tracker.begin(NodeId(0)).unwrap();
        tracker.mark_executed(NodeId(0)).unwrap();
        tracker.begin(NodeId(1)).unwrap();
        tracker
            .mark_failed(NodeId(1), FailureReason::FunctionFault("boom".into()))
            .unwrap();

        assert!(tracker.is_executed(NodeId(0)));
        assert!(tracker.is_failed(NodeId(1)));
        assert_eq!(tracker.executed_nodes(), vec![NodeId(0)]);
        assert_eq!(tracker.failed_nodes(), vec![NodeId(1)]);
        assert_eq!(
            tracker.failure_reason(NodeId(1)),
            Some(FailureReason::FunctionFault("boom".into()))
        );
        assert_eq!(
            tracker.counts(),
            StateCounts {
                not_started: 1,
                executing: 0,
                executed: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn test_terminal_state_is_reached_once() {
        let tracker = NodeStateTracker::new(1);
        tracker.begin(NodeId(0)).unwrap();
        tracker.mark_executed(NodeId(0)).unwrap();

        assert!(tracker.begin(NodeId(0)).is_err());
        assert!(tracker.mark_executed(NodeId(0)).is_err());
        assert!(tracker
            .mark_failed(NodeId(0), FailureReason::FunctionFault("late".into()))
            .is_err());
        assert_eq!(tracker.executed_count(), 1);
        assert_eq!(tracker.failed_count(), 0);
        assert!(tracker.failure_reason(NodeId(0)).is_none());
    }

    #[test]
    fn test_cannot_complete_undispatched_node() {
        let tracker = NodeStateTracker::new(1);
        assert!(matches!(
            tracker.mark_executed(NodeId(0)),
            Err(EngineError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_concurrent_begin_has_one_winner() {
        let tracker = Arc::new(NodeStateTracker::new(1));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || tracker.begin(NodeId(0)).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
