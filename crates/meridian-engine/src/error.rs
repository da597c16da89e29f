//! Engine error types.
//!
//! Everything here is fatal to a cycle. Node-level faults (missing inputs,
//! failing calculation functions) are recorded in the state tracker instead
//! and never surface as an `EngineError`.

use thiserror::Error;

use meridian_traits::{ComputationTarget, TraitError, ValueSpecification};

use crate::cycle::CycleState;
use crate::node::NodeId;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Computation cache faults.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The cache was released and can no longer be read or written
    #[error("computation cache for view {view} at {snapshot} has been released")]
    Released {
        /// View name
        view: String,
        /// Snapshot the cache was scoped to
        snapshot: meridian_traits::SnapshotToken,
    },

    /// A specification was written twice within one cycle
    #[error("value already written for {0}")]
    DuplicateValue(ValueSpecification),
}

/// Dependency graph construction faults.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The graph for a target contains a cycle
    #[error("circular dependency in graph for {0}")]
    CircularDependency(ComputationTarget),

    /// Two nodes claim the same output
    #[error("value {0} is produced by more than one node")]
    DuplicateProducer(ValueSpecification),

    /// Two nodes were given the same id
    #[error("node id {0} is used by more than one node")]
    DuplicateNode(NodeId),

    /// A node was added to the graph of a different target
    #[error("node {node} targets {node_target}, graph is for {graph_target}")]
    TargetMismatch {
        /// Offending node
        node: NodeId,
        /// Target of the node
        node_target: ComputationTarget,
        /// Target of the graph
        graph_target: ComputationTarget,
    },

    /// A function was registered for a target it cannot handle
    #[error("function {function} is not applicable to {target}")]
    NotApplicable {
        /// Function short name
        function: String,
        /// Target
        target: ComputationTarget,
    },

    /// Node ids must be dense within a model
    #[error("node id {0} is out of range for this model")]
    UnknownNode(NodeId),
}

/// Engine error type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Live data provider failure
    #[error("live data error: {0}")]
    LiveData(#[from] TraitError),

    /// Computation cache fault
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Malformed dependency graph
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Lifecycle operation invoked in the wrong state
    #[error("cannot {operation} while cycle is {state}")]
    InvalidLifecycle {
        /// Operation attempted
        operation: &'static str,
        /// State the cycle was in
        state: CycleState,
    },

    /// Operation on a cycle that already released its resources
    #[error("cycle has been released")]
    CycleReleased,

    /// Engine invariant violated (a programming defect)
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Worker pool could not be created or lost a worker
    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

impl EngineError {
    /// Creates an invariant violation.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}
