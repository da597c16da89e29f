//! Dependency graph executor.
//!
//! Executes every node of one graph exactly once, in dependency order, on a
//! bounded worker pool.
//!
//! Scheduling works on counters owned by the calling thread:
//!
//! - Each node starts with the number of its in-graph predecessors still
//!   unresolved. Nodes at zero are dispatched immediately.
//! - Workers report each terminal state back over a channel. On every
//!   completion the calling thread decrements the counters of the node's
//!   dependents and dispatches those that reach zero.
//! - The graph is done when nothing is left to dispatch and nothing is
//!   still running.
//!
//! A node is dispatched only once all its predecessors are terminal,
//! executed or failed. Whether it can run is decided on the worker by
//! reading its inputs from the cache: any absent input fails the node
//! without calling its function, which in turn leaves its own outputs
//! absent for its dependents.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use meridian_traits::{
    ComputationTarget, ComputedValue, FunctionError, FunctionExecutionContext, FunctionInputs,
    SnapshotToken,
};

use crate::cache::ComputationCache;
use crate::error::{EngineError, EngineResult};
use crate::graph::DependencyGraph;
use crate::listener::ExecutionListener;
use crate::node::{DependencyNode, NodeId};
use crate::state::{FailureReason, NodeExecutionState, NodeStateTracker};

// =============================================================================
// CANCELLATION
// =============================================================================

/// Cooperative cancellation flag shared by a cycle and its executors.
///
/// Cancelling stops new dispatches; nodes already running finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle(Arc<AtomicBool>);

impl CancellationHandle {
    /// Creates a handle that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// =============================================================================
// EXECUTION REPORT
// =============================================================================

/// Outcome of executing one graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphExecutionReport {
    /// Target of the graph.
    pub target: ComputationTarget,
    /// Nodes in the graph.
    pub node_count: usize,
    /// Nodes that executed.
    pub executed: usize,
    /// Nodes that failed.
    pub failed: usize,
    /// Nodes left undispatched because of cancellation.
    pub not_dispatched: usize,
    /// Wall time spent on the graph.
    pub elapsed: Duration,
}

// =============================================================================
// NODE RUNNER
// =============================================================================

/// Everything a worker needs to run a node; shared by all dispatches of a
/// cycle.
#[derive(Debug)]
pub(crate) struct NodeRunner {
    pub(crate) view_name: String,
    pub(crate) snapshot: SnapshotToken,
    pub(crate) cycle_start: DateTime<Utc>,
    pub(crate) cache: Arc<ComputationCache>,
    pub(crate) tracker: Arc<NodeStateTracker>,
    pub(crate) listener: Arc<dyn ExecutionListener>,
    pub(crate) catch_panics: bool,
}

impl NodeRunner {
    fn run(&self, node: &DependencyNode, job_id: u64) -> EngineResult<NodeExecutionState> {
        let state = self.run_node(node, job_id)?;
        self.notify("node_completed", |l| l.on_node_completed(node.id(), state));
        Ok(state)
    }

    /// Invokes a listener callback; a panicking listener is logged and
    /// otherwise ignored.
    fn notify(&self, event: &'static str, callback: impl FnOnce(&dyn ExecutionListener)) {
        let listener = self.listener.as_ref();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(listener))) {
            warn!(
                event,
                panic = %panic_message(payload.as_ref()),
                "Execution listener panicked"
            );
        }
    }

    fn run_node(&self, node: &DependencyNode, job_id: u64) -> EngineResult<NodeExecutionState> {
        self.tracker.begin(node.id())?;
        trace!(node = %node, job_id, "Node dispatched");
        self.notify("node_dispatched", |l| l.on_node_dispatched(node.id(), job_id));

        let mut inputs = FunctionInputs::new();
        let mut missing = Vec::new();
        for spec in node.inputs() {
            match self.cache.get(spec)? {
                Some(value) => inputs.insert(value),
                None => missing.push(spec.clone()),
            }
        }

        if !missing.is_empty() {
            debug!(
                node = %node,
                missing = missing.len(),
                "Node failed: inputs not available"
            );
            self.tracker
                .mark_failed(node.id(), FailureReason::MissingInputs(missing))?;
            return Ok(NodeExecutionState::Failed);
        }

        let context = FunctionExecutionContext {
            view_name: self.view_name.clone(),
            snapshot: self.snapshot,
            job_id,
            cycle_start: self.cycle_start,
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            node.function().execute(&context, node.target(), &inputs)
        }));

        let outputs = match outcome {
            Ok(Ok(values)) => validate_outputs(node, values),
            Ok(Err(e)) => Err(e),
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                if !self.catch_panics {
                    return Err(EngineError::invariant(format!(
                        "function {} panicked on {}: {}",
                        node.function().short_name(),
                        node.target(),
                        msg
                    )));
                }
                Err(FunctionError::calculation(format!("panicked: {}", msg)))
            }
        };

        match outputs {
            Ok(values) => {
                for value in values {
                    self.cache.put(value)?;
                }
                self.tracker.mark_executed(node.id())?;
                trace!(node = %node, job_id, "Node executed");
                Ok(NodeExecutionState::Executed)
            }
            Err(e) => {
                warn!(
                    node = %node,
                    function = node.function().short_name(),
                    error = %e,
                    "Node calculation failed"
                );
                self.tracker
                    .mark_failed(node.id(), FailureReason::FunctionFault(e.to_string()))?;
                Ok(NodeExecutionState::Failed)
            }
        }
    }
}

/// Checks a function's outputs against what its node declared.
fn validate_outputs(
    node: &DependencyNode,
    values: Vec<ComputedValue>,
) -> Result<Vec<ComputedValue>, FunctionError> {
    if values.is_empty() {
        return Err(FunctionError::InvalidOutput("function produced no results".into()));
    }
    for (i, value) in values.iter().enumerate() {
        let spec = value.specification();
        if !node.produces(spec) {
            return Err(FunctionError::InvalidOutput(format!(
                "undeclared output {}",
                spec
            )));
        }
        if values[..i].iter().any(|v| v.specification() == spec) {
            return Err(FunctionError::InvalidOutput(format!(
                "output {} returned twice",
                spec
            )));
        }
    }
    if values.len() < node.outputs().len() {
        debug!(
            node = %node,
            produced = values.len(),
            declared = node.outputs().len(),
            "Node produced a subset of its declared outputs"
        );
    }
    Ok(values)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// =============================================================================
// GRAPH EXECUTOR
// =============================================================================

struct Completion {
    local: usize,
    outcome: EngineResult<NodeExecutionState>,
}

/// Executes one dependency graph against a cycle's cache and state tracker.
pub struct DependencyGraphExecutor {
    graph: Arc<DependencyGraph>,
    runner: Arc<NodeRunner>,
    pool: Arc<rayon::ThreadPool>,
    job_ids: Arc<AtomicU64>,
    cancel: CancellationHandle,
}

impl DependencyGraphExecutor {
    pub(crate) fn new(
        graph: Arc<DependencyGraph>,
        runner: Arc<NodeRunner>,
        pool: Arc<rayon::ThreadPool>,
        job_ids: Arc<AtomicU64>,
        cancel: CancellationHandle,
    ) -> Self {
        Self {
            graph,
            runner,
            pool,
            job_ids,
            cancel,
        }
    }

    fn dispatch(&self, local: usize, tx: &Sender<Completion>) {
        let node = self.graph.nodes()[local].clone();
        let runner = self.runner.clone();
        let job_id = self.job_ids.fetch_add(1, Ordering::Relaxed) + 1;
        let tx = tx.clone();
        self.pool.spawn(move || {
            let outcome = runner.run(&node, job_id);
            // The executor holds its own sender, so the channel stays open.
            let _ = tx.send(Completion { local, outcome });
        });
    }

    /// Runs the graph to completion and blocks until every dispatched node
    /// is terminal.
    ///
    /// # Errors
    /// Fatal engine faults: a cache write conflict, a released cache, a state
    /// transition violation, or a graph that cannot make progress.
    pub fn execute(&self) -> EngineResult<GraphExecutionReport> {
        let start = Instant::now();
        let nodes = self.graph.nodes();
        let target = self.graph.computation_target().clone();
        self.runner
            .notify("graph_started", |l| l.on_graph_started(&target, nodes.len()));

        let local: HashMap<NodeId, usize> =
            nodes.iter().enumerate().map(|(i, n)| (n.id(), i)).collect();
        let mut pending: Vec<usize> = nodes
            .iter()
            .map(|n| self.graph.dependencies_of(n.id()).len())
            .collect();
        let successors: Vec<Vec<usize>> = nodes
            .iter()
            .map(|n| {
                self.graph
                    .dependents_of(n.id())
                    .into_iter()
                    .filter_map(|d| local.get(&d).copied())
                    .collect()
            })
            .collect();

        let mut ready: VecDeque<usize> = (0..nodes.len()).filter(|&i| pending[i] == 0).collect();
        let (tx, rx) = channel::unbounded::<Completion>();

        let mut outstanding = 0usize;
        let mut executed = 0usize;
        let mut failed = 0usize;
        let mut fatal: Option<EngineError> = None;

        loop {
            while let Some(i) = ready.pop_front() {
                if fatal.is_some() || self.cancel.is_cancelled() {
                    continue;
                }
                self.dispatch(i, &tx);
                outstanding += 1;
            }

            if outstanding == 0 {
                break;
            }

            let completion = rx
                .recv()
                .map_err(|e| EngineError::WorkerPool(e.to_string()))?;
            outstanding -= 1;

            match completion.outcome {
                Ok(state) => {
                    match state {
                        NodeExecutionState::Executed => executed += 1,
                        _ => failed += 1,
                    }
                    for &s in &successors[completion.local] {
                        pending[s] -= 1;
                        if pending[s] == 0 {
                            ready.push_back(s);
                        }
                    }
                }
                Err(e) => {
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }

        self.runner
            .notify("graph_completed", |l| l.on_graph_completed(&target));

        if let Some(e) = fatal {
            return Err(e);
        }

        let resolved = executed + failed;
        if !self.cancel.is_cancelled() && resolved != nodes.len() {
            return Err(EngineError::invariant(format!(
                "graph for {} stalled with {} of {} nodes unresolved",
                target,
                nodes.len() - resolved,
                nodes.len()
            )));
        }

        let report = GraphExecutionReport {
            target,
            node_count: nodes.len(),
            executed,
            failed,
            not_dispatched: nodes.len() - resolved,
            elapsed: start.elapsed(),
        };
        debug!(
            target = %report.target,
            executed = report.executed,
            failed = report.failed,
            not_dispatched = report.not_dispatched,
            elapsed_us = report.elapsed.as_micros() as u64,
            "Dependency graph executed"
        );
        Ok(report)
    }
}
