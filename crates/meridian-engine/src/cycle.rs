//! A single pass through a computation cycle.
//!
//! One cycle executes a view's graph model once against one live data
//! snapshot:
//!
//! ```text
//! Created ─prepare_inputs─> InputsPrepared ─execute_plans─> Executing
//!     ─populate_result_model─> ResultsPopulated ─release_resources─> Released
//! ```
//!
//! The owning controller drives the transitions; the cycle never advances
//! itself. Partitions run one after another in
//! [`ComputationTargetType::EXECUTION_ORDER`]; nodes within a partition run
//! concurrently on the context's worker pool.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut cycle = SingleComputationCycle::new(
//!     "Equity Desk",
//!     context.clone(),
//!     model.clone(),
//!     ViewComputationResultModel::new("Equity Desk"),
//! );
//! cycle.run()?;
//! for value in cycle.result_model().values() {
//!     println!("{} = {:?}", value.specification(), value.value());
//! }
//! ```

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use meridian_traits::{
    ComputationTargetType, ComputedValue, SnapshotToken, ValueRequirement, ValueSpecification,
};

use crate::cache::ComputationCache;
use crate::context::ViewProcessingContext;
use crate::error::{EngineError, EngineResult};
use crate::executor::{
    CancellationHandle, DependencyGraphExecutor, GraphExecutionReport, NodeRunner,
};
use crate::graph::DependencyGraphModel;
use crate::result::ViewComputationResultModel;
use crate::state::NodeStateTracker;

// =============================================================================
// CYCLE STATE
// =============================================================================

/// Life-cycle state of a computation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CycleState {
    /// Constructed; nothing acquired.
    Created,
    /// Snapshot acquired and live data seeded.
    InputsPrepared,
    /// Plans executed (or execution was attempted).
    Executing,
    /// Result model populated.
    ResultsPopulated,
    /// Snapshot and cache released.
    Released,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::InputsPrepared => write!(f, "inputs prepared"),
            Self::Executing => write!(f, "executing"),
            Self::ResultsPopulated => write!(f, "results populated"),
            Self::Released => write!(f, "released"),
        }
    }
}

// =============================================================================
// CYCLE STATISTICS
// =============================================================================

/// Statistics about a cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleStats {
    /// Nodes in the model.
    pub node_count: usize,
    /// Nodes executed.
    pub executed: usize,
    /// Nodes failed.
    pub failed: usize,
    /// Nodes never dispatched.
    pub not_started: usize,
    /// Distinct live data requirements queried.
    pub live_data_requested: usize,
    /// Live data requirements missing from the snapshot.
    pub missing_live_data: usize,
    /// Graphs executed.
    pub graphs_executed: usize,
    /// Values in the result model.
    pub result_values: usize,
    /// Time spent preparing inputs.
    pub prepare_time: Duration,
    /// Time spent executing plans.
    pub execute_time: Duration,
    /// Time spent populating results.
    pub populate_time: Duration,
}

// =============================================================================
// SINGLE COMPUTATION CYCLE
// =============================================================================

/// All data and actions for one pass through a computation cycle.
pub struct SingleComputationCycle {
    cycle_id: Uuid,
    view_name: String,
    context: Arc<ViewProcessingContext>,
    model: Arc<DependencyGraphModel>,
    state: CycleState,
    start_time: DateTime<Utc>,

    snapshot: Option<SnapshotToken>,
    cache: Option<Arc<ComputationCache>>,
    tracker: Arc<NodeStateTracker>,
    job_ids: Arc<AtomicU64>,
    cancel: CancellationHandle,
    missing_live_data: BTreeSet<ValueRequirement>,
    reports: Vec<GraphExecutionReport>,

    result_model: ViewComputationResultModel,
    stats: CycleStats,
}

impl SingleComputationCycle {
    /// Creates a cycle for a view over a graph model.
    pub fn new(
        view_name: impl Into<String>,
        context: Arc<ViewProcessingContext>,
        model: Arc<DependencyGraphModel>,
        result_model: ViewComputationResultModel,
    ) -> Self {
        let tracker = Arc::new(NodeStateTracker::new(model.node_count()));
        Self {
            cycle_id: Uuid::new_v4(),
            view_name: view_name.into(),
            context,
            stats: CycleStats {
                node_count: model.node_count(),
                ..Default::default()
            },
            model,
            state: CycleState::Created,
            start_time: Utc::now(),
            snapshot: None,
            cache: None,
            tracker,
            job_ids: Arc::new(AtomicU64::new(0)),
            cancel: CancellationHandle::new(),
            missing_live_data: BTreeSet::new(),
            reports: Vec::new(),
            result_model,
        }
    }

    fn expect_state(&self, operation: &'static str, allowed: &[CycleState]) -> EngineResult<()> {
        if self.state == CycleState::Released {
            return Err(EngineError::CycleReleased);
        }
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(EngineError::InvalidLifecycle {
                operation,
                state: self.state,
            })
        }
    }

    fn acquired(&self) -> EngineResult<(SnapshotToken, Arc<ComputationCache>)> {
        match (self.snapshot, &self.cache) {
            (Some(snapshot), Some(cache)) => Ok((snapshot, cache.clone())),
            _ => Err(EngineError::invariant(
                "cycle has no snapshot or cache after preparing inputs",
            )),
        }
    }

    // =========================================================================
    // LIFE-CYCLE
    // =========================================================================

    /// Acquires a snapshot, obtains the cycle's cache and seeds it with every
    /// live value the model requires.
    ///
    /// A live value missing from the snapshot is logged and recorded, not
    /// fatal: nodes consuming it fail when they are scheduled. A provider
    /// error on an individual query is treated the same way.
    pub fn prepare_inputs(&mut self) -> EngineResult<()> {
        self.expect_state("prepare inputs", &[CycleState::Created])?;
        let start = Instant::now();

        let live_data = self.context.live_data.clone();
        let snapshot = live_data.snapshot()?;
        self.snapshot = Some(snapshot);

        let cache = self
            .context
            .cache_source
            .get_cache(&self.view_name, snapshot);
        self.cache = Some(cache.clone());
        self.result_model.set_input_data_timestamp(snapshot);
        self.result_model.set_cycle_id(self.cycle_id);

        let requirements = self.model.all_required_live_data();
        debug!(
            view = %self.view_name,
            snapshot = %snapshot,
            count = requirements.len(),
            "Populating market data items"
        );

        let mut seeded: HashSet<ValueSpecification> = HashSet::with_capacity(requirements.len());
        let mut missing = BTreeSet::new();
        for requirement in &requirements {
            let spec = ValueSpecification::from_requirement(requirement);
            if seeded.contains(&spec) {
                continue;
            }
            match live_data.query_snapshot(snapshot, requirement) {
                Ok(Some(payload)) => {
                    cache.put(ComputedValue::new(spec.clone(), payload))?;
                    seeded.insert(spec);
                }
                Ok(None) => {
                    debug!(
                        requirement = %requirement,
                        snapshot = %snapshot,
                        "Unable to load live data value"
                    );
                    missing.insert(requirement.clone());
                }
                Err(e) => {
                    debug!(
                        requirement = %requirement,
                        snapshot = %snapshot,
                        error = %e,
                        "Live data query failed"
                    );
                    missing.insert(requirement.clone());
                }
            }
        }

        if !missing.is_empty() {
            let shown: Vec<String> = missing
                .iter()
                .take(self.context.config.max_logged_missing_live_data)
                .map(|r| r.to_string())
                .collect();
            warn!(
                view = %self.view_name,
                snapshot = %snapshot,
                missing = missing.len(),
                "Missing live data: {}",
                shown.join(", ")
            );
        }

        self.stats.live_data_requested = requirements.len();
        self.stats.missing_live_data = missing.len();
        self.stats.prepare_time = start.elapsed();
        self.missing_live_data = missing;
        self.state = CycleState::InputsPrepared;
        Ok(())
    }

    /// Executes every graph, partition by partition.
    ///
    /// Graphs of one partition run one after another, each to completion,
    /// before the next partition starts. A fatal fault aborts the remaining
    /// graphs; the cycle should still release its resources.
    pub fn execute_plans(&mut self) -> EngineResult<()> {
        self.expect_state("execute plans", &[CycleState::InputsPrepared])?;
        let (snapshot, cache) = self.acquired()?;
        self.state = CycleState::Executing;
        let start = Instant::now();

        let runner = Arc::new(NodeRunner {
            view_name: self.view_name.clone(),
            snapshot,
            cycle_start: self.start_time,
            cache,
            tracker: self.tracker.clone(),
            listener: self.context.listener.clone(),
            catch_panics: self.context.config.catch_function_panics,
        });

        let outcome = self.execute_partitions(&runner);

        let counts = self.tracker.counts();
        self.stats.executed = counts.executed;
        self.stats.failed = counts.failed;
        self.stats.not_started = counts.not_started;
        self.stats.graphs_executed = self.reports.len();
        self.stats.execute_time = start.elapsed();
        outcome
    }

    fn execute_partitions(&mut self, runner: &Arc<NodeRunner>) -> EngineResult<()> {
        let model = self.model.clone();
        for target_type in ComputationTargetType::EXECUTION_ORDER {
            for graph in model.dependency_graphs(target_type) {
                if self.cancel.is_cancelled() {
                    info!(view = %self.view_name, "Cycle cancelled; skipping remaining graphs");
                    return Ok(());
                }
                info!(
                    target = %graph.computation_target(),
                    nodes = graph.node_count(),
                    "Executing dependency graph"
                );
                let executor = DependencyGraphExecutor::new(
                    graph.clone(),
                    runner.clone(),
                    self.context.pool.clone(),
                    self.job_ids.clone(),
                    self.cancel.clone(),
                );
                self.reports.push(executor.execute()?);
            }
        }
        Ok(())
    }

    /// Copies the produced outputs of the reportable partitions into the
    /// result model.
    ///
    /// Outputs absent from the cache are left out. Only reads the cache, so
    /// calling it again yields the same values.
    pub fn populate_result_model(&mut self) -> EngineResult<()> {
        self.expect_state(
            "populate result model",
            &[CycleState::Executing, CycleState::ResultsPopulated],
        )?;
        let (_, cache) = self.acquired()?;
        let start = Instant::now();

        let model = self.model.clone();
        for target_type in ComputationTargetType::REPORTABLE {
            for graph in model.dependency_graphs(target_type) {
                for spec in graph.output_values() {
                    if let Some(value) = cache.get(spec)? {
                        self.result_model.add_value(value);
                    }
                }
            }
        }
        self.result_model.set_result_timestamp(Utc::now());

        self.stats.result_values = self.result_model.len();
        self.stats.populate_time = start.elapsed();
        self.state = CycleState::ResultsPopulated;
        Ok(())
    }

    /// Releases the snapshot back to the live data provider and invalidates
    /// the cache.
    ///
    /// Accepted from any state but `Released`, so an aborted cycle can clean
    /// up. The cache is invalidated even if releasing the snapshot fails.
    pub fn release_resources(&mut self) -> EngineResult<()> {
        self.expect_state(
            "release resources",
            &[
                CycleState::Created,
                CycleState::InputsPrepared,
                CycleState::Executing,
                CycleState::ResultsPopulated,
            ],
        )?;
        self.state = CycleState::Released;

        let Some(snapshot) = self.snapshot else {
            return Ok(());
        };
        let released = self.context.live_data.release_snapshot(snapshot);
        self.context
            .cache_source
            .release_cache(&self.view_name, snapshot);
        debug!(
            view = %self.view_name,
            snapshot = %snapshot,
            cycle = %self.cycle_id,
            "Cycle resources released"
        );
        released.map_err(EngineError::from)
    }

    /// Runs all four transitions in order, always attempting release.
    ///
    /// Returns the first fatal error.
    pub fn run(&mut self) -> EngineResult<()> {
        let outcome = self
            .prepare_inputs()
            .and_then(|()| self.execute_plans())
            .and_then(|()| self.populate_result_model());
        let released = self.release_resources();
        outcome.and(released)
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Unique identifier of this cycle.
    pub fn cycle_id(&self) -> Uuid {
        self.cycle_id
    }

    /// View being computed.
    pub fn view_name(&self) -> &str {
        &self.view_name
    }

    /// Current life-cycle state.
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// When the cycle was created.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Snapshot acquired by `prepare_inputs`.
    pub fn snapshot_time(&self) -> Option<SnapshotToken> {
        self.snapshot
    }

    /// The cycle's computation cache, once inputs are prepared.
    pub fn computation_cache(&self) -> Option<&Arc<ComputationCache>> {
        self.cache.as_ref()
    }

    /// Graph model being executed.
    pub fn model(&self) -> &Arc<DependencyGraphModel> {
        &self.model
    }

    /// Per-node execution state.
    pub fn node_states(&self) -> &NodeStateTracker {
        &self.tracker
    }

    /// Live data requirements the snapshot could not supply.
    pub fn missing_live_data(&self) -> &BTreeSet<ValueRequirement> {
        &self.missing_live_data
    }

    /// Reports of the graphs executed so far.
    pub fn graph_reports(&self) -> &[GraphExecutionReport] {
        &self.reports
    }

    /// Handle that cancels this cycle from another thread.
    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancel.clone()
    }

    /// Statistics about the cycle so far.
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Result model.
    pub fn result_model(&self) -> &ViewComputationResultModel {
        &self.result_model
    }

    /// Takes the result model out of the cycle.
    pub fn into_result_model(mut self) -> ViewComputationResultModel {
        std::mem::take(&mut self.result_model)
    }
}

impl Drop for SingleComputationCycle {
    fn drop(&mut self) {
        if self.state != CycleState::Released && self.snapshot.is_some() {
            warn!(
                view = %self.view_name,
                cycle = %self.cycle_id,
                state = %self.state,
                "Cycle dropped without releasing resources; releasing now"
            );
            if let Err(e) = self.release_resources() {
                warn!(error = %e, "Releasing resources on drop failed");
            }
        }
    }
}

impl fmt::Debug for SingleComputationCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleComputationCycle")
            .field("cycle_id", &self.cycle_id)
            .field("view_name", &self.view_name)
            .field("state", &self.state)
            .field("snapshot", &self.snapshot)
            .field("nodes", &self.model.node_count())
            .finish()
    }
}
