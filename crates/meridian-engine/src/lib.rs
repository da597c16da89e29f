//! # Meridian Engine
//!
//! The computation-cycle engine for Meridian.
//!
//! This crate provides:
//! - [`DependencyGraphModel`]: Per-target dependency graphs partitioned by category
//! - [`SingleComputationCycle`]: One pass of a view against one live data snapshot
//! - [`DependencyGraphExecutor`]: Dependency-ordered node scheduling on a worker pool
//! - [`ComputationCache`]: Snapshot-scoped, write-once value store
//! - [`NodeStateTracker`]: Per-node execution state with atomic transitions
//! - [`ViewComputationResultModel`]: Values published to consumers
//!
//! ## Architecture
//!
//! ```text
//! LiveDataSnapshotProvider ─> prepare_inputs ─> ComputationCache
//!                                                    │
//!         PRIMITIVE ─> SECURITY ─> POSITION ─> MULTIPLE_POSITIONS
//!              (DependencyGraphExecutor per graph, workers in parallel)
//!                                                    │
//!                     populate_result_model ─> ViewComputationResultModel
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let context = Arc::new(
//!     ViewProcessingContextBuilder::new()
//!         .with_live_data(live_data_provider)
//!         .with_config(EngineConfig::default())
//!         .build()?,
//! );
//!
//! let model = Arc::new(
//!     DependencyGraphModelBuilder::new()
//!         .with_live_data(price_requirement)
//!         .with_function(ComputationTarget::position("P1"), pv_function)
//!         .build()?,
//! );
//!
//! let mut cycle = SingleComputationCycle::new(
//!     "Equity Desk",
//!     context,
//!     model,
//!     ViewComputationResultModel::new("Equity Desk"),
//! );
//! cycle.run()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod cache;
pub mod config;
pub mod cycle;
pub mod error;
pub mod executor;
pub mod functions;
pub mod graph;
pub mod listener;
pub mod node;
pub mod result;
pub mod state;

mod context;

// Re-exports
pub use builder::ViewProcessingContextBuilder;
pub use cache::{ComputationCache, ComputationCacheSource};
pub use config::EngineConfig;
pub use context::ViewProcessingContext;
pub use cycle::{CycleState, CycleStats, SingleComputationCycle};
pub use error::{CacheError, EngineError, EngineResult, GraphError};
pub use executor::{CancellationHandle, DependencyGraphExecutor, GraphExecutionReport};
pub use functions::LiveDataSourcingFunction;
pub use graph::{DependencyGraph, DependencyGraphModel, DependencyGraphModelBuilder, GraphStats};
pub use listener::{ExecutionListener, NoopListener};
pub use node::{DependencyNode, NodeId};
pub use result::ViewComputationResultModel;
pub use state::{FailureReason, NodeExecutionState, NodeStateTracker, StateCounts};

// Re-export traits for convenience
pub use meridian_traits::{
    CalculationFunction, ComputationTarget, ComputationTargetType, ComputedValue, FunctionError,
    FunctionExecutionContext, FunctionInputs, LiveDataSnapshotProvider, Payload, SnapshotToken,
    TraitError, ValueProperties, ValueRequirement, ValueSpecification,
};
