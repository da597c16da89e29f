//! # Meridian Traits
//!
//! Value identifiers and collaborator traits for the Meridian computation engine.
//!
//! This crate contains ONLY boundary definitions with ZERO runtime dependencies.
//! The engine lives in `meridian-engine`; collaborator implementations live in
//! extension crates.
//!
//! ## Module Structure
//!
//! - [`ids`]: Computation targets, value requirements and value specifications
//! - [`value`]: Payloads and computed values
//! - [`live_data`]: Trait for live data snapshot providers
//! - [`function`]: Trait for calculation functions (the "leaf" computations)
//! - [`error`]: Error types for collaborator operations
//!
//! ## Dependency Injection
//!
//! The engine consumes these traits via dependency injection:
//!
//! ```ignore
//! ViewProcessingContextBuilder::new()
//!     .with_live_data(impl LiveDataSnapshotProvider)
//!     .with_config(EngineConfig::default())
//!     .build()
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod function;
pub mod ids;
pub mod live_data;
pub mod value;

// Re-export commonly used types
pub use error::{FunctionError, TraitError};
pub use function::{CalculationFunction, FunctionExecutionContext, FunctionInputs};
pub use ids::*;
pub use live_data::LiveDataSnapshotProvider;
pub use value::{ComputedValue, Payload};
