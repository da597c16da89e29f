//! Calculation function trait.
//!
//! Calculation functions are the leaf computations of the dependency graph:
//! curve construction, option pricing, aggregation and so on. The engine is
//! agnostic to what they compute; it only needs to know what a function
//! requires and produces for a target, and how to invoke it.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::FunctionError;
use crate::ids::{ComputationTarget, SnapshotToken, ValueRequirement, ValueSpecification};
use crate::value::{ComputedValue, Payload};

// =============================================================================
// EXECUTION CONTEXT
// =============================================================================

/// Per-invocation context handed to a calculation function.
#[derive(Debug, Clone)]
pub struct FunctionExecutionContext {
    /// View the cycle is computing.
    pub view_name: String,
    /// Snapshot the cycle runs against.
    pub snapshot: SnapshotToken,
    /// Identifier of this invocation, unique within the cycle.
    pub job_id: u64,
    /// Time the cycle started.
    pub cycle_start: DateTime<Utc>,
}

// =============================================================================
// FUNCTION INPUTS
// =============================================================================

/// Resolved inputs of one node invocation.
#[derive(Debug, Clone, Default)]
pub struct FunctionInputs {
    values: HashMap<ValueSpecification, Payload>,
}

impl FunctionInputs {
    /// Creates an empty input set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an input value.
    pub fn insert(&mut self, value: ComputedValue) {
        let (spec, payload) = value.into_parts();
        self.values.insert(spec, payload);
    }

    /// Gets the payload of an input by specification.
    pub fn get(&self, spec: &ValueSpecification) -> Option<&Payload> {
        self.values.get(spec)
    }

    /// Gets the payload of an input, failing with [`FunctionError::MissingInput`].
    pub fn require(&self, spec: &ValueSpecification) -> Result<&Payload, FunctionError> {
        self.get(spec)
            .ok_or_else(|| FunctionError::MissingInput(spec.clone()))
    }

    /// Finds the first input that satisfies a requirement.
    pub fn find(&self, requirement: &ValueRequirement) -> Option<&Payload> {
        self.values
            .iter()
            .find(|(spec, _)| requirement.is_satisfied_by(spec))
            .map(|(_, payload)| payload)
    }

    /// Finds an input by value name, regardless of target and properties.
    pub fn find_by_name(&self, value_name: &str) -> Option<&Payload> {
        self.values
            .iter()
            .find(|(spec, _)| spec.value_name() == value_name)
            .map(|(_, payload)| payload)
    }

    /// Iterates over all inputs.
    pub fn iter(&self) -> impl Iterator<Item = (&ValueSpecification, &Payload)> {
        self.values.iter()
    }

    /// Number of inputs.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no inputs.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<ComputedValue> for FunctionInputs {
    fn from_iter<I: IntoIterator<Item = ComputedValue>>(iter: I) -> Self {
        let mut inputs = Self::new();
        for value in iter {
            inputs.insert(value);
        }
        inputs
    }
}

// =============================================================================
// CALCULATION FUNCTION TRAIT
// =============================================================================

/// A pluggable calculation step.
///
/// Implementations must be pure with respect to the engine: everything they
/// read comes from `inputs`, everything they produce is returned.
pub trait CalculationFunction: Send + Sync + fmt::Debug {
    /// Short human-readable name, used in logs.
    fn short_name(&self) -> &str;

    /// Returns true if the function can compute anything for the target.
    fn is_applicable_to(&self, _target: &ComputationTarget) -> bool {
        true
    }

    /// Values the function needs as input for the target.
    fn requirements(&self, target: &ComputationTarget) -> Vec<ValueRequirement>;

    /// Values the function can produce for the target.
    fn results(&self, target: &ComputationTarget) -> Vec<ValueSpecification>;

    /// Computes outputs from resolved inputs.
    ///
    /// May fail; a fault is contained at the node boundary.
    fn execute(
        &self,
        context: &FunctionExecutionContext,
        target: &ComputationTarget,
        inputs: &FunctionInputs,
    ) -> Result<Vec<ComputedValue>, FunctionError>;
}
