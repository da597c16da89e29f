//! Dependency nodes.
//!
//! A node is one executable step: a target, the specifications it consumes,
//! the specifications it produces, and the calculation function that does
//! the work. Nodes are built once per graph model and never change while a
//! cycle runs.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use meridian_traits::{CalculationFunction, ComputationTarget, ValueSpecification};

/// Dense index of a node within its graph model.
///
/// Ids run from zero to `node_count - 1`, which lets the state tracker keep
/// one slot per node.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Slot index of this node.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// One executable step of a dependency graph.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    id: NodeId,
    target: ComputationTarget,
    function: Arc<dyn CalculationFunction>,
    inputs: Vec<ValueSpecification>,
    outputs: Vec<ValueSpecification>,
}

impl DependencyNode {
    /// Creates a node with explicitly resolved inputs and outputs.
    ///
    /// Duplicate outputs are collapsed, keeping the first occurrence.
    pub fn new(
        id: NodeId,
        target: ComputationTarget,
        function: Arc<dyn CalculationFunction>,
        inputs: Vec<ValueSpecification>,
        outputs: Vec<ValueSpecification>,
    ) -> Self {
        let mut unique_outputs: Vec<ValueSpecification> = Vec::with_capacity(outputs.len());
        for output in outputs {
            if !unique_outputs.contains(&output) {
                unique_outputs.push(output);
            }
        }
        Self {
            id,
            target,
            function,
            inputs,
            outputs: unique_outputs,
        }
    }

    /// Node identifier.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Target the node computes for.
    pub fn target(&self) -> &ComputationTarget {
        &self.target
    }

    /// Calculation function.
    pub fn function(&self) -> &Arc<dyn CalculationFunction> {
        &self.function
    }

    /// Required inputs, in declaration order.
    pub fn inputs(&self) -> &[ValueSpecification] {
        &self.inputs
    }

    /// Produced outputs.
    pub fn outputs(&self) -> &[ValueSpecification] {
        &self.outputs
    }

    /// Returns true if the node declares the specification as an output.
    pub fn produces(&self, spec: &ValueSpecification) -> bool {
        self.outputs.contains(spec)
    }
}

impl fmt::Display for DependencyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{} on {}]",
            self.id,
            self.function.short_name(),
            self.target
        )
    }
}
