//! Dependency graphs and the graph model.
//!
//! A [`DependencyGraph`] holds the nodes computed for one target, with the
//! edges implied by "node A requires an output node B produces". A
//! [`DependencyGraphModel`] holds every graph of a view, partitioned by
//! target category, and owns the node arena that execution state is indexed
//! by.
//!
//! # Example
//!
//! ```rust,ignore
//! use meridian_engine::graph::DependencyGraphModelBuilder;
//!
//! let model = DependencyGraphModelBuilder::new()
//!     .with_live_data(spot_requirement)
//!     .with_function(ComputationTarget::primitive("USD"), curve_function)
//!     .with_function(ComputationTarget::position("P1"), pv_function)
//!     .build()?;
//!
//! for graph in model.dependency_graphs(ComputationTargetType::Position) {
//!     println!("{} nodes for {}", graph.node_count(), graph.computation_target());
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use meridian_traits::{
    CalculationFunction, ComputationTarget, ComputationTargetType, ValueRequirement,
    ValueSpecification,
};

use crate::error::GraphError;
use crate::node::{DependencyNode, NodeId};

// =============================================================================
// DEPENDENCY GRAPH
// =============================================================================

/// The nodes computed for one target.
///
/// Nodes are stored in a topologically consistent order: a node never comes
/// before a node of this graph that produces one of its inputs.
#[derive(Debug)]
pub struct DependencyGraph {
    target: ComputationTarget,
    nodes: Vec<Arc<DependencyNode>>,
    graph: DiGraph<NodeId, ()>,
    indices: HashMap<NodeId, NodeIndex>,
    producers: HashMap<ValueSpecification, NodeId>,
    required_live_data: BTreeSet<ValueRequirement>,
}

impl DependencyGraph {
    /// Builds a graph for a target.
    ///
    /// # Errors
    /// If a node targets a different target, if two nodes share an id or
    /// produce the same specification, or if the nodes form a cycle.
    pub fn new(
        target: ComputationTarget,
        nodes: Vec<DependencyNode>,
        required_live_data: impl IntoIterator<Item = ValueRequirement>,
    ) -> Result<Self, GraphError> {
        let mut graph = DiGraph::with_capacity(nodes.len(), nodes.len());
        let mut indices = HashMap::with_capacity(nodes.len());
        let mut producers = HashMap::new();

        for node in &nodes {
            if node.target() != &target {
                return Err(GraphError::TargetMismatch {
                    node: node.id(),
                    node_target: node.target().clone(),
                    graph_target: target.clone(),
                });
            }
            let idx = graph.add_node(node.id());
            if indices.insert(node.id(), idx).is_some() {
                return Err(GraphError::DuplicateNode(node.id()));
            }
            for output in node.outputs() {
                if producers.insert(output.clone(), node.id()).is_some() {
                    return Err(GraphError::DuplicateProducer(output.clone()));
                }
            }
        }

        // Edge from producer to consumer
        for node in &nodes {
            let consumer = indices[&node.id()];
            for input in node.inputs() {
                if let Some(producer) = producers.get(input) {
                    graph.update_edge(indices[producer], consumer, ());
                }
            }
        }

        let sorted = toposort(&graph, None)
            .map_err(|_| GraphError::CircularDependency(target.clone()))?;

        let mut by_id: HashMap<NodeId, DependencyNode> =
            nodes.into_iter().map(|n| (n.id(), n)).collect();
        let ordered: Vec<Arc<DependencyNode>> = sorted
            .into_iter()
            .filter_map(|idx| by_id.remove(&graph[idx]))
            .map(Arc::new)
            .collect();

        Ok(Self {
            target,
            nodes: ordered,
            graph,
            indices,
            producers,
            required_live_data: required_live_data.into_iter().collect(),
        })
    }

    /// Target this graph computes for.
    pub fn computation_target(&self) -> &ComputationTarget {
        &self.target
    }

    /// Category of the target.
    pub fn target_type(&self) -> ComputationTargetType {
        self.target.target_type
    }

    /// Nodes in topological order.
    pub fn nodes(&self) -> &[Arc<DependencyNode>] {
        &self.nodes
    }

    /// Node ids in topological order.
    pub fn topological_order(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id()).collect()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of producer -> consumer edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Every specification produced by a node of this graph.
    pub fn output_values(&self) -> impl Iterator<Item = &ValueSpecification> {
        self.nodes.iter().flat_map(|n| n.outputs().iter())
    }

    /// Live data requirements consumed by this graph.
    pub fn required_live_data(&self) -> &BTreeSet<ValueRequirement> {
        &self.required_live_data
    }

    /// Node of this graph producing a specification.
    pub fn producer_of(&self, spec: &ValueSpecification) -> Option<NodeId> {
        self.producers.get(spec).copied()
    }

    /// Nodes of this graph whose outputs the given node requires.
    pub fn dependencies_of(&self, node: NodeId) -> Vec<NodeId> {
        self.neighbors(node, Direction::Incoming)
    }

    /// Nodes of this graph requiring an output of the given node.
    pub fn dependents_of(&self, node: NodeId) -> Vec<NodeId> {
        self.neighbors(node, Direction::Outgoing)
    }

    fn neighbors(&self, node: NodeId, direction: Direction) -> Vec<NodeId> {
        match self.indices.get(&node) {
            Some(idx) => self
                .graph
                .neighbors_directed(*idx, direction)
                .map(|n| self.graph[n])
                .collect(),
            None => Vec::new(),
        }
    }
}

// =============================================================================
// GRAPH MODEL
// =============================================================================

/// All dependency graphs of a view, partitioned by target category.
#[derive(Debug)]
pub struct DependencyGraphModel {
    graphs: Vec<Arc<DependencyGraph>>,
    partitions: BTreeMap<ComputationTargetType, Vec<usize>>,
    nodes: Vec<Arc<DependencyNode>>,
}

impl DependencyGraphModel {
    /// Assembles a model from graphs.
    ///
    /// # Errors
    /// Node ids must cover `0..node_count` exactly once, and no specification
    /// may be produced by nodes of two different graphs.
    pub fn new(graphs: Vec<DependencyGraph>) -> Result<Self, GraphError> {
        let node_count: usize = graphs.iter().map(|g| g.node_count()).sum();
        let mut slots: Vec<Option<Arc<DependencyNode>>> = vec![None; node_count];
        let mut producers: HashMap<&ValueSpecification, NodeId> = HashMap::new();

        for graph in &graphs {
            for node in graph.nodes() {
                let slot = slots
                    .get_mut(node.id().index())
                    .ok_or(GraphError::UnknownNode(node.id()))?;
                if slot.is_some() {
                    return Err(GraphError::DuplicateNode(node.id()));
                }
                *slot = Some(node.clone());
            }
            for (spec, producer) in &graph.producers {
                if producers.insert(spec, *producer).is_some() {
                    return Err(GraphError::DuplicateProducer(spec.clone()));
                }
            }
        }

        // Every slot is filled: ids are unique and in range, and there are
        // exactly node_count of them.
        let nodes: Vec<Arc<DependencyNode>> = slots.into_iter().flatten().collect();

        let mut partitions: BTreeMap<ComputationTargetType, Vec<usize>> = BTreeMap::new();
        for (i, graph) in graphs.iter().enumerate() {
            partitions.entry(graph.target_type()).or_default().push(i);
        }

        Ok(Self {
            graphs: graphs.into_iter().map(Arc::new).collect(),
            partitions,
            nodes,
        })
    }

    /// Graphs of one partition, in insertion order.
    pub fn dependency_graphs(
        &self,
        target_type: ComputationTargetType,
    ) -> impl Iterator<Item = &Arc<DependencyGraph>> {
        self.partitions
            .get(&target_type)
            .into_iter()
            .flatten()
            .map(move |&i| &self.graphs[i])
    }

    /// Every graph in the model.
    pub fn all_graphs(&self) -> &[Arc<DependencyGraph>] {
        &self.graphs
    }

    /// Graph computed for a target.
    pub fn graph_for(&self, target: &ComputationTarget) -> Option<&Arc<DependencyGraph>> {
        self.graphs.iter().find(|g| g.computation_target() == target)
    }

    /// Union of the live data required by every graph.
    pub fn all_required_live_data(&self) -> BTreeSet<ValueRequirement> {
        self.graphs
            .iter()
            .flat_map(|g| g.required_live_data().iter().cloned())
            .collect()
    }

    /// Node by id.
    pub fn node(&self, id: NodeId) -> Option<&Arc<DependencyNode>> {
        self.nodes.get(id.index())
    }

    /// Total number of nodes across all graphs.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns statistics about the model.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            graph_count: self.graphs.len(),
            node_count: self.nodes.len(),
            edge_count: self.graphs.iter().map(|g| g.edge_count()).sum(),
            live_data_count: self.all_required_live_data().len(),
        }
    }
}

// =============================================================================
// GRAPH MODEL BUILDER
// =============================================================================

/// Builds a [`DependencyGraphModel`] from function registrations.
///
/// Each requirement of a registered function is resolved, in order, against
/// the outputs of any registered node, then against the declared live data.
/// A requirement that matches neither is left dangling: the consuming node
/// gets the requirement's own specification as input and fails with a
/// missing input when it runs.
#[derive(Debug, Default)]
pub struct DependencyGraphModelBuilder {
    registrations: Vec<(ComputationTarget, Arc<dyn CalculationFunction>)>,
    live_data: Vec<ValueRequirement>,
}

impl DependencyGraphModelBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function to compute for a target.
    pub fn with_function(
        mut self,
        target: ComputationTarget,
        function: Arc<dyn CalculationFunction>,
    ) -> Self {
        self.registrations.push((target, function));
        self
    }

    /// Declares a value available from the live data source.
    pub fn with_live_data(mut self, requirement: ValueRequirement) -> Self {
        self.live_data.push(requirement);
        self
    }

    /// Resolves all registrations into a model.
    pub fn build(self) -> Result<DependencyGraphModel, GraphError> {
        let mut declared_outputs: Vec<Vec<ValueSpecification>> =
            Vec::with_capacity(self.registrations.len());
        for (target, function) in &self.registrations {
            if !function.is_applicable_to(target) {
                return Err(GraphError::NotApplicable {
                    function: function.short_name().to_string(),
                    target: target.clone(),
                });
            }
            declared_outputs.push(function.results(target));
        }

        let mut order: Vec<ComputationTarget> = Vec::new();
        let mut grouped: HashMap<
            ComputationTarget,
            (Vec<DependencyNode>, BTreeSet<ValueRequirement>),
        > = HashMap::new();

        for (i, (target, function)) in self.registrations.iter().enumerate() {
            let mut inputs = Vec::new();
            let mut live = BTreeSet::new();

            for requirement in function.requirements(target) {
                if let Some(spec) = declared_outputs
                    .iter()
                    .flatten()
                    .find(|spec| requirement.is_satisfied_by(spec))
                {
                    inputs.push(spec.clone());
                } else if let Some(declared) = self.live_data.iter().find(|declared| {
                    requirement.is_satisfied_by(&ValueSpecification::from_requirement(declared))
                }) {
                    inputs.push(ValueSpecification::from_requirement(declared));
                    live.insert(declared.clone());
                } else {
                    tracing::warn!(
                        function = function.short_name(),
                        target = %target,
                        requirement = %requirement,
                        "Unresolved requirement; node will fail for missing input"
                    );
                    inputs.push(ValueSpecification::from_requirement(&requirement));
                }
            }

            let node = DependencyNode::new(
                NodeId(i as u32),
                target.clone(),
                function.clone(),
                inputs,
                declared_outputs[i].clone(),
            );

            let entry = grouped.entry(target.clone()).or_insert_with(|| {
                order.push(target.clone());
                (Vec::new(), BTreeSet::new())
            });
            entry.0.push(node);
            entry.1.extend(live);
        }

        let mut graphs = Vec::with_capacity(order.len());
        for target in order {
            if let Some((nodes, live)) = grouped.remove(&target) {
                graphs.push(DependencyGraph::new(target, nodes, live)?);
            }
        }
        DependencyGraphModel::new(graphs)
    }
}

// =============================================================================
// GRAPH STATISTICS
// =============================================================================

/// Statistics about a graph model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of graphs (one per target).
    pub graph_count: usize,
    /// Number of nodes.
    pub node_count: usize,
    /// Number of intra-graph dependency edges.
    pub edge_count: usize,
    /// Number of distinct live data requirements.
    pub live_data_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FixedFunction;

    fn spec(name: &str, target: &ComputationTarget) -> ValueSpecification {
        ValueSpecification::new(name, target.clone())
    }

    fn node(
        id: u32,
        target: &ComputationTarget,
        inputs: Vec<ValueSpecification>,
        outputs: Vec<ValueSpecification>,
    ) -> DependencyNode {
        DependencyNode::new(
            NodeId(id),
            target.clone(),
            Arc::new(FixedFunction::new("fixed", vec![], outputs.clone())),
            inputs,
            outputs,
        )
    }

    #[test]
    fn test_topological_order() {
        let t = ComputationTarget::security("IBM");
        // Registered consumer-first; order must still put producers first.
        let c = node(0, &t, vec![spec("B", &t)], vec![spec("C", &t)]);
        let b = node(1, &t, vec![spec("A", &t)], vec![spec("B", &t)]);
        let a = node(2, &t, vec![], vec![spec("A", &t)]);

        let graph = DependencyGraph::new(t.clone(), vec![c, b, a], vec![]).unwrap();
        assert_eq!(
            graph.topological_order(),
            vec![NodeId(2), NodeId(1), NodeId(0)]
        );
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.dependencies_of(NodeId(0)), vec![NodeId(1)]);
        assert_eq!(graph.dependents_of(NodeId(2)), vec![NodeId(1)]);
        assert_eq!(graph.producer_of(&spec("B", &t)), Some(NodeId(1)));
        assert_eq!(graph.output_values().count(), 3);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let t = ComputationTarget::security("IBM");
        let a = node(0, &t, vec![spec("B", &t)], vec![spec("A", &t)]);
        let b = node(1, &t, vec![spec("A", &t)], vec![spec("B", &t)]);
        let err = DependencyGraph::new(t.clone(), vec![a, b], vec![]).unwrap_err();
        assert_eq!(err, GraphError::CircularDependency(t));
    }

    #[test]
    fn test_duplicate_producer_is_rejected() {
        let t = ComputationTarget::security("IBM");
        let a = node(0, &t, vec![], vec![spec("A", &t)]);
        let b = node(1, &t, vec![], vec![spec("A", &t)]);
        let err = DependencyGraph::new(t.clone(), vec![a, b], vec![]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateProducer(spec("A", &t)));
    }

    #[test]
    fn test_duplicate_node_id_is_rejected() {
        let t = ComputationTarget::security("IBM");
        let a = node(0, &t, vec![], vec![spec("A", &t)]);
        let b = node(0, &t, vec![], vec![spec("B", &t)]);
        let err = DependencyGraph::new(t, vec![a, b], vec![]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode(NodeId(0)));
    }

    #[test]
    fn test_model_rejects_node_id_shared_across_graphs() {
        let ibm = ComputationTarget::security("IBM");
        let msft = ComputationTarget::security("MSFT");
        let g1 = DependencyGraph::new(
            ibm.clone(),
            vec![node(0, &ibm, vec![], vec![spec("A", &ibm)])],
            vec![],
        )
        .unwrap();
        let g2 = DependencyGraph::new(
            msft.clone(),
            vec![node(0, &msft, vec![], vec![spec("A", &msft)])],
            vec![],
        )
        .unwrap();
        let err = DependencyGraphModel::new(vec![g1, g2]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode(NodeId(0)));
    }

    #[test]
    fn test_target_mismatch() {
        let security = ComputationTarget::security("IBM");
        let position = ComputationTarget::position("P1");
        let a = node(0, &position, vec![], vec![spec("A", &position)]);
        let err = DependencyGraph::new(security.clone(), vec![a], vec![]).unwrap_err();
        assert!(matches!(err, GraphError::TargetMismatch { .. }));

        // Same category, different security
        let msft = ComputationTarget::security("MSFT");
        let b = node(0, &msft, vec![], vec![spec("B", &msft)]);
        let err = DependencyGraph::new(security.clone(), vec![b], vec![]).unwrap_err();
        assert_eq!(
            err,
            GraphError::TargetMismatch {
                node: NodeId(0),
                node_target: msft,
                graph_target: security,
            }
        );
    }

    #[test]
    fn test_model_rejects_bad_ids() {
        let t = ComputationTarget::security("IBM");
        let a = node(5, &t, vec![], vec![spec("A", &t)]);
        let graph = DependencyGraph::new(t, vec![a], vec![]).unwrap();
        let err = DependencyGraphModel::new(vec![graph]).unwrap_err();
        assert_eq!(err, GraphError::UnknownNode(NodeId(5)));
    }

    #[test]
    fn test_builder_resolves_across_graphs_and_live_data() {
        let usd = ComputationTarget::primitive("USD");
        let pos = ComputationTarget::position("P1");
        let spot = ValueRequirement::new("FxSpot", usd.clone());

        let curve = Arc::new(FixedFunction::new(
            "curve",
            vec![spot.clone()],
            vec![spec("Curve", &usd)],
        ));
        let pv = Arc::new(FixedFunction::new(
            "pv",
            vec![
                ValueRequirement::new("Curve", usd.clone()),
                ValueRequirement::new("Notional", pos.clone()),
            ],
            vec![spec("PV", &pos)],
        ));

        let model = DependencyGraphModelBuilder::new()
            .with_live_data(spot.clone())
            .with_function(pos.clone(), pv)
            .with_function(usd.clone(), curve)
            .build()
            .unwrap();

        assert_eq!(model.node_count(), 2);
        assert_eq!(model.all_graphs().len(), 2);
        assert_eq!(
            model.all_required_live_data().into_iter().collect::<Vec<_>>(),
            vec![spot]
        );

        let pv_graph = model.graph_for(&pos).unwrap();
        let pv_node = &pv_graph.nodes()[0];
        assert_eq!(pv_node.inputs()[0], spec("Curve", &usd));
        // Dangling: neither produced nor declared live
        assert_eq!(pv_node.inputs()[1], spec("Notional", &pos));

        assert_eq!(
            model
                .dependency_graphs(ComputationTargetType::Primitive)
                .count(),
            1
        );
        assert_eq!(
            model
                .dependency_graphs(ComputationTargetType::Security)
                .count(),
            0
        );
        let stats = model.stats();
        assert_eq!(stats.graph_count, 2);
        assert_eq!(stats.live_data_count, 1);
    }

    #[test]
    fn test_builder_rejects_inapplicable_function() {
        let t = ComputationTarget::security("IBM");
        let f = Arc::new(
            FixedFunction::new("sec-only", vec![], vec![spec("A", &t)])
                .applicable_to(ComputationTargetType::Position),
        );
        let err = DependencyGraphModelBuilder::new()
            .with_function(t, f)
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::NotApplicable { .. }));
    }
}
