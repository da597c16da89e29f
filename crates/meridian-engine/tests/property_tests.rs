//! Property-based tests for scheduling invariants.
//!
//! These tests verify properties that should hold for any acyclic model:
//! - Every node reaches exactly one terminal state
//! - A node executes iff its function succeeds and all its inputs executed
//! - No node is dispatched before its predecessors complete
//! - Failed functions never publish values

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use meridian_engine::*;
use meridian_ext_memory::InMemoryLiveDataProvider;

// =============================================================================
// TEST DATA GENERATORS
// =============================================================================

#[derive(Debug)]
struct DagFunction {
    requirements: Vec<ValueRequirement>,
    result: ValueSpecification,
    fail: bool,
    calls: AtomicUsize,
}

impl DagFunction {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CalculationFunction for DagFunction {
    fn short_name(&self) -> &str {
        self.result.value_name()
    }

    fn requirements(&self, _target: &ComputationTarget) -> Vec<ValueRequirement> {
        self.requirements.clone()
    }

    fn results(&self, _target: &ComputationTarget) -> Vec<ValueSpecification> {
        vec![self.result.clone()]
    }

    fn execute(
        &self,
        _context: &FunctionExecutionContext,
        _target: &ComputationTarget,
        inputs: &FunctionInputs,
    ) -> Result<Vec<ComputedValue>, FunctionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FunctionError::calculation("scheduled failure"));
        }
        Ok(vec![ComputedValue::new(self.result.clone(), inputs.len() as f64)])
    }
}

#[derive(Debug, Default)]
struct OrderListener {
    dispatched: Mutex<Vec<NodeId>>,
    sequence: Mutex<Vec<(bool, NodeId)>>,
}

impl ExecutionListener for OrderListener {
    fn on_node_dispatched(&self, node: NodeId, _job_id: u64) {
        self.dispatched.lock().unwrap().push(node);
        self.sequence.lock().unwrap().push((false, node));
    }

    fn on_node_completed(&self, node: NodeId, _state: NodeExecutionState) {
        self.sequence.lock().unwrap().push((true, node));
    }
}

/// A random DAG: node `i` may depend on any node `j < i`.
#[derive(Debug, Clone)]
struct Dag {
    deps: Vec<Vec<usize>>,
    failing: Vec<bool>,
}

fn dag_strategy() -> impl Strategy<Value = Dag> {
    (1usize..16).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::bool::weighted(0.3), n * n),
            prop::collection::vec(prop::bool::weighted(0.2), n),
        )
            .prop_map(move |(edges, failing)| Dag {
                deps: (0..n)
                    .map(|i| (0..i).filter(|&j| edges[i * n + j]).collect())
                    .collect(),
                failing,
            })
    })
}

fn value_name(i: usize) -> String {
    format!("V{}", i)
}

struct Harness {
    cycle: SingleComputationCycle,
    functions: Vec<Arc<DagFunction>>,
    listener: Arc<OrderListener>,
    target: ComputationTarget,
}

fn build(dag: &Dag, workers: usize) -> Harness {
    let target = ComputationTarget::position("P1");
    let functions: Vec<Arc<DagFunction>> = dag
        .deps
        .iter()
        .enumerate()
        .map(|(i, deps)| {
            Arc::new(DagFunction {
                requirements: deps
                    .iter()
                    .map(|&j| ValueRequirement::new(value_name(j), target.clone()))
                    .collect(),
                result: ValueSpecification::new(value_name(i), target.clone()),
                fail: dag.failing[i],
                calls: AtomicUsize::new(0),
            })
        })
        .collect();

    let model = functions
        .iter()
        .fold(DependencyGraphModelBuilder::new(), |b, f| {
            b.with_function(target.clone(), f.clone())
        })
        .build()
        .unwrap();

    let listener = Arc::new(OrderListener::default());
    let context = ViewProcessingContextBuilder::new()
        .with_config(EngineConfig::minimal().with_worker_threads(workers))
        .with_live_data(Arc::new(InMemoryLiveDataProvider::new()))
        .with_listener(listener.clone())
        .build()
        .unwrap();

    let cycle = SingleComputationCycle::new(
        "property",
        Arc::new(context),
        Arc::new(model),
        ViewComputationResultModel::new("property"),
    );
    Harness {
        cycle,
        functions,
        listener,
        target,
    }
}

/// Expected terminal state of each node, computed sequentially.
fn expected_executed(dag: &Dag) -> Vec<bool> {
    let mut executed = vec![false; dag.deps.len()];
    for i in 0..dag.deps.len() {
        executed[i] = !dag.failing[i] && dag.deps[i].iter().all(|&j| executed[j]);
    }
    executed
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn every_node_reaches_one_terminal_state(dag in dag_strategy(), workers in 1usize..4) {
        let mut h = build(&dag, workers);
        h.cycle.run().unwrap();

        let counts = h.cycle.node_states().counts();
        prop_assert_eq!(counts.total(), dag.deps.len());
        prop_assert_eq!(counts.executing, 0);
        prop_assert_eq!(counts.not_started, 0);
        prop_assert_eq!(counts.executed + counts.failed, dag.deps.len());

        let mut dispatched = h.listener.dispatched.lock().unwrap().clone();
        dispatched.sort();
        dispatched.dedup();
        prop_assert_eq!(dispatched.len(), dag.deps.len());
    }

    #[test]
    fn execution_matches_sequential_propagation(dag in dag_strategy(), workers in 1usize..4) {
        let mut h = build(&dag, workers);
        h.cycle.run().unwrap();

        let expected = expected_executed(&dag);
        for (i, function) in h.functions.iter().enumerate() {
            let id = NodeId(i as u32);
            prop_assert_eq!(h.cycle.node_states().is_executed(id), expected[i]);

            // A function runs iff all of its inputs were produced.
            let inputs_ready = dag.deps[i].iter().all(|&j| expected[j]);
            prop_assert_eq!(function.calls(), usize::from(inputs_ready));

            let spec = ValueSpecification::new(value_name(i), h.target.clone());
            prop_assert_eq!(h.cycle.result_model().get(&spec).is_some(), expected[i]);
        }
    }

    #[test]
    fn dispatch_respects_dependencies(dag in dag_strategy(), workers in 1usize..4) {
        let mut h = build(&dag, workers);
        h.cycle.run().unwrap();

        let sequence = h.listener.sequence.lock().unwrap().clone();
        let at = |completed: bool, node: usize| {
            sequence
                .iter()
                .position(|&(c, n)| c == completed && n == NodeId(node as u32))
        };
        for (i, deps) in dag.deps.iter().enumerate() {
            let started = at(false, i);
            prop_assert!(started.is_some());
            for &j in deps {
                let done = at(true, j);
                prop_assert!(done.is_some());
                prop_assert!(done < started);
            }
        }
    }
}
