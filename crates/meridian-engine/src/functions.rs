//! Calculation functions provided by the engine itself.

use meridian_traits::{
    CalculationFunction, ComputationTarget, ComputedValue, FunctionError,
    FunctionExecutionContext, FunctionInputs, ValueRequirement, ValueSpecification,
};

/// Marks an output as sourced from the live data repository.
///
/// The engine seeds live values into the cache before any node runs, so this
/// function only declares its result; executing it is a fault.
#[derive(Debug, Clone)]
pub struct LiveDataSourcingFunction {
    requirement: ValueRequirement,
    short_name: String,
}

impl LiveDataSourcingFunction {
    /// Creates a sourcing function for one live value.
    pub fn new(requirement: ValueRequirement) -> Self {
        let short_name = format!("Live Data Source For {}", requirement);
        Self {
            requirement,
            short_name,
        }
    }

    /// The live value this function stands for.
    pub fn requirement(&self) -> &ValueRequirement {
        &self.requirement
    }
}

impl CalculationFunction for LiveDataSourcingFunction {
    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn requirements(&self, _target: &ComputationTarget) -> Vec<ValueRequirement> {
        Vec::new()
    }

    fn results(&self, _target: &ComputationTarget) -> Vec<ValueSpecification> {
        vec![ValueSpecification::from_requirement(&self.requirement)]
    }

    fn execute(
        &self,
        _context: &FunctionExecutionContext,
        _target: &ComputationTarget,
        _inputs: &FunctionInputs,
    ) -> Result<Vec<ComputedValue>, FunctionError> {
        Err(FunctionError::NotExecutable(self.short_name.clone()))
    }
}

#[cfg(test)]
pub(crate) use testing::FixedFunction;

#[cfg(test)]
mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use meridian_traits::{ComputationTargetType, Payload};

    use super::*;

    /// Sums its float inputs and adds one, for every declared result.
    #[derive(Debug)]
    pub(crate) struct FixedFunction {
        name: String,
        requirements: Vec<ValueRequirement>,
        results: Vec<ValueSpecification>,
        applicable: Option<ComputationTargetType>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FixedFunction {
        pub(crate) fn new(
            name: &str,
            requirements: Vec<ValueRequirement>,
            results: Vec<ValueSpecification>,
        ) -> Self {
            Self {
                name: name.to_string(),
                requirements,
                results,
                applicable: None,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn applicable_to(mut self, target_type: ComputationTargetType) -> Self {
            self.applicable = Some(target_type);
            self
        }

        pub(crate) fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CalculationFunction for FixedFunction {
        fn short_name(&self) -> &str {
            &self.name
        }

        fn is_applicable_to(&self, target: &ComputationTarget) -> bool {
            self.applicable
                .map(|t| t == target.target_type)
                .unwrap_or(true)
        }

        fn requirements(&self, _target: &ComputationTarget) -> Vec<ValueRequirement> {
            self.requirements.clone()
        }

        fn results(&self, _target: &ComputationTarget) -> Vec<ValueSpecification> {
            self.results.clone()
        }

        fn execute(
            &self,
            _context: &FunctionExecutionContext,
            _target: &ComputationTarget,
            inputs: &FunctionInputs,
        ) -> Result<Vec<ComputedValue>, FunctionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FunctionError::calculation(format!("{} failed", self.name)));
            }
            let sum: f64 = inputs.iter().filter_map(|(_, p)| p.as_f64()).sum();
            Ok(self
                .results
                .iter()
                .map(|spec| ComputedValue::new(spec.clone(), Payload::Float(sum + 1.0)))
                .collect())
        }
    }
}
