//! Result model published at the end of a cycle.
//!
//! The result model is the only thing a consumer sees. A value that was not
//! produced (its node failed, or was never reached) is simply absent:
//! consumers treat absence as "not available this cycle".

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use meridian_traits::{ComputationTarget, ComputedValue, SnapshotToken, ValueSpecification};

/// Values produced by one cycle for the reportable partitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewComputationResultModel {
    view_name: String,
    cycle_id: Option<Uuid>,
    input_data_timestamp: Option<SnapshotToken>,
    result_timestamp: Option<DateTime<Utc>>,
    #[serde(with = "values_as_list")]
    values: HashMap<ValueSpecification, ComputedValue>,
}

// JSON map keys must be strings; specifications travel inside each value.
mod values_as_list {
    use std::collections::HashMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use meridian_traits::{ComputedValue, ValueSpecification};

    pub fn serialize<S: Serializer>(
        values: &HashMap<ValueSpecification, ComputedValue>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut list: Vec<&ComputedValue> = values.values().collect();
        list.sort_by(|a, b| a.specification().cmp(b.specification()));
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<ValueSpecification, ComputedValue>, D::Error> {
        let list = Vec::<ComputedValue>::deserialize(deserializer)?;
        Ok(list
            .into_iter()
            .map(|v| (v.specification().clone(), v))
            .collect())
    }
}

impl ViewComputationResultModel {
    /// Creates an empty result model for a view.
    pub fn new(view_name: impl Into<String>) -> Self {
        Self {
            view_name: view_name.into(),
            ..Default::default()
        }
    }

    /// View the results belong to.
    pub fn view_name(&self) -> &str {
        &self.view_name
    }

    /// Cycle that produced the results.
    pub fn cycle_id(&self) -> Option<Uuid> {
        self.cycle_id
    }

    pub(crate) fn set_cycle_id(&mut self, cycle_id: Uuid) {
        self.cycle_id = Some(cycle_id);
    }

    /// Snapshot the inputs were taken from.
    pub fn input_data_timestamp(&self) -> Option<SnapshotToken> {
        self.input_data_timestamp
    }

    pub(crate) fn set_input_data_timestamp(&mut self, snapshot: SnapshotToken) {
        self.input_data_timestamp = Some(snapshot);
    }

    /// When the results were populated.
    pub fn result_timestamp(&self) -> Option<DateTime<Utc>> {
        self.result_timestamp
    }

    pub(crate) fn set_result_timestamp(&mut self, at: DateTime<Utc>) {
        self.result_timestamp = Some(at);
    }

    /// Adds a value. A value for the same specification replaces the old one.
    pub fn add_value(&mut self, value: ComputedValue) {
        self.values.insert(value.specification().clone(), value);
    }

    /// Looks up a value.
    pub fn get(&self, spec: &ValueSpecification) -> Option<&ComputedValue> {
        self.values.get(spec)
    }

    /// All values, in no particular order.
    pub fn values(&self) -> impl Iterator<Item = &ComputedValue> {
        self.values.values()
    }

    /// Values computed for one target.
    pub fn values_for_target<'a>(
        &'a self,
        target: &'a ComputationTarget,
    ) -> impl Iterator<Item = &'a ComputedValue> + 'a {
        self.values
            .values()
            .filter(move |v| v.specification().target() == target)
    }

    /// Every specification with a value.
    pub fn specifications(&self) -> impl Iterator<Item = &ValueSpecification> {
        self.values.keys()
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no values were produced.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serializes the model to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_traits::Payload;

    #[test]
    fn test_add_and_query() {
        let p1 = ComputationTarget::position("P1");
        let p2 = ComputationTarget::position("P2");
        let mut model = ViewComputationResultModel::new("Equity Desk");
        model.add_value(ComputedValue::new(ValueSpecification::new("PV", p1.clone()), 10.0));
        model.add_value(ComputedValue::new(ValueSpecification::new("Delta", p1.clone()), 0.5));
        model.add_value(ComputedValue::new(ValueSpecification::new("PV", p2.clone()), 20.0));

        assert_eq!(model.len(), 3);
        assert_eq!(model.values_for_target(&p1).count(), 2);
        assert_eq!(
            model
                .get(&ValueSpecification::new("PV", p2))
                .map(|v| v.value().clone()),
            Some(Payload::Float(20.0))
        );
        assert_eq!(model.view_name(), "Equity Desk");
    }

    #[test]
    fn test_json_includes_metadata() {
        let mut model = ViewComputationResultModel::new("view");
        model.set_input_data_timestamp(SnapshotToken(42));
        model.add_value(ComputedValue::new(
            ValueSpecification::new("PV", ComputationTarget::position("P1")),
            1.5,
        ));
        let json = model.to_json().unwrap();
        assert!(json.contains("\"input_data_timestamp\":42"));

        let back: ViewComputationResultModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.input_data_timestamp(), Some(SnapshotToken(42)));
    }
}
