//! JSON fixtures for the in-memory provider.
//!
//! A fixture is a list of records:
//!
//! ```json
//! [
//!   {
//!     "value_name": "Market_Price",
//!     "target": { "target_type": "Security", "id": "IBM" },
//!     "value": { "Float": 101.25 }
//!   },
//!   {
//!     "value_name": "Curve",
//!     "target": { "target_type": "Primitive", "id": "USD" },
//!     "properties": { "Curve": "SOFR" },
//!     "value": { "Series": [[1.0, 0.051], [5.0, 0.046]] }
//!   }
//! ]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use meridian_traits::error::TraitError;
use meridian_traits::{ComputationTarget, Payload, ValueSpecification};

use crate::provider::InMemoryLiveDataProvider;

/// One live value in a fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveDataRecord {
    /// Value name.
    pub value_name: String,
    /// Target the value belongs to.
    pub target: ComputationTarget,
    /// Resolved properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// The value.
    pub value: Payload,
}

impl LiveDataRecord {
    fn specification(&self) -> ValueSpecification {
        self.properties.iter().fold(
            ValueSpecification::new(self.value_name.clone(), self.target.clone()),
            |spec, (name, value)| spec.with_property(name.clone(), value.clone()),
        )
    }
}

impl InMemoryLiveDataProvider {
    /// Load current values from a JSON string, replacing values with the
    /// same specification. Returns the number of records loaded.
    pub fn load_json(&self, content: &str) -> Result<usize, TraitError> {
        let records: Vec<LiveDataRecord> = serde_json::from_str(content)?;
        let count = records.len();
        for record in records {
            let spec = record.specification();
            self.set_value(spec, record.value);
        }
        debug!(records = count, "Live data fixture loaded");
        Ok(count)
    }

    /// Create a provider from a JSON fixture file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TraitError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let provider = Self::new();
        provider.load_json(&content)?;
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_traits::{LiveDataSnapshotProvider, ValueProperties, ValueRequirement};
    use std::io::Write;

    const FIXTURE: &str = r#"[
        {
            "value_name": "Market_Price",
            "target": { "target_type": "Security", "id": "IBM" },
            "value": { "Float": 101.25 }
        },
        {
            "value_name": "Curve",
            "target": { "target_type": "Primitive", "id": "USD" },
            "properties": { "Curve": "SOFR" },
            "value": { "Series": [[1.0, 0.051], [5.0, 0.046]] }
        }
    ]"#;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();

        let provider = InMemoryLiveDataProvider::from_json_file(file.path()).unwrap();
        assert_eq!(provider.len(), 2);

        let token = provider.snapshot().unwrap();
        let price = provider
            .query_snapshot(
                token,
                &ValueRequirement::new("Market_Price", ComputationTarget::security("IBM")),
            )
            .unwrap();
        assert_eq!(price, Some(Payload::Float(101.25)));

        let curve = provider
            .query_snapshot(
                token,
                &ValueRequirement::new("Curve", ComputationTarget::primitive("USD"))
                    .with_constraints(ValueProperties::new().with("Curve", &["SOFR"])),
            )
            .unwrap();
        assert_eq!(
            curve.as_ref().and_then(|p| p.as_series()).map(|s| s.len()),
            Some(2)
        );
    }

    #[test]
    fn test_malformed_fixture() {
        let provider = InMemoryLiveDataProvider::new();
        let result = provider.load_json("{ not json");
        assert!(matches!(result, Err(TraitError::ParseError(_))));
        assert!(provider.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = InMemoryLiveDataProvider::from_json_file(dir.path().join("absent.json"));
        assert!(matches!(result, Err(TraitError::IoError(_))));
    }
}
