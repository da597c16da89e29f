//! Payloads and computed values.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::ValueSpecification;

/// Opaque data carried by a computed value.
///
/// The engine never inspects payloads; calculation functions agree on shapes
/// among themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Decimal amount (prices, notionals, PVs).
    Decimal(Decimal),

    /// Floating point number (rates, sensitivities).
    Float(f64),

    /// Free text.
    Text(String),

    /// Ordered (x, y) points, e.g. a curve as (tenor, rate).
    Series(Vec<(f64, f64)>),

    /// Structured value.
    Json(serde_json::Value),
}

impl Payload {
    /// Returns the decimal value, if this is a decimal payload.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the numeric value as `f64` for float payloads.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the series points, if this is a series payload.
    pub fn as_series(&self) -> Option<&[(f64, f64)]> {
        match self {
            Self::Series(points) => Some(points),
            _ => None,
        }
    }

    /// Short name of the payload kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decimal(_) => "decimal",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Series(_) => "series",
            Self::Json(_) => "json",
        }
    }
}

impl From<Decimal> for Payload {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d)
    }
}

impl From<f64> for Payload {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// A (specification, payload) pair.
///
/// The unit stored in the computation cache and handed to dependent nodes.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedValue {
    specification: ValueSpecification,
    value: Payload,
}

impl ComputedValue {
    /// Creates a computed value.
    pub fn new(specification: ValueSpecification, value: impl Into<Payload>) -> Self {
        Self {
            specification,
            value: value.into(),
        }
    }

    /// Specification this value satisfies.
    pub fn specification(&self) -> &ValueSpecification {
        &self.specification
    }

    /// Payload.
    pub fn value(&self) -> &Payload {
        &self.value
    }

    /// Splits into specification and payload.
    pub fn into_parts(self) -> (ValueSpecification, Payload) {
        (self.specification, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ComputationTarget;
    use rust_decimal_macros::dec;

    #[test]
    fn test_payload_accessors() {
        let price = Payload::from(dec!(99.50));
        assert_eq!(price.as_decimal(), Some(dec!(99.50)));
        assert_eq!(price.as_f64(), None);
        assert_eq!(price.kind(), "decimal");

        let curve = Payload::Series(vec![(1.0, 0.035), (2.0, 0.038)]);
        assert_eq!(curve.as_series().map(|p| p.len()), Some(2));
    }

    #[test]
    fn test_computed_value_parts() {
        let spec = ValueSpecification::new("MarketPrice", ComputationTarget::security("IBM"));
        let value = ComputedValue::new(spec.clone(), 142.5);
        assert_eq!(value.specification(), &spec);
        let (s, p) = value.into_parts();
        assert_eq!(s, spec);
        assert_eq!(p, Payload::Float(142.5));
    }
}
