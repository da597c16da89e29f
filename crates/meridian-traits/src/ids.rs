//! Identifier types used across the computation engine.
//!
//! A value is always named for a [`ComputationTarget`]. Before the producing
//! node is known it is asked for with a [`ValueRequirement`], which may leave
//! properties open. Once resolved it is identified by exactly one
//! [`ValueSpecification`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// SNAPSHOT TOKEN
// =============================================================================

/// Identity of one consistent live data snapshot.
///
/// Tokens handed out by a provider are strictly increasing, so two cycles
/// never share a token unless they share a snapshot.
#[derive(
    Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct SnapshotToken(pub i64);

impl SnapshotToken {
    /// Create a new snapshot token.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Raw token value (milliseconds since the epoch for time-based providers).
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SnapshotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "snapshot:{}", self.0)
    }
}

// =============================================================================
// COMPUTATION TARGET
// =============================================================================

/// Category of the entity a computation is performed for.
#[derive(
    Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum ComputationTargetType {
    /// Context-free values (currencies, curves, market-wide inputs).
    Primitive,
    /// A single security.
    Security,
    /// A portfolio position.
    Position,
    /// An aggregate over several positions.
    MultiplePositions,
}

impl ComputationTargetType {
    /// Order in which partitions are executed within a cycle.
    ///
    /// Foundational categories come first so their outputs are in the cache
    /// before categories that reference them run.
    pub const EXECUTION_ORDER: [ComputationTargetType; 4] = [
        ComputationTargetType::Primitive,
        ComputationTargetType::Security,
        ComputationTargetType::Position,
        ComputationTargetType::MultiplePositions,
    ];

    /// Categories whose outputs are published in the result model.
    pub const REPORTABLE: [ComputationTargetType; 2] = [
        ComputationTargetType::Position,
        ComputationTargetType::MultiplePositions,
    ];

    /// Returns true if outputs of this category are reported.
    pub fn is_reportable(&self) -> bool {
        Self::REPORTABLE.contains(self)
    }
}

impl fmt::Display for ComputationTargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive => write!(f, "PRIMITIVE"),
            Self::Security => write!(f, "SECURITY"),
            Self::Position => write!(f, "POSITION"),
            Self::MultiplePositions => write!(f, "MULTIPLE_POSITIONS"),
        }
    }
}

/// The entity a value is computed for (a currency, a security, a position...).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ComputationTarget {
    /// Category of the target
    pub target_type: ComputationTargetType,
    /// Identifier within the category
    pub id: String,
}

impl ComputationTarget {
    /// Create a new target.
    pub fn new(target_type: ComputationTargetType, id: impl Into<String>) -> Self {
        Self {
            target_type,
            id: id.into(),
        }
    }

    /// Creates a primitive target.
    pub fn primitive(id: impl Into<String>) -> Self {
        Self::new(ComputationTargetType::Primitive, id)
    }

    /// Creates a security target.
    pub fn security(id: impl Into<String>) -> Self {
        Self::new(ComputationTargetType::Security, id)
    }

    /// Creates a position target.
    pub fn position(id: impl Into<String>) -> Self {
        Self::new(ComputationTargetType::Position, id)
    }

    /// Creates an aggregate (multiple positions) target.
    pub fn aggregate(id: impl Into<String>) -> Self {
        Self::new(ComputationTargetType::MultiplePositions, id)
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ComputationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type, self.id)
    }
}

// =============================================================================
// VALUE PROPERTIES
// =============================================================================

/// Property constraints of a requirement.
///
/// Each property maps to the set of acceptable values; a multi-valued entry
/// means "any of".
#[derive(Debug, Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ValueProperties(BTreeMap<String, BTreeSet<String>>);

impl ValueProperties {
    /// Creates an empty constraint set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds acceptable values for a property.
    pub fn with(mut self, name: impl Into<String>, values: &[&str]) -> Self {
        self.0
            .entry(name.into())
            .or_default()
            .extend(values.iter().map(|v| v.to_string()));
        self
    }

    /// Returns true if no property is constrained.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Acceptable values for a property, if constrained.
    pub fn values(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.0.get(name)
    }

    /// Iterates over the constrained properties.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }

    /// Returns true if the resolved properties satisfy every constraint.
    pub fn is_satisfied_by(&self, resolved: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|(name, allowed)| {
            resolved
                .get(name)
                .map(|value| allowed.is_empty() || allowed.contains(value))
                .unwrap_or(false)
        })
    }

    /// Resolves each constraint to its smallest acceptable value.
    ///
    /// Properties constrained with an empty set are left out.
    pub fn resolve(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .filter_map(|(name, allowed)| {
                allowed
                    .iter()
                    .next()
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect()
    }
}

fn fmt_resolved(f: &mut fmt::Formatter<'_>, props: &BTreeMap<String, String>) -> fmt::Result {
    if props.is_empty() {
        return Ok(());
    }
    let joined: Vec<String> = props.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    write!(f, "[{}]", joined.join(","))
}

// =============================================================================
// VALUE REQUIREMENT
// =============================================================================

/// An underspecified request for a named value on a target.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ValueRequirement {
    value_name: String,
    target: ComputationTarget,
    #[serde(default)]
    constraints: ValueProperties,
}

impl ValueRequirement {
    /// Creates an unconstrained requirement.
    pub fn new(value_name: impl Into<String>, target: ComputationTarget) -> Self {
        Self {
            value_name: value_name.into(),
            target,
            constraints: ValueProperties::new(),
        }
    }

    /// Sets the property constraints.
    pub fn with_constraints(mut self, constraints: ValueProperties) -> Self {
        self.constraints = constraints;
        self
    }

    /// Name of the requested value.
    pub fn value_name(&self) -> &str {
        &self.value_name
    }

    /// Target the value is requested for.
    pub fn target(&self) -> &ComputationTarget {
        &self.target
    }

    /// Property constraints.
    pub fn constraints(&self) -> &ValueProperties {
        &self.constraints
    }

    /// Returns true if the specification can serve this requirement.
    pub fn is_satisfied_by(&self, spec: &ValueSpecification) -> bool {
        self.value_name == spec.value_name
            && self.target == spec.target
            && self.constraints.is_satisfied_by(&spec.properties)
    }
}

impl fmt::Display for ValueRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.value_name, self.target)?;
        if !self.constraints.is_empty() {
            let joined: Vec<String> = self
                .constraints
                .iter()
                .map(|(k, vs)| {
                    let vs: Vec<&str> = vs.iter().map(String::as_str).collect();
                    format!("{}={}", k, vs.join("|"))
                })
                .collect();
            write!(f, "{{{}}}", joined.join(","))?;
        }
        Ok(())
    }
}

// =============================================================================
// VALUE SPECIFICATION
// =============================================================================

/// A fully resolved identifier for one producible value.
///
/// Within one graph model each specification is produced by at most one node.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ValueSpecification {
    value_name: String,
    target: ComputationTarget,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl ValueSpecification {
    /// Creates a specification with no properties.
    pub fn new(value_name: impl Into<String>, target: ComputationTarget) -> Self {
        Self {
            value_name: value_name.into(),
            target,
            properties: BTreeMap::new(),
        }
    }

    /// Adds a resolved property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Resolves a requirement deterministically.
    ///
    /// Each multi-valued constraint takes its smallest acceptable value. Used
    /// for live data, where the snapshot supplies whatever the requirement
    /// names.
    pub fn from_requirement(requirement: &ValueRequirement) -> Self {
        Self {
            value_name: requirement.value_name.clone(),
            target: requirement.target.clone(),
            properties: requirement.constraints.resolve(),
        }
    }

    /// Name of the value.
    pub fn value_name(&self) -> &str {
        &self.value_name
    }

    /// Target the value is produced for.
    pub fn target(&self) -> &ComputationTarget {
        &self.target
    }

    /// Resolved properties.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Looks up one resolved property.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

impl fmt::Display for ValueSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.value_name, self.target)?;
        fmt_resolved(f, &self.properties)
    }
}
