//! Snapshotting in-memory live data provider.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use meridian_traits::error::TraitError;
use meridian_traits::{
    LiveDataSnapshotProvider, Payload, SnapshotToken, ValueRequirement, ValueSpecification,
};

type Values = BTreeMap<ValueSpecification, Payload>;

/// Live data held in memory.
///
/// Writers update the current values at any time. [`snapshot`] copies the
/// current values into a frozen view, so later writes never leak into a
/// cycle already running against an earlier token.
///
/// Tokens are wall-clock milliseconds, bumped when two snapshots land in the
/// same millisecond, so they are strictly increasing.
///
/// [`snapshot`]: LiveDataSnapshotProvider::snapshot
#[derive(Debug, Default)]
pub struct InMemoryLiveDataProvider {
    current: RwLock<Values>,
    snapshots: DashMap<SnapshotToken, Arc<Values>>,
    last_token: AtomicI64,
}

impl InMemoryLiveDataProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current value for a specification.
    pub fn set_value(&self, spec: ValueSpecification, value: impl Into<Payload>) {
        self.current.write().insert(spec, value.into());
    }

    /// Remove the current value for a specification.
    pub fn remove_value(&self, spec: &ValueSpecification) -> Option<Payload> {
        self.current.write().remove(spec)
    }

    /// Remove every current value.
    pub fn clear(&self) {
        self.current.write().clear();
    }

    /// Number of current values.
    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    /// Returns true if no current values are set.
    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Snapshots handed out and not yet released.
    pub fn active_snapshots(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns true if the token is live.
    pub fn is_active(&self, token: SnapshotToken) -> bool {
        self.snapshots.contains_key(&token)
    }

    fn next_token(&self) -> SnapshotToken {
        let now = Utc::now().timestamp_millis();
        let prev = self
            .last_token
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        SnapshotToken(now.max(prev + 1))
    }
}

/// Finds the value serving a requirement.
///
/// The deterministic resolution of the requirement wins; otherwise the
/// smallest specification satisfying it.
fn lookup<'a>(values: &'a Values, requirement: &ValueRequirement) -> Option<&'a Payload> {
    let exact = ValueSpecification::from_requirement(requirement);
    values.get(&exact).or_else(|| {
        values
            .iter()
            .find(|(spec, _)| requirement.is_satisfied_by(spec))
            .map(|(_, payload)| payload)
    })
}

impl LiveDataSnapshotProvider for InMemoryLiveDataProvider {
    fn snapshot(&self) -> Result<SnapshotToken, TraitError> {
        let frozen = Arc::new(self.current.read().clone());
        let token = self.next_token();
        debug!(snapshot = %token, values = frozen.len(), "Live data snapshot taken");
        self.snapshots.insert(token, frozen);
        Ok(token)
    }

    fn query_snapshot(
        &self,
        token: SnapshotToken,
        requirement: &ValueRequirement,
    ) -> Result<Option<Payload>, TraitError> {
        let values = self
            .snapshots
            .get(&token)
            .map(|entry| entry.value().clone())
            .ok_or(TraitError::SnapshotNotFound(token))?;
        Ok(lookup(&values, requirement).cloned())
    }

    fn release_snapshot(&self, token: SnapshotToken) -> Result<(), TraitError> {
        match self.snapshots.remove(&token) {
            Some(_) => {
                debug!(snapshot = %token, "Live data snapshot released");
                Ok(())
            }
            None => Err(TraitError::SnapshotNotFound(token)),
        }
    }
}
