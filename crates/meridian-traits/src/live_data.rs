//! Live data snapshot provider trait.
//!
//! A provider hands out snapshot tokens, answers point queries against a
//! snapshot and takes the token back when the cycle is done. Calls are
//! blocking; a provider backed by a network feed is expected to block the
//! calling thread while it fetches.

use crate::error::TraitError;
use crate::ids::{SnapshotToken, ValueRequirement};
use crate::value::Payload;

/// Source of consistent snapshots of external input data.
pub trait LiveDataSnapshotProvider: Send + Sync {
    /// Freeze the current live data and return its identity.
    ///
    /// Called once per cycle.
    fn snapshot(&self) -> Result<SnapshotToken, TraitError>;

    /// Read one live value from a snapshot.
    ///
    /// `Ok(None)` means the value is not available in this snapshot.
    fn query_snapshot(
        &self,
        token: SnapshotToken,
        requirement: &ValueRequirement,
    ) -> Result<Option<Payload>, TraitError>;

    /// Release a snapshot. The token must not be queried afterwards.
    fn release_snapshot(&self, token: SnapshotToken) -> Result<(), TraitError>;
}
