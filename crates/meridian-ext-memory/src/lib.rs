//! # Meridian Ext Memory
//!
//! In-memory live data for the Meridian computation engine.
//!
//! This crate provides a default [`LiveDataSnapshotProvider`] for tests,
//! demos and batch runs:
//! - [`InMemoryLiveDataProvider`]: mutable current values, frozen per snapshot
//! - JSON fixture loading via [`InMemoryLiveDataProvider::from_json_file`]
//!
//! For production feeds, implement [`LiveDataSnapshotProvider`] over the
//! feed's own snapshot facility.
//!
//! [`LiveDataSnapshotProvider`]: meridian_traits::LiveDataSnapshotProvider

#![warn(missing_docs)]
#![warn(clippy::all)]

mod fixture;
mod provider;

pub use fixture::LiveDataRecord;
pub use provider::*;
