//! Snapshot-scoped computation caches.
//!
//! A [`ComputationCache`] maps value specifications to computed values for
//! one (view, snapshot) pair. It is populated by live data seeding and by
//! node completions, read by dependent nodes and by result population, and
//! invalidated when the owning cycle releases its resources.
//!
//! Each specification is written at most once, so the store is a sharded map
//! with no whole-store locking: concurrent writers always hit distinct keys
//! and readers only look up keys whose producer has completed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use meridian_traits::{ComputedValue, SnapshotToken, ValueSpecification};

use crate::error::CacheError;

// =============================================================================
// COMPUTATION CACHE
// =============================================================================

/// Value store for one view at one snapshot.
#[derive(Debug)]
pub struct ComputationCache {
    view_name: String,
    snapshot: SnapshotToken,
    values: DashMap<ValueSpecification, ComputedValue>,
    released: AtomicBool,
}

impl ComputationCache {
    /// Creates an empty cache scoped to a view and snapshot.
    pub fn new(view_name: impl Into<String>, snapshot: SnapshotToken) -> Self {
        Self {
            view_name: view_name.into(),
            snapshot,
            values: DashMap::new(),
            released: AtomicBool::new(false),
        }
    }

    /// View this cache belongs to.
    pub fn view_name(&self) -> &str {
        &self.view_name
    }

    /// Snapshot this cache belongs to.
    pub fn snapshot(&self) -> SnapshotToken {
        self.snapshot
    }

    fn released_error(&self) -> CacheError {
        CacheError::Released {
            view: self.view_name.clone(),
            snapshot: self.snapshot,
        }
    }

    fn ensure_live(&self) -> Result<(), CacheError> {
        if self.released.load(Ordering::Acquire) {
            Err(self.released_error())
        } else {
            Ok(())
        }
    }

    /// Stores a value keyed by its specification.
    ///
    /// Writing the same specification twice is a [`CacheError::DuplicateValue`].
    pub fn put(&self, value: ComputedValue) -> Result<(), CacheError> {
        self.ensure_live()?;
        match self.values.entry(value.specification().clone()) {
            Entry::Occupied(entry) => Err(CacheError::DuplicateValue(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(value);
                Ok(())
            }
        }?;
        // A release racing with this put must not leave the value readable.
        if self.released.load(Ordering::Acquire) {
            self.values.clear();
            return Err(self.released_error());
        }
        Ok(())
    }

    /// Looks up a value.
    pub fn get(&self, spec: &ValueSpecification) -> Result<Option<ComputedValue>, CacheError> {
        self.ensure_live()?;
        Ok(self.values.get(spec).map(|v| v.value().clone()))
    }

    /// Returns true if a value is stored for the specification.
    pub fn contains(&self, spec: &ValueSpecification) -> Result<bool, CacheError> {
        self.ensure_live()?;
        Ok(self.values.contains_key(spec))
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns true once the cache has been released.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Invalidates the cache. Subsequent reads and writes fail.
    pub(crate) fn release(&self) {
        self.released.store(true, Ordering::Release);
        self.values.clear();
    }
}

// =============================================================================
// CACHE SOURCE
// =============================================================================

/// Hands out caches keyed by (view, snapshot).
///
/// Requesting the same pair twice returns the same store; a different
/// snapshot always gets a distinct, independent one.
#[derive(Debug, Default)]
pub struct ComputationCacheSource {
    caches: DashMap<(String, SnapshotToken), Arc<ComputationCache>>,
}

impl ComputationCacheSource {
    /// Creates an empty cache source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets or creates the cache for a view at a snapshot.
    pub fn get_cache(&self, view_name: &str, snapshot: SnapshotToken) -> Arc<ComputationCache> {
        self.caches
            .entry((view_name.to_string(), snapshot))
            .or_insert_with(|| Arc::new(ComputationCache::new(view_name, snapshot)))
            .clone()
    }

    /// Releases and forgets the cache for a view at a snapshot.
    ///
    /// Returns false if no such cache exists.
    pub fn release_cache(&self, view_name: &str, snapshot: SnapshotToken) -> bool {
        match self.caches.remove(&(view_name.to_string(), snapshot)) {
            Some((_, cache)) => {
                cache.release();
                tracing::debug!(
                    view = view_name,
                    snapshot = %snapshot,
                    "Computation cache released"
                );
                true
            }
            None => false,
        }
    }

    /// Number of caches not yet released.
    pub fn active_caches(&self) -> usize {
        self.caches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_traits::{ComputationTarget, Payload};

    fn spec(name: &str) -> ValueSpecification {
        ValueSpecification::new(name, ComputationTarget::security("IBM"))
    }

    #[test]
    fn test_put_and_get() {
        let cache = ComputationCache::new("view", SnapshotToken(1));
        cache.put(ComputedValue::new(spec("Price"), 101.0)).unwrap();

        let value = cache.get(&spec("Price")).unwrap().unwrap();
        assert_eq!(value.value(), &Payload::Float(101.0));
        assert!(cache.get(&spec("Yield")).unwrap().is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_double_write_is_rejected() {
        let cache = ComputationCache::new("view", SnapshotToken(1));
        cache.put(ComputedValue::new(spec("Price"), 101.0)).unwrap();
        let err = cache.put(ComputedValue::new(spec("Price"), 102.0)).unwrap_err();
        assert_eq!(err, CacheError::DuplicateValue(spec("Price")));

        // First write wins
        let value = cache.get(&spec("Price")).unwrap().unwrap();
        assert_eq!(value.value(), &Payload::Float(101.0));
    }

    #[test]
    fn test_released_cache_fails_fast() {
        let source = ComputationCacheSource::new();
        let cache = source.get_cache("view", SnapshotToken(7));
        cache.put(ComputedValue::new(spec("Price"), 1.0)).unwrap();

        assert!(source.release_cache("view", SnapshotToken(7)));
        assert!(cache.is_released());
        assert!(matches!(
            cache.get(&spec("Price")),
            Err(CacheError::Released { .. })
        ));
        assert!(matches!(
            cache.put(ComputedValue::new(spec("Yield"), 0.05)),
            Err(CacheError::Released { .. })
        ));
        assert!(!source.release_cache("view", SnapshotToken(7)));
        assert_eq!(source.active_caches(), 0);
    }

    #[test]
    fn test_source_isolates_snapshots() {
        let source = ComputationCacheSource::new();
        let first = source.get_cache("view", SnapshotToken(1));
        let second = source.get_cache("view", SnapshotToken(2));
        let first_again = source.get_cache("view", SnapshotToken(1));

        assert!(Arc::ptr_eq(&first, &first_again));
        assert!(!Arc::ptr_eq(&first, &second));

        first.put(ComputedValue::new(spec("Price"), 1.0)).unwrap();
        assert!(second.get(&spec("Price")).unwrap().is_none());
        assert_eq!(source.active_caches(), 2);
    }

    #[test]
    fn test_concurrent_distinct_writes() {
        let cache = Arc::new(ComputationCache::new("view", SnapshotToken(1)));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let s = spec(&format!("V{}_{}", t, i));
                        cache.put(ComputedValue::new(s, i as f64)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 800);
    }
}
