//! View processing context - the collaborators shared by every cycle of a view.

use std::fmt;
use std::sync::Arc;

use meridian_traits::LiveDataSnapshotProvider;

use crate::cache::ComputationCacheSource;
use crate::config::EngineConfig;
use crate::listener::ExecutionListener;

/// Collaborators a cycle runs against.
///
/// Built once and shared by all cycles; the cache source hands each cycle
/// its own snapshot-scoped store.
pub struct ViewProcessingContext {
    /// Engine configuration
    pub(crate) config: EngineConfig,

    /// Live data snapshot provider
    pub(crate) live_data: Arc<dyn LiveDataSnapshotProvider>,

    /// Computation cache source
    pub(crate) cache_source: Arc<ComputationCacheSource>,

    /// Worker pool for node execution
    pub(crate) pool: Arc<rayon::ThreadPool>,

    /// Execution listener
    pub(crate) listener: Arc<dyn ExecutionListener>,
}

impl ViewProcessingContext {
    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the live data provider.
    pub fn live_data(&self) -> &Arc<dyn LiveDataSnapshotProvider> {
        &self.live_data
    }

    /// Get the computation cache source.
    pub fn cache_source(&self) -> &Arc<ComputationCacheSource> {
        &self.cache_source
    }

    /// Number of workers in the pool.
    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl fmt::Debug for ViewProcessingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewProcessingContext")
            .field("config", &self.config)
            .field("active_caches", &self.cache_source.active_caches())
            .field("worker_threads", &self.pool.current_num_threads())
            .finish()
    }
}
