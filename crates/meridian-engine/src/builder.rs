//! Builder pattern for the view processing context.

use std::sync::Arc;

use meridian_traits::LiveDataSnapshotProvider;

use crate::cache::ComputationCacheSource;
use crate::config::EngineConfig;
use crate::context::ViewProcessingContext;
use crate::error::EngineError;
use crate::listener::{ExecutionListener, NoopListener};

/// Builder for constructing a [`ViewProcessingContext`].
pub struct ViewProcessingContextBuilder {
    config: Option<EngineConfig>,
    live_data: Option<Arc<dyn LiveDataSnapshotProvider>>,
    cache_source: Option<Arc<ComputationCacheSource>>,
    listener: Option<Arc<dyn ExecutionListener>>,
}

impl ViewProcessingContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: None,
            live_data: None,
            cache_source: None,
            listener: None,
        }
    }

    /// Set the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the live data provider.
    pub fn with_live_data(mut self, provider: Arc<dyn LiveDataSnapshotProvider>) -> Self {
        self.live_data = Some(provider);
        self
    }

    /// Share a cache source with other contexts.
    pub fn with_cache_source(mut self, cache_source: Arc<ComputationCacheSource>) -> Self {
        self.cache_source = Some(cache_source);
        self
    }

    /// Set the execution listener.
    pub fn with_listener(mut self, listener: Arc<dyn ExecutionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Build the context, starting its worker pool.
    pub fn build(self) -> Result<ViewProcessingContext, EngineError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let live_data = self
            .live_data
            .ok_or_else(|| EngineError::ConfigError("live_data not configured".into()))?;

        let prefix = config.thread_name_prefix.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.effective_worker_threads())
            .thread_name(move |i| format!("{}-{}", prefix, i))
            .build()
            .map_err(|e| EngineError::WorkerPool(e.to_string()))?;

        tracing::debug!(
            workers = pool.current_num_threads(),
            "View processing context built"
        );

        Ok(ViewProcessingContext {
            config,
            live_data,
            cache_source: self.cache_source.unwrap_or_default(),
            pool: Arc::new(pool),
            listener: self.listener.unwrap_or_else(|| Arc::new(NoopListener)),
        })
    }
}

impl Default for ViewProcessingContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
