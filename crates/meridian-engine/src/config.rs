//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Configuration for the computation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker pool size (0 = one worker per available CPU).
    #[serde(default)]
    pub worker_threads: usize,

    /// Prefix for worker thread names.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,

    /// Maximum number of missing live data items listed in the summary warning.
    #[serde(default = "default_max_logged_missing")]
    pub max_logged_missing_live_data: usize,

    /// Whether panics inside calculation functions are contained as node faults.
    #[serde(default = "default_true")]
    pub catch_function_panics: bool,
}

fn default_thread_name_prefix() -> String {
    "meridian-worker".to_string()
}

fn default_max_logged_missing() -> usize {
    50
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            thread_name_prefix: default_thread_name_prefix(),
            max_logged_missing_live_data: default_max_logged_missing(),
            catch_function_panics: true,
        }
    }
}

impl EngineConfig {
    /// Creates a minimal configuration for testing.
    pub fn minimal() -> Self {
        Self {
            worker_threads: 2,
            max_logged_missing_live_data: 10,
            ..Default::default()
        }
    }

    /// Sets the worker pool size.
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> EngineResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| EngineError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the engine cannot work with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.thread_name_prefix.trim().is_empty() {
            return Err(EngineError::ConfigError(
                "thread_name_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Effective number of workers.
    pub fn effective_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            self.worker_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.effective_worker_threads() >= 1);
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml(
            "worker_threads = 4\nmax_logged_missing_live_data = 3\n",
        )
        .unwrap();
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.effective_worker_threads(), 4);
        assert_eq!(config.max_logged_missing_live_data, 3);
        assert_eq!(config.thread_name_prefix, "meridian-worker");
        assert!(config.catch_function_panics);
    }

    #[test]
    fn test_rejects_empty_thread_prefix() {
        let err = EngineConfig::from_toml("thread_name_prefix = \"  \"").unwrap_err();
        assert!(matches!(err, EngineError::ConfigError(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "worker_threads = 3").unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.worker_threads, 3);

        let missing = EngineConfig::from_file("/nonexistent/meridian.toml");
        assert!(matches!(missing, Err(EngineError::ConfigError(_))));
    }
}
