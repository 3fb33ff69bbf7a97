use std::time::Duration;

use backbone_core::{Locale, DEFAULT_LOCALE};

/// Errors raised by configuration validation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be at least 1")]
    MustBePositive { field: &'static str },
}

/// Orchestration-level configuration.
///
/// Controls the background worker pool and default locale. Every field can be
/// supplied as a flag or through its environment variable.
#[derive(Debug, Clone, clap::Args)]
pub struct ServerConfig {
    /// Number of background workers draining the task queue.
    #[arg(long, env = "BACKGROUND_WORKERS", default_value_t = 4)]
    pub background_workers: usize,
    /// Capacity of the bounded background submission queue.
    #[arg(long, env = "BACKGROUND_QUEUE_SIZE", default_value_t = 256)]
    pub background_queue_size: usize,
    /// Locale used when a request does not specify one.
    #[arg(long, env = "DEFAULT_LOCALE", default_value = DEFAULT_LOCALE)]
    pub default_locale: String,
    /// Upper bound on waiting for background work during shutdown.
    #[arg(long, env = "DRAIN_TIMEOUT_MS", default_value_t = 30_000)]
    pub drain_timeout_ms: u64,
}

impl ServerConfig {
    /// Checks the invariants the executor relies on.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker count or queue size is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.background_workers == 0 {
            return Err(ConfigError::MustBePositive {
                field: "background_workers",
            });
        }
        if self.background_queue_size == 0 {
            return Err(ConfigError::MustBePositive {
                field: "background_queue_size",
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn default_locale(&self) -> Locale {
        Locale::new(self.default_locale.clone())
    }

    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            background_workers: 4,
            background_queue_size: 256,
            default_locale: DEFAULT_LOCALE.to_string(),
            drain_timeout_ms: 30_000,
        }
    }
}
