//! Dispatcher and worker pool configuration structures.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Environment variable holding the worker thread count.
pub const ENV_WORKER_COUNT: &str = "SCHEDULER_WORKER_COUNT";
/// Environment variable holding the worker stack size in bytes.
pub const ENV_THREAD_STACK_SIZE: &str = "SCHEDULER_THREAD_STACK_SIZE";
/// Environment variable holding the shutdown grace period in milliseconds.
pub const ENV_SHUTDOWN_TIMEOUT_MS: &str = "SCHEDULER_SHUTDOWN_TIMEOUT_MS";
/// Environment variable toggling [`DispatcherConfig::drain_terminated_backlog`].
pub const ENV_DRAIN_TERMINATED_BACKLOG: &str = "SCHEDULER_DRAIN_TERMINATED_BACKLOG";
/// Environment variable holding the number of resources built at startup.
pub const ENV_INITIAL_RESOURCES: &str = "SCHEDULER_INITIAL_RESOURCES";

const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2_000;

/// Worker thread pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Number of dedicated worker threads executing sends.
    pub worker_count: usize,
    /// Stack size for each worker thread, in bytes.
    pub thread_stack_size: usize,
    /// How long `shutdown` waits for workers to exit, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
            thread_stack_size: DEFAULT_STACK_SIZE,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl WorkerPoolConfig {
    /// Defaults: one worker per CPU, 2 MiB stacks, 2 s shutdown grace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread count.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the worker stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Set the shutdown grace period.
    #[must_use]
    pub const fn with_shutdown_timeout_ms(mut self, millis: u64) -> Self {
        self.shutdown_timeout_ms = millis;
        self
    }

    /// Shutdown grace period as a `Duration`.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validate worker pool values.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }
}

/// Root dispatcher configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Worker pool settings.
    pub worker_pool: WorkerPoolConfig,
    /// Let the idle-resource scan pop from terminated groups whose backlog is
    /// not empty. Off by default: terminated groups then drain only through
    /// group affinity on completion.
    pub drain_terminated_backlog: bool,
    /// Resources the builder creates from its factory at startup.
    pub initial_resources: usize,
}

impl DispatcherConfig {
    /// Defaults for every field.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the worker pool settings.
    #[must_use]
    pub fn with_worker_pool(mut self, worker_pool: WorkerPoolConfig) -> Self {
        self.worker_pool = worker_pool;
        self
    }

    /// Toggle draining of terminated groups by the scan.
    #[must_use]
    pub const fn with_drain_terminated_backlog(mut self, drain: bool) -> Self {
        self.drain_terminated_backlog = drain;
        self
    }

    /// Set how many resources the builder creates at startup.
    #[must_use]
    pub const fn with_initial_resources(mut self, count: usize) -> Self {
        self.initial_resources = count;
        self
    }

    /// Validate all nested settings.
    pub fn validate(&self) -> Result<(), String> {
        self.worker_pool
            .validate()
            .map_err(|e| format!("worker_pool invalid: {e}"))
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `SCHEDULER_*` environment variables, loading
    /// a `.env` file first if one exists. Unset variables keep their defaults.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Some(v) = read_env(ENV_WORKER_COUNT)? {
            cfg.worker_pool.worker_count = v;
        }
        if let Some(v) = read_env(ENV_THREAD_STACK_SIZE)? {
            cfg.worker_pool.thread_stack_size = v;
        }
        if let Some(v) = read_env(ENV_SHUTDOWN_TIMEOUT_MS)? {
            cfg.worker_pool.shutdown_timeout_ms = v;
        }
        if let Some(v) = read_env(ENV_DRAIN_TERMINATED_BACKLOG)? {
            cfg.drain_terminated_backlog = v;
        }
        if let Some(v) = read_env(ENV_INITIAL_RESOURCES)? {
            cfg.initial_resources = v;
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn read_env<T>(key: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key}={raw} is not valid")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("{key} is not readable")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = DispatcherConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.worker_pool.worker_count >= 1);
        assert!(!cfg.drain_terminated_backlog);
        assert_eq!(cfg.initial_resources, 0);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let cfg = WorkerPoolConfig::new().with_worker_count(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_tiny_stack_rejected() {
        let cfg = WorkerPoolConfig::new().with_thread_stack_size(1024);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_shutdown_timeout_conversion() {
        let cfg = WorkerPoolConfig::new().with_shutdown_timeout_ms(1500);
        assert_eq!(cfg.shutdown_timeout(), Duration::from_millis(1500));
    }
}
