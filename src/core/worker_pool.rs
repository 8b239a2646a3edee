//! Fixed pool of dedicated OS threads that execute jobs.
//!
//! Each worker owns a single-threaded tokio runtime and blocks on a shared
//! crossbeam channel, so jobs are pulled as soon as a worker is free and no
//! thread ever polls. Shutdown drops the sender: idle workers wake with a
//! disconnected channel and exit, busy workers exit after their current job.
//!
//! # Example
//!
//! ```rust,ignore
//! use resource_scheduler::config::WorkerPoolConfig;
//! use resource_scheduler::core::{WorkerExecutor, WorkerPool};
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::new().with_worker_count(4), my_executor)?;
//! pool.submit(job)?;
//! pool.shutdown();
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::WorkerPoolConfig;
use crate::core::executor::WorkerExecutor;

/// Errors that can occur when using a `WorkerPool`.
#[derive(Debug)]
pub enum PoolError {
    /// The pool has been shut down.
    PoolShutdown,

    /// Configuration validation failed.
    InvalidConfig(String),

    /// Internal error (thread spawn failure, runtime construction, etc.).
    Internal(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolShutdown => write!(f, "pool has been shut down"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,

    /// Jobs currently executing.
    pub active_jobs: u64,

    /// Jobs waiting in the channel.
    pub queued_jobs: u64,

    /// Jobs that ran to completion.
    pub completed_jobs: u64,

    /// Jobs whose execution panicked.
    pub failed_jobs: u64,

    /// Jobs accepted by `submit`.
    pub submitted_jobs: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_jobs: AtomicU64,
    pub queued_jobs: AtomicU64,
    pub completed_jobs: AtomicU64,
    pub failed_jobs: AtomicU64,
    pub submitted_jobs: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            active_jobs: self.active_jobs.load(Ordering::Relaxed),
            queued_jobs: self.queued_jobs.load(Ordering::Relaxed),
            completed_jobs: self.completed_jobs.load(Ordering::Relaxed),
            failed_jobs: self.failed_jobs.load(Ordering::Relaxed),
            submitted_jobs: self.submitted_jobs.load(Ordering::Relaxed),
        }
    }
}

/// Worker pool with dedicated OS threads.
pub struct WorkerPool<J, E>
where
    J: Send + 'static,
    E: WorkerExecutor<J>,
{
    /// Pool configuration.
    config: WorkerPoolConfig,

    /// Job sender. `None` once shut down, which disconnects the workers.
    job_tx: Mutex<Option<Sender<J>>>,

    /// Statistics counters.
    counters: Arc<PoolCounters>,

    /// Shutdown flag.
    shutdown: Arc<AtomicBool>,

    /// Worker thread handles.
    workers: Mutex<Vec<JoinHandle<()>>>,

    _executor: std::marker::PhantomData<E>,
}

impl<J, E> WorkerPool<J, E>
where
    J: Send + 'static,
    E: WorkerExecutor<J>,
{
    /// Create a pool and spawn `config.worker_count` worker threads.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidConfig` if the configuration is invalid,
    /// `PoolError::Internal` if a worker thread cannot be spawned.
    pub fn new(config: WorkerPoolConfig, executor: E) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let (job_tx, job_rx) = unbounded::<J>();
        let counters = Arc::new(PoolCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let spawned = spawn_worker(
                worker_id,
                job_rx.clone(),
                Arc::clone(&counters),
                Arc::clone(&shutdown),
                executor.clone(),
                config.thread_stack_size,
            );
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Disconnect the workers that did start before bailing.
                    shutdown.store(true, Ordering::Release);
                    drop(job_tx);
                    return Err(PoolError::Internal(format!(
                        "failed to spawn worker {worker_id}: {e}"
                    )));
                }
            }
        }

        info!(worker_count = config.worker_count, "worker pool started");

        Ok(Self {
            config,
            job_tx: Mutex::new(Some(job_tx)),
            counters,
            shutdown,
            workers: Mutex::new(workers),
            _executor: std::marker::PhantomData,
        })
    }

    /// Hand a job to the next free worker. Never blocks.
    ///
    /// # Errors
    ///
    /// `PoolError::PoolShutdown` once `shutdown` has been called.
    pub fn submit(&self, job: J) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }

        let job_tx = self.job_tx.lock();
        let Some(job_tx) = job_tx.as_ref() else {
            return Err(PoolError::PoolShutdown);
        };

        // Count before sending so a fast worker never decrements below zero.
        self.counters.queued_jobs.fetch_add(1, Ordering::Relaxed);
        if job_tx.send(job).is_err() {
            self.counters.queued_jobs.fetch_sub(1, Ordering::Relaxed);
            return Err(PoolError::PoolShutdown);
        }
        self.counters.submitted_jobs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Whether `shutdown` has been called.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.config.worker_count)
    }

    /// Stop accepting jobs and wait (bounded) for workers to exit.
    ///
    /// Jobs still queued are dropped. A job that is running when the grace
    /// period expires keeps its thread, which is detached.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("shutting down worker pool");

        {
            let mut job_tx = self.job_tx.lock();
            *job_tx = None;
        }

        let deadline = Instant::now() + self.config.shutdown_timeout();
        let current = thread::current().id();
        let mut workers = self.workers.lock();
        let worker_count = workers.len();

        for (idx, worker) in workers.drain(..).enumerate() {
            if worker.thread().id() == current {
                // Shutdown requested from a completion running on this worker.
                debug!(worker_id = idx, "skipping join of calling worker");
                continue;
            }
            while !worker.is_finished() && Instant::now() < deadline {
                thread::sleep(std::time::Duration::from_millis(5));
            }
            if worker.is_finished() {
                if worker.join().is_err() {
                    warn!(worker_id = idx, "worker panicked");
                }
            } else {
                warn!(worker_id = idx, "worker did not exit within timeout - detaching");
            }
        }

        info!(worker_count, "worker pool shut down");
    }
}

impl<J, E> Drop for WorkerPool<J, E>
where
    J: Send + 'static,
    E: WorkerExecutor<J>,
{
    fn drop(&mut self) {
        // Disconnect but never join here: the last handle may be dropped from
        // a worker thread.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            let mut job_tx = self.job_tx.lock();
            *job_tx = None;
            debug!("worker pool dropped without explicit shutdown - workers detached");
        }
    }
}

fn spawn_worker<J, E>(
    worker_id: usize,
    job_rx: Receiver<J>,
    counters: Arc<PoolCounters>,
    shutdown: Arc<AtomicBool>,
    executor: E,
    stack_size: usize,
) -> std::io::Result<JoinHandle<()>>
where
    J: Send + 'static,
    E: WorkerExecutor<J>,
{
    thread::Builder::new()
        .name(format!("rs-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id, "worker thread started");

            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!(worker_id, error = %e, "failed to create worker runtime");
                    return;
                }
            };

            // Blocks until a job arrives; a dropped sender ends the loop.
            while let Ok(job) = job_rx.recv() {
                counters.queued_jobs.fetch_sub(1, Ordering::Relaxed);
                if shutdown.load(Ordering::Acquire) {
                    debug!(worker_id, "dropping job queued before shutdown");
                    break;
                }

                counters.active_jobs.fetch_add(1, Ordering::Relaxed);
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    rt.block_on(executor.execute(job));
                }));
                counters.active_jobs.fetch_sub(1, Ordering::Relaxed);

                if outcome.is_ok() {
                    counters.completed_jobs.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.failed_jobs.fetch_add(1, Ordering::Relaxed);
                    error!(worker_id, "job panicked; worker continues");
                }
            }

            debug!(worker_id, "worker thread exiting");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct CountingExecutor {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WorkerExecutor<u64> for CountingExecutor {
        async fn execute(&self, job: u64) {
            tokio::time::sleep(Duration::from_millis(job)).await;
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_for(pred: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if pred() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        pred()
    }

    #[test]
    fn test_pool_error_display() {
        assert_eq!(PoolError::PoolShutdown.to_string(), "pool has been shut down");
        assert_eq!(
            PoolError::InvalidConfig("x".into()).to_string(),
            "invalid configuration: x"
        );
    }

    #[test]
    fn test_pool_counters_snapshot() {
        let counters = PoolCounters::default();
        counters.submitted_jobs.fetch_add(10, Ordering::Relaxed);
        counters.completed_jobs.fetch_add(5, Ordering::Relaxed);

        let stats = counters.snapshot(4);
        assert_eq!(stats.worker_count, 4);
        assert_eq!(stats.submitted_jobs, 10);
        assert_eq!(stats.completed_jobs, 5);
    }

    #[test]
    fn test_runs_submitted_jobs() {
        let executor = CountingExecutor::default();
        let pool = WorkerPool::<u64, _>::new(
            WorkerPoolConfig::new().with_worker_count(2),
            executor.clone(),
        )
        .unwrap();

        for _ in 0..6 {
            pool.submit(1).unwrap();
        }

        assert!(wait_for(|| executor.runs.load(Ordering::SeqCst) == 6));
        assert!(wait_for(|| pool.stats().completed_jobs == 6));
        assert_eq!(pool.stats().submitted_jobs, 6);
        pool.shutdown();
    }

    #[test]
    fn test_rejects_after_shutdown() {
        let pool = WorkerPool::<u64, _>::new(
            WorkerPoolConfig::new().with_worker_count(1),
            CountingExecutor::default(),
        )
        .unwrap();
        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(matches!(pool.submit(1), Err(PoolError::PoolShutdown)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = WorkerPool::<u64, _>::new(
            WorkerPoolConfig::new().with_worker_count(0),
            CountingExecutor::default(),
        );
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }

    #[derive(Clone)]
    struct PanickingExecutor;

    #[async_trait]
    impl WorkerExecutor<bool> for PanickingExecutor {
        async fn execute(&self, explode: bool) {
            assert!(!explode, "boom");
        }
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::<bool, _>::new(
            WorkerPoolConfig::new().with_worker_count(1),
            PanickingExecutor,
        )
        .unwrap();
        pool.submit(true).unwrap();
        pool.submit(false).unwrap();

        assert!(wait_for(|| pool.stats().completed_jobs == 1));
        assert_eq!(pool.stats().failed_jobs, 1);
        pool.shutdown();
    }
}
