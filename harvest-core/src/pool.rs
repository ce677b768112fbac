//! Bounded CPU pool for hashing and resizing.
//!
//! Decoding and resampling large images would stall the async runtime, so
//! that work runs on a dedicated rayon pool sized independently of the
//! download limit. Results come back over a oneshot channel.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{HarvestError, Result};

#[derive(Clone)]
pub struct WorkerPool {
    pool: Arc<rayon::ThreadPool>,
    threads: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool with `threads` workers (0 = one per CPU).
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("harvest-cpu-{i}"))
            .build()
            .map_err(|e| HarvestError::WorkerPoolError(format!("Failed to build pool: {e}")))?;

        let threads = pool.current_num_threads();
        debug!(threads, "CPU worker pool started");
        Ok(Self {
            pool: Arc::new(pool),
            threads,
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `job` on the pool and await its result.
    ///
    /// A panicking job yields `WorkerPoolError` instead of tearing down the
    /// worker.
    pub async fn run<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(job));
            let _ = tx.send(outcome);
        });

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(panic)) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(HarvestError::WorkerPoolError(format!("Job panicked: {message}")))
            }
            Err(_) => Err(HarvestError::WorkerPoolError(
                "Worker dropped the job".into(),
            )),
        }
    }
}
