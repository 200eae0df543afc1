//! Bounded worker pool for work sessions hand off.
//!
//! Sessions push their slow steps (identity verification) through
//! [`WorkerPool::run`] so at most `size` of them are in flight at once.
//! Tasks start in whatever order permits are granted.
//!
//! Shutdown closes the pool to new work, gives running tasks a grace
//! period, then aborts whatever is left.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Why a task did not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The pool was shut down before the task could start.
    #[error("worker pool is shut down")]
    Closed,

    /// The task was aborted during shutdown or panicked.
    #[error("worker task was cancelled")]
    Cancelled,
}

pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    size: usize,
    terminated: AtomicBool,
}

impl WorkerPool {
    /// Creates a pool running at most `size` tasks at a time. Zero is
    /// raised to one.
    pub fn new(size: usize) -> Self {
        let size = size.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            tasks: Mutex::new(JoinSet::new()),
            size,
            terminated: AtomicBool::new(false),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by a task.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs `task` on the pool and waits for its output.
    ///
    /// Waits for a free permit first.
    ///
    /// # Errors
    /// [`PoolError::Closed`] if the pool shut down before the task started,
    /// [`PoolError::Cancelled`] if it was aborted or panicked.
    pub async fn run<F, T>(&self, task: F) -> Result<T, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        let (tx, rx) = oneshot::channel();

        {
            let mut tasks = self.tasks.lock();
            // Shutdown may have taken the set between acquire and here.
            if self.permits.is_closed() {
                return Err(PoolError::Closed);
            }
            while tasks.try_join_next().is_some() {}
            tasks.spawn(async move {
                let output = task.await;
                drop(permit);
                let _ = tx.send(output);
            });
        }

        rx.await.map_err(|_| PoolError::Cancelled)
    }

    /// Stops accepting work, waits up to `grace` for running tasks, then
    /// aborts the rest. Idempotent.
    pub async fn shutdown(&self, grace: Duration) {
        self.permits.close();
        let mut tasks = std::mem::take(&mut *self.tasks.lock());

        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(remaining = tasks.len(), "worker tasks outlived the grace period, aborting");
            tasks.shutdown().await;
        }

        self.terminated.store(true, Ordering::Release);
        debug!(size = self.size, "worker pool terminated");
    }

    /// Whether [`shutdown`](Self::shutdown) has completed.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("available", &self.available())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[tokio::test]
    async fn test_run_returns_task_output() {
        let pool = WorkerPool::new(2);
        assert_eq!(pool.run(async { 40 + 2 }).await.unwrap(), 42);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_size_zero_is_raised() {
        assert_eq!(WorkerPool::new(0).size(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = Arc::new(WorkerPool::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut callers = JoinSet::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            callers.spawn(async move {
                pool.run(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            });
        }
        while let Some(result) = callers.join_next().await {
            result.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_run_after_shutdown_is_closed() {
        let pool = WorkerPool::new(1);
        pool.shutdown(Duration::from_millis(10)).await;

        assert!(pool.is_terminated());
        assert!(matches!(pool.run(async {}).await, Err(PoolError::Closed)));
    }

    #[tokio::test]
    async fn test_panicking_task_is_cancelled() {
        let pool = WorkerPool::new(1);
        let result = pool
            .run(async {
                let fail = true;
                if fail {
                    panic!("boom");
                }
            })
            .await;
        assert!(matches!(result, Err(PoolError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_after_grace() {
        let pool = Arc::new(WorkerPool::new(1));
        let caller = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                pool.run(tokio::time::sleep(Duration::from_secs(3600))).await
            })
        };
        // Let the task start.
        tokio::time::sleep(Duration::from_millis(1)).await;

        pool.shutdown(Duration::from_secs(1)).await;

        assert!(pool.is_terminated());
        assert!(matches!(caller.await.unwrap(), Err(PoolError::Cancelled)));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_short_tasks() {
        let pool = Arc::new(WorkerPool::new(1));
        let caller = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                pool.run(async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    7
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        pool.shutdown(Duration::from_secs(5)).await;

        assert_eq!(caller.await.unwrap().unwrap(), 7);
    }
}
