//! Bounded fetch worker pool.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Runs at most `size` fetch tasks at once.
///
/// Tasks spawned beyond the limit wait for a permit. After [`close`] no new
/// tasks are accepted and the call resolves once every accepted task has
/// finished.
///
/// [`close`]: WorkerPool::close
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    closed: CancellationToken,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            closed: CancellationToken::new(),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Number of accepted tasks that have not finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Queue `task` behind a worker slot. Must be called within a Tokio
    /// runtime.
    pub fn spawn<F, T>(&self, task: F) -> Result<JoinHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(SyncError::ShuttingDown);
        }
        let permits = Arc::clone(&self.permits);
        Ok(self.tracker.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            task.await
        }))
    }

    /// Run a task that only coordinates other pool tasks.
    ///
    /// It is tracked like any other task but does not occupy a worker slot,
    /// so it can wait on the fetches it dispatched.
    pub fn spawn_control<F, T>(&self, task: F) -> Result<JoinHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(SyncError::ShuttingDown);
        }
        Ok(self.tracker.spawn(task))
    }

    /// Wait until no accepted task is left, without closing the pool.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        if !self.is_closed() {
            self.tracker.reopen();
        }
    }

    /// Stop accepting tasks and wait for the accepted ones.
    pub async fn close(&self) {
        self.closed.cancel();
        self.tracker.close();
        debug!(in_flight = self.tracker.len(), "Waiting for fetch workers");
        self.tracker.wait().await;
    }
}
