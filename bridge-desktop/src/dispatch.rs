//! Main-thread dispatch for desktop hosts.

use bridge_traits::{MainThreadDispatch, MainThreadTask};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// [`MainThreadDispatch`] that queues work for a [`MainThreadQueue`].
///
/// The host owns the queue and drains it from its main loop.
#[derive(Clone)]
pub struct QueuedDispatcher {
    tx: mpsc::UnboundedSender<MainThreadTask>,
}

/// Receiving side of a [`QueuedDispatcher`].
pub struct MainThreadQueue {
    rx: mpsc::UnboundedReceiver<MainThreadTask>,
}

impl QueuedDispatcher {
    pub fn new() -> (Self, MainThreadQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, MainThreadQueue { rx })
    }
}

impl MainThreadDispatch for QueuedDispatcher {
    fn run_on_main(&self, task: MainThreadTask) {
        if self.tx.send(task).is_err() {
            warn!("Main thread queue is gone, dropping task");
        }
    }
}

impl MainThreadQueue {
    /// Run every queued task in order and return how many ran.
    pub async fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task.await;
            ran += 1;
        }
        ran
    }

    /// Run tasks until every dispatcher has been dropped.
    pub async fn run(mut self) {
        while let Some(task) = self.rx.recv().await {
            task.await;
        }
        debug!("Main thread queue closed");
    }
}
