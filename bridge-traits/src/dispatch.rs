//! Main-thread dispatch.
//!
//! Refresh notifications and configuration writes must happen on the host's
//! main thread. Worker tasks package that work as a future and hand it to the
//! host, which polls it to completion on the main thread.

use futures::future::BoxFuture;

/// Work scheduled onto the main thread.
pub type MainThreadTask = BoxFuture<'static, ()>;

pub trait MainThreadDispatch: Send + Sync {
    /// Queue `task` to run on the main thread. Never blocks the caller.
    fn run_on_main(&self, task: MainThreadTask);
}
