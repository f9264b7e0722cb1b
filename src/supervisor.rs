//! Cooperative task supervision.
//!
//! Every long-running loop in the bridge (accept loop, per-connection
//! handlers, router pipelines, broker session) runs under a
//! [`TaskSupervisor`]: a cancellation token that each blocking wait
//! selects against, plus a tracker that `shutdown` joins. This gives
//! every component the same contract - `stop` returns only after all of
//! its workers have fully exited.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Cancellation token plus tracked-task join point.
#[derive(Debug, Clone)]
pub struct TaskSupervisor {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl TaskSupervisor {
    /// Create a new supervisor.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Token for workers to select against in every blocking wait.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a worker under this supervisor.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(future);
    }

    /// Whether shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request shutdown and wait for every worker to exit.
    ///
    /// Safe to call more than once; safe to call before any worker was
    /// spawned.
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
