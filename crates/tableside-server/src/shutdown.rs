//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default bound on draining tracked tasks.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the root cancellation token and the hub's long-lived tasks.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled together with the root.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Keep `handle` to be joined on shutdown.
    pub fn track(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    /// Number of tracked tasks.
    pub fn tracked(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been initiated.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Cancel, then join every tracked task for at most `timeout`. Tasks
    /// still running after that are aborted.
    pub async fn graceful_shutdown(&self, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to complete"
        );
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!(?timeout, "shutdown timed out, aborting remaining tasks");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        assert_eq!(coord.tracked(), 0);
    }

    #[test]
    fn child_tokens_follow_root() {
        let coord = ShutdownCoordinator::new();
        let t1 = coord.child_token();
        let t2 = coord.child_token();
        coord.shutdown();
        coord.shutdown();
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
        assert!(coord.is_shutting_down());
    }

    #[test]
    fn cancelling_a_child_leaves_root_alone() {
        let coord = ShutdownCoordinator::new();
        coord.child_token().cancel();
        assert!(!coord.is_shutting_down());
    }

    #[tokio::test]
    async fn graceful_shutdown_joins_tracked_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.child_token();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        coord.track(tokio::spawn(async move {
            token.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        }));

        coord.graceful_shutdown(None).await;
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(coord.tracked(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_tasks_are_aborted_after_timeout() {
        let coord = ShutdownCoordinator::new();
        let handle = tokio::spawn(std::future::pending::<()>());
        let abort = handle.abort_handle();
        coord.track(handle);

        coord.graceful_shutdown(Some(Duration::from_secs(1))).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(abort.is_finished());
    }
}
