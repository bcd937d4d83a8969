//! Process shutdown for the session loops.
//!
//! The binary owns one [`ShutdownCoordinator`]. Its token goes to
//! [`crate::SessionOrchestrator::spawn`]; on a signal the binary calls
//! [`ShutdownCoordinator::graceful_shutdown`], which cancels the token and
//! gives the loops a bounded time to exit before aborting them.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Root cancellation for one agent process.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Coordinator allowing the loops `timeout` to exit once cancelled.
    pub fn new(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            timeout,
        }
    }

    /// Token the session loops select on.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the loops and wait for them. Returns how many were still
    /// running at the deadline and had to be aborted.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>) -> usize {
        self.token.cancel();
        info!(
            loops = handles.len(),
            timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            "waiting for session loops to exit"
        );

        let aborters: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(self.timeout, futures::future::join_all(handles))
            .await
            .is_ok()
        {
            return 0;
        }

        let mut aborted = 0;
        for aborter in aborters.iter().filter(|a| !a.is_finished()) {
            aborter.abort();
            aborted += 1;
        }
        warn!(aborted, "session loops did not exit in time, aborted");
        aborted
    }
}
