//! Cancellable expiry timer
//!
//! A spawned tokio task that sleeps and then runs a callback. Dropping the
//! `ExpiryTimer` aborts the task, so replacing the coordinator's timer
//! cancels the previous one. The task holds nothing that keeps the runtime
//! or the coordinator alive.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Upper bound for a deadline, roughly thirty years out
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

pub struct ExpiryTimer {
    handle: JoinHandle<()>,
    deadline: Instant,
}

impl ExpiryTimer {
    /// Run `on_fire` once `delay` has elapsed, unless dropped first.
    pub fn schedule<F>(delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let now = Instant::now();
        let deadline = now
            .checked_add(delay.min(FAR_FUTURE))
            .unwrap_or(now);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_fire();
        });
        Self { handle, deadline }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
