//! Single-shot timers owned by the entity they govern

use std::time::Duration;

use tokio::task::JoinHandle;

/// A pending single-shot timer.
///
/// The timer is cancelled when the handle is dropped, so whoever owns the
/// handle decides its fate exactly once: drop it on the governing
/// transition, or let it fire.
#[derive(Debug)]
pub(crate) struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Run `on_fire` after `delay` unless the handle is dropped first.
    pub(crate) fn start<F>(delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        });
        Self { task }
    }

    /// Cancel the timer
    pub(crate) fn cancel(self) {
        drop(self);
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
