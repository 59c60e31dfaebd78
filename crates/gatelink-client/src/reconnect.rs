//! Reconnect supervisor: at most one pending timer.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Owns the single reconnect timer. Scheduling replaces any existing timer;
/// cancelling aborts it. The attempt itself is a future supplied by the
/// session so the supervisor stays free of session internals.
#[derive(Default)]
pub struct ReconnectSupervisor {
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectSupervisor {
    /// Create a supervisor with no pending timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `attempt` to run after `delay`, cancelling any timer that is
    /// already pending.
    pub fn schedule<F>(&self, delay: Duration, attempt: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.timer.lock();
        if let Some(old) = slot.take() {
            old.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            attempt.await;
        }));
    }

    /// Cancel the pending timer, if any.
    pub fn cancel(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }

    /// Whether a timer is pending (scheduled and not yet fired).
    pub fn is_scheduled(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ReconnectSupervisor {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}
