//! Closed-window polling.
//!
//! A popup controlled by a remote origin gives no event when the user closes
//! it, so the flow polls the handle's `closed` flag on a fixed interval.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Handle to the polling task of one flow.
///
/// Cancelling is idempotent, and dropping the handle cancels the task.
#[derive(Debug)]
pub struct PollTimerHandle {
    task: Option<JoinHandle<()>>,
}

impl PollTimerHandle {
    /// A handle with no task behind it.
    #[cfg(test)]
    fn inert() -> Self {
        Self { task: None }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Poll timer cancelled");
        }
    }
}

impl Drop for PollTimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Spawns fixed-interval polling tasks.
#[derive(Debug, Clone)]
pub struct ClosedWindowPoller {
    period: Duration,
}

impl ClosedWindowPoller {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run `on_tick` every period on `runtime` until the returned handle is cancelled.
    ///
    /// The first call happens one full period after start.
    pub fn start<F>(&self, runtime: &Handle, mut on_tick: F) -> PollTimerHandle
    where
        F: FnMut() + Send + 'static,
    {
        let period = self.period;
        let task = runtime.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await; // consume immediate first tick

            loop {
                ticker.tick().await;
                on_tick();
            }
        });

        PollTimerHandle { task: Some(task) }
    }
}
