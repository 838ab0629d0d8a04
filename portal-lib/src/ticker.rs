//! Periodic background maintenance.
//!
//! A [`Ticker`] runs a closure against its owner on a fixed period, on its
//! own tokio task. It only keeps a [`Weak`] reference to the owner, so an
//! owner that is dropped ends the task on the next tick. Call
//! [`Ticker::shutdown`] to stop it deterministically; dropping the ticker
//! aborts the task.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shortest period a ticker accepts
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a periodic background task
#[derive(Debug)]
pub struct Ticker {
    name: &'static str,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Spawn a task that calls `tick` with the owner every `period`.
    ///
    /// The first call happens one full `period` after spawning.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn<T, F>(name: &'static str, period: Duration, owner: Weak<T>, mut tick: F) -> Self
    where
        T: Send + Sync + 'static,
        F: FnMut(&T) + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let (shutdown, mut stop) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = interval.tick() => {
                        let Some(owner) = owner.upgrade() else {
                            log::debug!("Owner of ticker `{name}` is gone, stopping");
                            break;
                        };
                        tick(&owner);
                    }
                }
            }
        });

        Self {
            name,
            shutdown: Some(shutdown),
            handle: Some(handle),
        }
    }

    /// Name given at spawn time
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` once the background task has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the task and wait for it to end
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The task may already be gone, in which case there is nobody to tell
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::debug!("Ticker `{}` ended abnormally: {e}", self.name);
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
