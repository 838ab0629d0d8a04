use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::PerformanceMonitor;
use super::types::{MemorySample, PageLoadMetric};

/// Something the host environment observed and reports to the monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// The user clicked an element
    Click {
        /// Description of the element, e.g. `button#apply`
        element: String,
    },
    /// The user submitted a form
    Submit {
        /// Id or name of the form
        form: String,
    },
    /// The current page changed
    UrlChange {
        /// The new location
        url: String,
    },
    /// An uncaught error
    Error {
        /// Error message
        message: String,
        /// Where it was raised, if known
        #[serde(default)]
        source: Option<String>,
    },
    /// A failed asynchronous operation nobody handled
    UnhandledRejection {
        /// Rejection reason
        reason: String,
    },
    /// A paint timing entry, e.g. `first-contentful-paint`
    Paint {
        /// Name of the paint entry
        name: String,
        /// Milliseconds since navigation start
        start_time: f64,
    },
    /// The largest content element was painted
    LargestContentfulPaint {
        /// Milliseconds since navigation start
        start_time: f64,
    },
    /// Part of the page moved
    LayoutShift {
        /// Shift score of this entry
        value: f64,
        /// Shifts right after user input do not count
        had_recent_input: bool,
    },
    /// The page reacted to the first user input
    FirstInput {
        /// Milliseconds between input and handler start
        delay: f64,
    },
    /// Timings of a finished page load
    NavigationTiming(PageLoadMetric),
    /// A heap usage sample
    Memory(MemorySample),
}

/// Cloneable sender of [`HostEvent`]s to a listening monitor
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<HostEvent>,
}

impl EventSink {
    /// Hand `event` to the monitor.
    ///
    /// Returns `false` if the listener was torn down and the event was
    /// dropped.
    pub fn send(&self, event: HostEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    /// Returns `true` once the listener is gone
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Handle to the task that feeds host events into a monitor
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Stop dispatching and wait for the task to end.
    ///
    /// Events already queued are dropped.
    pub async fn teardown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The task may already be gone, in which case there is nobody to tell
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::debug!("Monitor listener ended abnormally: {e}");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Spawn the dispatch task of [`PerformanceMonitor::listen`]
pub(super) fn spawn_listener(monitor: &Arc<PerformanceMonitor>) -> (EventSink, ListenerHandle) {
    let (sender, mut events) = mpsc::unbounded_channel();
    let (shutdown, mut stop) = oneshot::channel::<()>();
    let monitor: Weak<PerformanceMonitor> = Arc::downgrade(monitor);

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut stop => break,
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let Some(monitor) = monitor.upgrade() else { break };
                    monitor.handle_event(event);
                }
            }
        }
    });

    (
        EventSink { sender },
        ListenerHandle {
            shutdown: Some(shutdown),
            handle: Some(handle),
        },
    )
}
