//! Client-side performance telemetry.
//!
//! A [`PerformanceMonitor`] keeps bounded logs of metrics and user
//! interactions plus every page load, and derives summary stats and the core
//! web vitals from them. It is constructed explicitly and shared by [`Arc`];
//! creating one has no side effects. Host events only reach it after
//! [`PerformanceMonitor::listen`], and stop again after
//! [`ListenerHandle::teardown`].
//!
//! Recording never fails. Shipping the data with
//! [`PerformanceMonitor::send_analytics`] is best effort.

mod events;
mod types;
mod window;

pub use events::{EventSink, HostEvent, ListenerHandle};
pub use types::{
    MemorySample, MonitorExport, MonitorStats, PageLoadMetric, PerformanceMetric, UserInteraction,
    WebVitals,
};
pub use crate::time::Timestamp;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use uuid::Uuid;

use crate::time::timestamp;
use window::Window;

/// Metrics kept before the oldest are dropped
pub const MAX_METRICS: usize = 1000;
/// Interactions kept before the oldest are dropped
pub const MAX_INTERACTIONS: usize = 500;

/// Name of the metric recorded for uncaught errors
pub const ERROR_METRIC: &str = "error";
/// Name of the metric recorded for unhandled rejections
pub const UNHANDLED_REJECTION_METRIC: &str = "unhandled_rejection";
/// Tag holding the outcome of a measured operation
pub const STATUS_TAG: &str = "status";
/// Value of [`STATUS_TAG`] for successful operations
pub const STATUS_SUCCESS: &str = "success";
/// Value of [`STATUS_TAG`] for failed operations
pub const STATUS_ERROR: &str = "error";

const FCP_METRIC: &str = "fcp";
const LCP_METRIC: &str = "lcp";
const FID_METRIC: &str = "fid";
const CLS_METRIC: &str = "cls";
const MEMORY_METRIC: &str = "memory_used";

#[derive(Debug)]
struct MonitorState {
    metrics: Window<PerformanceMetric>,
    interactions: Window<UserInteraction>,
    page_loads: Vec<PageLoadMetric>,
    memory: Option<MemorySample>,
    cumulative_layout_shift: f64,
    current_page: Option<String>,
}

impl MonitorState {
    fn new() -> Self {
        Self {
            metrics: Window::new(MAX_METRICS),
            interactions: Window::new(MAX_INTERACTIONS),
            page_loads: Vec::new(),
            memory: None,
            cumulative_layout_shift: 0.0,
            current_page: None,
        }
    }
}

/// Collects performance metrics, user interactions and page loads
#[derive(Debug)]
pub struct PerformanceMonitor {
    session_id: Uuid,
    started: Instant,
    state: Mutex<MonitorState>,
    http: reqwest::Client,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMonitor {
    /// Start a new monitoring session
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Start a new monitoring session that ships data with `http`
    #[must_use]
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started: Instant::now(),
            state: Mutex::new(MonitorState::new()),
            http,
        }
    }

    /// Random id of this session
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a metric to the log
    pub fn record_metric<I, K, V>(&self, name: impl Into<String>, value: f64, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let metric = PerformanceMetric {
            name: name.into(),
            value,
            timestamp: timestamp(),
            tags: tags
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        };
        self.state().metrics.push(metric);
    }

    /// Append a user interaction to the log
    pub fn record_interaction(&self, action: impl Into<String>, element: Option<String>) {
        let mut state = self.state();
        let interaction = UserInteraction {
            action: action.into(),
            element,
            timestamp: timestamp(),
            page: state.current_page.clone(),
        };
        state.interactions.push(interaction);
    }

    /// Append a page load; page loads are never dropped
    pub fn record_page_load(&self, page_load: PageLoadMetric) {
        self.state().page_loads.push(page_load);
    }

    /// Run `f` and record its duration, tagged with its outcome.
    ///
    /// The result is returned unchanged.
    pub fn measure<T, E>(
        &self,
        name: &str,
        f: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        let start = Instant::now();
        let result = f();
        self.record_duration(name, start.elapsed(), result.is_ok());
        result
    }

    /// Await `operation` and record its duration, tagged with its outcome.
    ///
    /// The result is returned unchanged.
    pub async fn measure_async<T, E>(
        &self,
        name: &str,
        operation: impl Future<Output = std::result::Result<T, E>>,
    ) -> std::result::Result<T, E> {
        let start = Instant::now();
        let result = operation.await;
        self.record_duration(name, start.elapsed(), result.is_ok());
        result
    }

    fn record_duration(&self, name: &str, elapsed: Duration, success: bool) {
        let status = if success {
            STATUS_SUCCESS
        } else {
            STATUS_ERROR
        };
        self.record_metric(
            name,
            elapsed.as_secs_f64() * 1000.0,
            [(STATUS_TAG, status)],
        );
    }

    /// Summary of the session so far
    #[must_use]
    pub fn stats(&self) -> MonitorStats {
        let state = self.state();
        Self::stats_of(&state, self.started.elapsed())
    }

    fn stats_of(state: &MonitorState, session_duration: Duration) -> MonitorStats {
        let average_page_load = u32::try_from(state.page_loads.len())
            .ok()
            .filter(|count| *count > 0)
            .map(|count| {
                let total: Duration = state.page_loads.iter().map(|p| p.load_time).sum();
                total / count
            });

        let errors = state.metrics.iter().filter(|m| m.is_error()).count();
        #[allow(clippy::cast_precision_loss)]
        let error_rate = if state.metrics.len() == 0 {
            0.0
        } else {
            errors as f64 / state.metrics.len() as f64
        };

        MonitorStats {
            session_duration,
            interaction_count: state.interactions.len(),
            average_page_load,
            error_rate,
            memory_usage: state.memory,
        }
    }

    /// Latest value of each core web vital
    #[must_use]
    pub fn core_web_vitals(&self) -> WebVitals {
        let state = self.state();
        let latest = |name: &str| state.metrics.latest(|m| m.name == name).map(|m| m.value);
        WebVitals {
            fcp: latest(FCP_METRIC),
            lcp: latest(LCP_METRIC),
            fid: latest(FID_METRIC),
            cls: latest(CLS_METRIC),
        }
    }

    /// Snapshot of everything recorded so far
    #[must_use]
    pub fn export_data(&self) -> MonitorExport {
        let state = self.state();
        MonitorExport {
            session_id: self.session_id,
            exported_at: SystemTime::now(),
            metrics: state.metrics.to_vec(),
            interactions: state.interactions.to_vec(),
            page_loads: state.page_loads.clone(),
            stats: Self::stats_of(&state, self.started.elapsed()),
        }
    }

    /// Forget everything recorded so far; the session id stays
    pub fn clear(&self) {
        let mut state = self.state();
        state.metrics.clear();
        state.interactions.clear();
        state.page_loads.clear();
        state.memory = None;
        state.cumulative_layout_shift = 0.0;
    }

    /// POST the [export](PerformanceMonitor::export_data) as JSON to
    /// `endpoint`.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn send_analytics(&self, endpoint: &str) {
        let export = self.export_data();
        match self.http.post(endpoint).json(&export).send().await {
            Ok(response) if response.status().is_success() => {
                log::debug!(
                    "Sent {} metrics of session {} to {endpoint}",
                    export.metrics.len(),
                    self.session_id
                );
            }
            Ok(response) => {
                log::warn!(
                    "Analytics endpoint {endpoint} rejected the data with {}",
                    response.status()
                );
            }
            Err(e) => log::warn!("Failed to send analytics to {endpoint}: {e}"),
        }
    }

    /// Start feeding host events into this monitor.
    ///
    /// Events sent through the returned sink are processed on a background
    /// task until the handle is torn down or the monitor is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    #[must_use]
    pub fn listen(self: &Arc<Self>) -> (EventSink, ListenerHandle) {
        events::spawn_listener(self)
    }

    /// Translate a host event into metrics, interactions or page loads
    pub fn handle_event(&self, event: HostEvent) {
        match event {
            HostEvent::Click { element } => self.record_interaction("click", Some(element)),
            HostEvent::Submit { form } => self.record_interaction("form_submit", Some(form)),
            HostEvent::UrlChange { url } => {
                self.state().current_page = Some(url.clone());
                self.record_interaction("navigation", Some(url));
            }
            HostEvent::Error { message, source } => {
                let mut tags = vec![("message", message)];
                if let Some(source) = source {
                    tags.push(("source", source));
                }
                self.record_metric(ERROR_METRIC, 1.0, tags);
            }
            HostEvent::UnhandledRejection { reason } => {
                self.record_metric(UNHANDLED_REJECTION_METRIC, 1.0, [("reason", reason)]);
            }
            HostEvent::Paint { name, start_time } => {
                if name == "first-contentful-paint" {
                    self.record_metric(FCP_METRIC, start_time, no_tags());
                } else {
                    self.record_metric(name, start_time, no_tags());
                }
            }
            HostEvent::LargestContentfulPaint { start_time } => {
                self.record_metric(LCP_METRIC, start_time, no_tags());
            }
            HostEvent::FirstInput { delay } => self.record_metric(FID_METRIC, delay, no_tags()),
            HostEvent::LayoutShift {
                value,
                had_recent_input,
            } => {
                if had_recent_input {
                    return;
                }
                let cls = {
                    let mut state = self.state();
                    state.cumulative_layout_shift += value;
                    state.cumulative_layout_shift
                };
                self.record_metric(CLS_METRIC, cls, no_tags());
            }
            HostEvent::NavigationTiming(page_load) => self.record_page_load(page_load),
            HostEvent::Memory(sample) => {
                self.state().memory = Some(sample);
                #[allow(clippy::cast_precision_loss)]
                let used = sample.used as f64;
                self.record_metric(MEMORY_METRIC, used, no_tags());
            }
        }
    }
}

fn no_tags() -> BTreeMap<String, String> {
    BTreeMap::new()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::StatusCode;
    use pretty_assertions::assert_eq;
    use test_utils::{mock_server, received_requests};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn page_load(url: &str, load_ms: u64) -> PageLoadMetric {
        PageLoadMetric {
            url: url.into(),
            load_time: Duration::from_millis(load_ms),
            dom_content_loaded: Duration::from_millis(load_ms / 2),
            first_paint: None,
            first_contentful_paint: None,
            largest_contentful_paint: None,
            timestamp: 0,
        }
    }

    #[test]
    fn test_empty_session() {
        let monitor = PerformanceMonitor::new();
        let stats = monitor.stats();
        assert_eq!(stats.interaction_count, 0);
        assert_eq!(stats.average_page_load, None);
        assert!(stats.error_rate.abs() < f64::EPSILON);
        assert_eq!(stats.memory_usage, None);
        assert_eq!(monitor.core_web_vitals(), WebVitals::default());
    }

    #[test]
    fn test_metric_log_is_bounded() {
        let monitor = PerformanceMonitor::new();
        for i in 0..MAX_METRICS + 10 {
            monitor.record_metric("tick", f64::from(u32::try_from(i).unwrap()), no_tags());
        }
        let export = monitor.export_data();
        assert_eq!(export.metrics.len(), MAX_METRICS);
        assert!((export.metrics[0].value - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_interaction_log_is_bounded() {
        let monitor = PerformanceMonitor::new();
        for _ in 0..MAX_INTERACTIONS + 1 {
            monitor.record_interaction("click", None);
        }
        assert_eq!(monitor.stats().interaction_count, MAX_INTERACTIONS);
    }

    #[test]
    fn test_average_page_load() {
        let monitor = PerformanceMonitor::new();
        monitor.record_page_load(page_load("/", 100));
        monitor.record_page_load(page_load("/courses", 300));
        assert_eq!(
            monitor.stats().average_page_load,
            Some(Duration::from_millis(200))
        );
    }

    #[test]
    fn test_measure() {
        let monitor = PerformanceMonitor::new();
        let ok: Result<u8, &str> = monitor.measure("parse", || Ok(1));
        let err: Result<u8, &str> = monitor.measure("parse", || Err("bad input"));
        assert_eq!(ok, Ok(1));
        assert_eq!(err, Err("bad input"));

        let metrics = monitor.export_data().metrics;
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].tags[STATUS_TAG], STATUS_SUCCESS);
        assert_eq!(metrics[1].tags[STATUS_TAG], STATUS_ERROR);
        assert!((monitor.stats().error_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_measure_async() {
        let monitor = PerformanceMonitor::new();
        let result: Result<&str, ()> = monitor
            .measure_async("load", async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok("done")
            })
            .await;
        assert_eq!(result, Ok("done"));

        let metric = monitor.export_data().metrics.remove(0);
        assert_eq!(metric.name, "load");
        assert!(metric.value >= 20.0);
    }

    #[test]
    fn test_web_vitals() {
        let monitor = PerformanceMonitor::new();
        monitor.handle_event(HostEvent::Paint {
            name: "first-paint".into(),
            start_time: 80.0,
        });
        monitor.handle_event(HostEvent::Paint {
            name: "first-contentful-paint".into(),
            start_time: 120.0,
        });
        monitor.handle_event(HostEvent::LargestContentfulPaint { start_time: 900.0 });
        monitor.handle_event(HostEvent::LargestContentfulPaint { start_time: 1100.0 });
        monitor.handle_event(HostEvent::FirstInput { delay: 12.0 });
        monitor.handle_event(HostEvent::LayoutShift {
            value: 0.25,
            had_recent_input: false,
        });
        monitor.handle_event(HostEvent::LayoutShift {
            value: 5.0,
            had_recent_input: true,
        });
        monitor.handle_event(HostEvent::LayoutShift {
            value: 0.5,
            had_recent_input: false,
        });

        assert_eq!(
            monitor.core_web_vitals(),
            WebVitals {
                fcp: Some(120.0),
                lcp: Some(1100.0),
                fid: Some(12.0),
                cls: Some(0.75),
            }
        );
    }

    #[test]
    fn test_errors_count_towards_error_rate() {
        let monitor = PerformanceMonitor::new();
        monitor.record_metric("render", 3.0, no_tags());
        monitor.handle_event(HostEvent::Error {
            message: "undefined is not a function".into(),
            source: Some("app.js".into()),
        });
        monitor.handle_event(HostEvent::UnhandledRejection {
            reason: "timeout".into(),
        });
        monitor.record_metric("render", 4.0, no_tags());

        assert!((monitor.stats().error_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_interactions_remember_page() {
        let monitor = PerformanceMonitor::new();
        monitor.handle_event(HostEvent::UrlChange {
            url: "/benefits".into(),
        });
        monitor.handle_event(HostEvent::Click {
            element: "button#apply".into(),
        });
        monitor.handle_event(HostEvent::Memory(MemorySample {
            used: 10,
            total: 20,
            limit: 40,
        }));

        let export = monitor.export_data();
        let click = &export.interactions[1];
        assert_eq!(click.action, "click");
        assert_eq!(click.element.as_deref(), Some("button#apply"));
        assert_eq!(click.page.as_deref(), Some("/benefits"));
        assert_eq!(export.stats.memory_usage.map(|m| m.used), Some(10));
    }

    #[test]
    fn test_clear_keeps_session() {
        let monitor = PerformanceMonitor::new();
        let id = monitor.session_id();
        monitor.record_interaction("click", None);
        monitor.clear();
        assert_eq!(monitor.stats().interaction_count, 0);
        assert_eq!(monitor.session_id(), id);
    }

    #[test]
    fn test_host_event_format() {
        let event: HostEvent =
            serde_json::from_str(r#"{"type": "click", "element": "a#home"}"#).unwrap();
        assert_eq!(
            event,
            HostEvent::Click {
                element: "a#home".into()
            }
        );
    }

    #[tokio::test]
    async fn test_listener() {
        let monitor = Arc::new(PerformanceMonitor::new());
        let (sink, handle) = monitor.listen();

        assert!(sink.send(HostEvent::Submit {
            form: "application".into()
        }));
        assert!(sink.send(HostEvent::FirstInput { delay: 4.0 }));

        // Wait for the listener to drain the queue
        for _ in 0..50 {
            if monitor.core_web_vitals().fid.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(monitor.stats().interaction_count, 1);
        assert_eq!(monitor.core_web_vitals().fid, Some(4.0));

        handle.teardown().await;
        assert!(sink.is_closed());
        assert!(!sink.send(HostEvent::Click {
            element: "late".into()
        }));
    }

    #[tokio::test]
    async fn test_send_analytics() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analytics"))
            .respond_with(ResponseTemplate::new(StatusCode::NO_CONTENT))
            .expect(1)
            .mount(&server)
            .await;

        let monitor = PerformanceMonitor::new();
        monitor.record_interaction("click", Some("nav".into()));
        monitor
            .send_analytics(&format!("{}/analytics", server.uri()))
            .await;

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["session_id"], monitor.session_id().to_string());
        assert_eq!(body["interactions"][0]["element"], "nav");
    }

    #[tokio::test]
    async fn test_send_analytics_failures_are_swallowed() {
        let server = mock_server!(StatusCode::INTERNAL_SERVER_ERROR);
        let monitor = PerformanceMonitor::new();
        monitor.send_analytics(&server.uri()).await;
        assert_eq!(received_requests!(server), 1);

        monitor.send_analytics("not a url").await;
    }
}
