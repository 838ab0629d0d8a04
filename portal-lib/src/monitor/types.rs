use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::time::Timestamp;

/// A named measurement, e.g. the duration of an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    /// What was measured
    pub name: String,
    /// Measured value, durations in milliseconds
    pub value: f64,
    /// When it was recorded
    pub timestamp: Timestamp,
    /// Free-form labels, e.g. `status=error`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl PerformanceMetric {
    /// Returns `true` for metrics that record a failure
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.name == super::ERROR_METRIC
            || self.name == super::UNHANDLED_REJECTION_METRIC
            || self.tags.get(super::STATUS_TAG).map(String::as_str) == Some(super::STATUS_ERROR)
    }
}

/// Something the user did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInteraction {
    /// Kind of interaction, e.g. `click`
    pub action: String,
    /// Element interacted with, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    /// When it happened
    pub timestamp: Timestamp,
    /// Page the user was on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}

/// Timings of a single page load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLoadMetric {
    /// Page that was loaded
    pub url: String,
    /// Time until the load event
    #[serde(with = "humantime_serde")]
    pub load_time: Duration,
    /// Time until the DOM was ready
    #[serde(with = "humantime_serde")]
    pub dom_content_loaded: Duration,
    /// Time until anything was painted
    #[serde(default, with = "humantime_serde")]
    pub first_paint: Option<Duration>,
    /// Time until the first content was painted
    #[serde(default, with = "humantime_serde")]
    pub first_contentful_paint: Option<Duration>,
    /// Time until the largest content was painted
    #[serde(default, with = "humantime_serde")]
    pub largest_contentful_paint: Option<Duration>,
    /// When the load was recorded
    pub timestamp: Timestamp,
}

/// Heap usage reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySample {
    /// Bytes in use
    pub used: u64,
    /// Bytes allocated
    pub total: u64,
    /// Upper bound of the heap
    pub limit: u64,
}

/// Summary of a monitoring session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorStats {
    /// Time since the monitor was created
    #[serde(with = "humantime_serde")]
    pub session_duration: Duration,
    /// Number of interactions in the log
    pub interaction_count: usize,
    /// Mean load time over all recorded page loads
    #[serde(with = "humantime_serde")]
    pub average_page_load: Option<Duration>,
    /// Share of recorded metrics that are failures, in `[0, 1]`
    pub error_rate: f64,
    /// Latest memory sample
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<MemorySample>,
}

/// Latest values of the core web vitals, in milliseconds except for `cls`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WebVitals {
    /// First contentful paint
    pub fcp: Option<f64>,
    /// Largest contentful paint
    pub lcp: Option<f64>,
    /// First input delay
    pub fid: Option<f64>,
    /// Cumulative layout shift
    pub cls: Option<f64>,
}

/// Everything a monitor recorded, ready to be shipped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorExport {
    /// Random id of the monitoring session
    pub session_id: Uuid,
    /// When the export was taken
    #[serde(with = "humantime_serde")]
    pub exported_at: SystemTime,
    /// Metric log, oldest first
    pub metrics: Vec<PerformanceMetric>,
    /// Interaction log, oldest first
    pub interactions: Vec<UserInteraction>,
    /// Page loads, oldest first
    pub page_loads: Vec<PageLoadMetric>,
    /// Summary at export time
    pub stats: MonitorStats,
}
