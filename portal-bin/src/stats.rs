use std::collections::BTreeMap;

use portal_lib::{ApiResponse, CachesStats, RATE_LIMIT_EXCEEDED, monitor::MonitorStats};
use serde::Serialize;
use serde_json::Value;

/// Outcome counts of the requests of one run
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ResponseStats {
    pub(crate) total: usize,
    pub(crate) successful: usize,
    pub(crate) failures: usize,
    pub(crate) rate_limited: usize,
    pub(crate) cached: usize,
    /// Number of responses per status code
    pub(crate) status_codes: BTreeMap<u16, usize>,
}

impl ResponseStats {
    pub(crate) fn add(&mut self, response: &ApiResponse<Value>) {
        self.total += 1;
        *self.status_codes.entry(response.status).or_default() += 1;

        if response.cached {
            self.cached += 1;
        }

        match response.error() {
            None => self.successful += 1,
            Some(error) => {
                self.failures += 1;
                if error.code.as_deref() == Some(RATE_LIMIT_EXCEEDED) {
                    self.rate_limited += 1;
                }
            }
        }
    }

    pub(crate) const fn is_success(&self) -> bool {
        self.failures == 0
    }
}

impl<'a> FromIterator<&'a ApiResponse<Value>> for ResponseStats {
    fn from_iter<I: IntoIterator<Item = &'a ApiResponse<Value>>>(responses: I) -> Self {
        let mut stats = Self::default();
        for response in responses {
            stats.add(response);
        }
        stats
    }
}

/// Everything `--stats` reports
#[derive(Debug, Clone, Serialize)]
pub(crate) struct OutputStats {
    pub(crate) responses: ResponseStats,
    pub(crate) caches: CachesStats,
    pub(crate) session: MonitorStats,
    /// Requests the anonymous caller has left on the API limiter
    pub(crate) remaining_requests: u32,
}
