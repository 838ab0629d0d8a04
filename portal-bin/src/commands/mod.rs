pub(crate) mod request;

pub(crate) use request::request;

use std::sync::Arc;

use portal_lib::{ApiClient, PerformanceMonitor};

use crate::options::Config;

/// Parameters passed to every command
pub(crate) struct CommandParams {
    pub(crate) client: ApiClient,
    pub(crate) monitor: Arc<PerformanceMonitor>,
    pub(crate) endpoints: Vec<String>,
    pub(crate) cfg: Config,
}
