use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch
pub type Timestamp = u64;

/// Get the current UNIX timestamp in milliseconds
///
/// A system clock set before 1970 yields 0 instead of failing.
pub(crate) fn timestamp() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
