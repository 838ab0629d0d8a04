pub(crate) mod log;
pub(crate) mod stats;

use self::stats::{StatsFormat, StatsFormatter};

/// Create a stats formatter based on the given format option
pub(crate) fn get_stats_formatter(format: &StatsFormat) -> Box<dyn StatsFormatter> {
    match format {
        StatsFormat::Compact => Box::new(stats::Compact),
        StatsFormat::Json => Box::new(stats::Json),
    }
}
