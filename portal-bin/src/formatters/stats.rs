use std::fmt::Write;
use std::str::FromStr;

use anyhow::{Error, Result, anyhow};
use portal_lib::CacheStats;
use serde::Deserialize;
use strum::{Display, EnumIter, VariantNames};

use crate::stats::OutputStats;

/// The format to use for the final statistics
#[derive(Debug, Deserialize, Default, Clone, Display, EnumIter, VariantNames, PartialEq)]
#[non_exhaustive]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub(crate) enum StatsFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for StatsFormat {
    type Err = Error;

    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format.to_lowercase().as_str() {
            "compact" | "string" => Ok(StatsFormat::Compact),
            "json" => Ok(StatsFormat::Json),
            _ => Err(anyhow!("Unknown format {format}")),
        }
    }
}

pub(crate) trait StatsFormatter {
    /// Render the statistics of a run
    fn format(&self, stats: &OutputStats) -> Result<String>;
}

/// Human-readable summary, a few lines
pub(crate) struct Compact;

fn cache_line(out: &mut String, name: &str, stats: &CacheStats) -> std::fmt::Result {
    writeln!(
        out,
        "  {name:<16}{:>4}/{:<4} entries, {} hits, {} misses, hit rate {:.1}%",
        stats.size,
        stats.max_size,
        stats.hits,
        stats.misses,
        stats.hit_rate * 100.0
    )
}

impl StatsFormatter for Compact {
    fn format(&self, stats: &OutputStats) -> Result<String> {
        let responses = &stats.responses;
        let mut out = String::new();

        writeln!(
            out,
            "{} requests: {} successful, {} failed ({} rate limited), {} from cache",
            responses.total,
            responses.successful,
            responses.failures,
            responses.rate_limited,
            responses.cached
        )?;
        let codes: Vec<String> = responses
            .status_codes
            .iter()
            .map(|(status, count)| format!("{status}: {count}"))
            .collect();
        if !codes.is_empty() {
            writeln!(out, "Status codes: {}", codes.join(", "))?;
        }
        writeln!(out, "Requests left: {}", stats.remaining_requests)?;

        writeln!(out, "Caches:")?;
        cache_line(&mut out, "api_responses", &stats.caches.api_responses)?;
        cache_line(&mut out, "user_data", &stats.caches.user_data)?;
        cache_line(&mut out, "static_content", &stats.caches.static_content)?;
        cache_line(&mut out, "search_results", &stats.caches.search_results)?;

        write!(
            out,
            "Session: {} elapsed, error rate {:.1}%",
            humantime::format_duration(stats.session.session_duration),
            stats.session.error_rate * 100.0
        )?;
        Ok(out)
    }
}

/// Pretty-printed JSON object
pub(crate) struct Json;

impl StatsFormatter for Json {
    fn format(&self, stats: &OutputStats) -> Result<String> {
        serde_json::to_string_pretty(stats).map_err(|e| anyhow!(e))
    }
}
