//! `portal` is a command-line client for the achievement benefits portal
//! API. Every request goes through the same per-user rate limits, response
//! cache and retry policy as the portal front end.
//!
//! The portal binary is a wrapper around portal-lib.
//!
//! Fetch a few endpoints, three at a time:
//! ```sh
//! portal --base-url https://api.example.edu/v1/ --concurrency 3 benefits courses users/42
//! ```
//!
//! Send a JSON body:
//! ```sh
//! portal -X post -d '{"course": "CS101"}' https://api.example.edu/v1/enrollments
//! ```
//!
//! Print cache and rate limit statistics afterwards:
//! ```sh
//! portal --stats --format json benefits
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Error, Result, bail};
use clap::Parser;
use log::{error, info};
use portal_lib::{Identity, PerformanceMonitor};

mod client;
mod commands;
mod formatters;
mod options;
mod stats;
mod verbosity;

use crate::commands::CommandParams;
use crate::formatters::{get_stats_formatter, log::init_logging};
use crate::options::{Config, PORTAL_CONFIG_FILE, PortalOptions};
use crate::stats::OutputStats;

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator.
    #[allow(unused)]
    UnexpectedFailure = 1,
    RequestFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file and command-line arguments
fn load_config() -> Result<PortalOptions> {
    let mut opts = PortalOptions::parse();

    init_logging(&opts.config.verbose);

    // Load a potentially existing config file and merge it into the config from
    // the CLI
    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // Without an explicit file, an invalid `portal.toml` in the current
        // directory is an error as well
        let default_config = PathBuf::from(PORTAL_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }

    Ok(opts)
}

/// Set up runtime and call portal entrypoint
fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!("Error while loading config: {e}");
            exit(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;

    match runtime.block_on(run(opts)) {
        Err(e) if Some(io::ErrorKind::BrokenPipe) == underlying_io_error_kind(&e) => {
            exit(ExitCode::Success as i32);
        }
        res => res,
    }
}

/// Check if the given error can be traced back to an `io::ErrorKind`
fn underlying_io_error_kind(error: &Error) -> Option<io::ErrorKind> {
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
    }
    None
}

/// Run portal with the merged options
async fn run(opts: PortalOptions) -> Result<i32> {
    let PortalOptions {
        endpoints, config, ..
    } = opts;

    let services = client::Services::create(&config)?;
    let client = client::create(&config, &services)?;
    let monitor = Arc::new(PerformanceMonitor::new());
    info!("Session {}", monitor.session_id());

    let params = CommandParams {
        client,
        monitor: monitor.clone(),
        endpoints,
        cfg: config.clone(),
    };
    let (responses, response_stats, exit_code) = commands::request(params).await?;

    {
        let mut stdout = io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, &responses)
            .context("Cannot write responses")?;
        writeln!(stdout)?;
    }

    if config.stats {
        let stats = OutputStats {
            responses: response_stats,
            caches: services.caches.stats(),
            session: monitor.stats(),
            remaining_requests: services.limiters.api.remaining_tokens(Identity::anonymous()),
        };
        let formatted = get_stats_formatter(&config.format).format(&stats)?;
        writeln!(io::stderr(), "{formatted}")?;
    }

    if let Some(endpoint) = &config.analytics {
        monitor.send_analytics(endpoint.as_str()).await;
    }

    Ok(exit_code as i32)
}
