use crate::formatters::stats::StatsFormat;
use crate::verbosity::Verbosity;
use anyhow::{Context, Error, Result, anyhow};
use clap::{Parser, builder::TypedValueParser};
use const_format::{concatcp, formatcp};
use http::{
    HeaderMap, Method,
    header::{HeaderName, HeaderValue},
};
use portal_lib::{
    CachesConfig, ClientConfig, DEFAULT_BATCH_CONCURRENCY, RateLimitsConfig, RequestOptions,
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::{fs, path::PathBuf, str::FromStr, time::Duration};
use url::Url;

pub(crate) const PORTAL_CONFIG_FILE: &str = "portal.toml";

const DEFAULT_METHOD: &str = "get";

// clap wants `&str` defaults, serde wants functions
const CONCURRENCY_STR: &str = concatcp!(DEFAULT_BATCH_CONCURRENCY);
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    PORTAL_CONFIG_FILE,
);

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

default_function! {
    concurrency: usize = DEFAULT_BATCH_CONCURRENCY;
    method: String = DEFAULT_METHOD.to_string();
    verbosity: Verbosity = Verbosity::default();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// Parse a single header into a [`HeaderName`] and [`HeaderValue`]
///
/// Headers are expected to be in format `Header-Name: Header-Value`.
/// The header name and value are trimmed of whitespace. Everything after the
/// first colon is the value.
///
/// # Errors
///
/// This fails if the header does not contain a `:` character or if the
/// header name contains non-ASCII characters.
fn parse_single_header(header: &str) -> Result<(HeaderName, HeaderValue)> {
    let parts: Vec<&str> = header.splitn(2, ':').collect();
    match parts.as_slice() {
        [name, value] => {
            let name = name.trim();
            let name = HeaderName::from_str(name)
                .map_err(|e| anyhow!("Unable to convert header name '{name}': {e}"))?;
            let value = HeaderValue::from_str(value.trim())
                .map_err(|e| anyhow!("Unable to read value of header with name '{name}': {e}"))?;
            Ok((name, value))
        }
        _ => Err(anyhow!(
            "Invalid header format. Expected colon-separated string in the format 'HeaderName: HeaderValue'"
        )),
    }
}

/// Parses a single HTTP header into a tuple of (String, String)
#[derive(Clone, Debug)]
struct HeaderParser;

impl TypedValueParser for HeaderParser {
    type Value = (String, String);

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let invalid = |message: String| clap::Error::raw(clap::error::ErrorKind::InvalidValue, message);

        let header_str = value
            .to_str()
            .ok_or_else(|| invalid("Header value contains invalid UTF-8".into()))?;

        let (name, value) = parse_single_header(header_str).map_err(|e| invalid(e.to_string()))?;
        let Ok(value) = value.to_str() else {
            return Err(invalid("Header value contains invalid UTF-8".into()));
        };
        Ok((name.to_string(), value.to_string()))
    }
}

impl clap::builder::ValueParserFactory for HeaderParser {
    type Parser = HeaderParser;
    fn value_parser() -> Self::Parser {
        HeaderParser
    }
}

/// Extension trait for converting a Vec of header pairs to a `HeaderMap`
pub(crate) trait HeaderMapExt {
    /// Convert a collection of header key-value pairs to a `HeaderMap`
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error>;
}

impl HeaderMapExt for HeaderMap {
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| anyhow!("Invalid header name '{name}': {e}"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| anyhow!("Invalid header value '{value}': {e}"))?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }
}

/// portal sends requests to the achievement benefits portal API.
///
/// Requests go through the same per-user rate limits, response cache and
/// retry policy the portal front end uses. Responses are printed as a JSON
/// array, in the order the endpoints were given.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct PortalOptions {
    /// Endpoints to request, relative to `--base-url` or absolute
    #[arg(name = "endpoints", required = true)]
    pub(crate) endpoints: Vec<String>,

    /// Configuration file to use
    #[arg(short, long = "config")]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

// Custom deserializer function for the header field
fn deserialize_headers<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = HashMap::<String, String>::deserialize(deserializer)?;
    Ok(map.into_iter().collect())
}

/// The main configuration for portal
#[derive(Parser, Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// Base URL that relative endpoints are resolved against
    #[arg(long, value_name = "URL")]
    #[serde(default)]
    pub(crate) base_url: Option<Url>,

    /// Request method
    #[arg(short = 'X', long, default_value = DEFAULT_METHOD)]
    #[serde(default = "method")]
    pub(crate) method: String,

    /// JSON request body
    #[arg(short, long, value_name = "JSON")]
    #[serde(skip)]
    pub(crate) data: Option<String>,

    /// Custom request header
    #[arg(
        short = 'H',
        long = "header",
        value_parser = HeaderParser,
        number_of_values = 1,
        long_help = "Set custom header for requests

Some APIs require custom headers to be set in order to be accessed.
Each header is given in the format 'Header-Name: Value', e.g.
'Authorization: Bearer <token>'. Repeat the flag to set more headers."
    )]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_headers")]
    pub(crate) header: Vec<(String, String)>,

    /// Do not serve GET requests from the response cache
    #[arg(long)]
    #[serde(default)]
    pub(crate) no_cache: bool,

    /// Number of requests sent at the same time
    #[arg(long, default_value = CONCURRENCY_STR)]
    #[serde(default = "concurrency")]
    pub(crate) concurrency: usize,

    /// Timeout of a single attempt, e.g. `5s` or `500ms`
    ///
    /// Overrides `timeout` in the `[client]` section of the config file.
    #[arg(long, value_parser = humantime::parse_duration)]
    #[serde(skip)]
    pub(crate) timeout: Option<Duration>,

    /// Attempts per request, including the first one
    ///
    /// Overrides `retry_attempts` in the `[client]` section of the config file.
    #[arg(long)]
    #[serde(skip)]
    pub(crate) retry_attempts: Option<u32>,

    /// Delay before the first retry, doubled for every further one
    ///
    /// Overrides `retry_delay` in the `[client]` section of the config file.
    #[arg(long, value_parser = humantime::parse_duration)]
    #[serde(skip)]
    pub(crate) retry_delay: Option<Duration>,

    /// User agent string
    ///
    /// Overrides `user_agent` in the `[client]` section of the config file.
    #[arg(short, long)]
    #[serde(skip)]
    pub(crate) user_agent: Option<String>,

    /// Print cache, rate limit and session statistics to stderr
    #[arg(long)]
    #[serde(default)]
    pub(crate) stats: bool,

    /// Output format of the statistics
    #[arg(long, default_value_t)]
    #[serde(default)]
    pub(crate) format: StatsFormat,

    /// Send the session's performance data to this URL when done
    #[arg(long, value_name = "URL")]
    #[serde(default)]
    pub(crate) analytics: Option<Url>,

    /// Client defaults, only settable in the config file
    #[arg(skip)]
    #[serde(default)]
    pub(crate) client: ClientConfig,

    /// Quotas of the API and auth limiters, only settable in the config file
    #[arg(skip)]
    #[serde(default)]
    pub(crate) rate_limits: RateLimitsConfig,

    /// Profiles of the response caches, only settable in the config file
    #[arg(skip)]
    #[serde(default)]
    pub(crate) caches: CachesConfig,
}

impl Config {
    /// Special handling for merging headers
    ///
    /// Overwrites existing headers in `self` with the values from `other`.
    fn merge_headers(&mut self, other: &[(String, String)]) {
        let self_map = self.header.iter().cloned().collect::<HashMap<_, _>>();
        let other_map = other.iter().cloned().collect::<HashMap<_, _>>();

        // Merge the two maps, with `other` taking precedence
        let merged_map: HashMap<_, _> = self_map.into_iter().chain(other_map).collect();

        // Convert the merged map back to a Vec of tuples
        self.header = merged_map.into_iter().collect();
    }

    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        // Read configuration file
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        // Headers from the command line win over the ones from the file
        let cli_headers = std::mem::take(&mut self.header);
        self.header = toml.header.clone();
        self.merge_headers(&cli_headers);

        // These sections only exist in TOML
        self.client = toml.client.clone();
        self.rate_limits = toml.rate_limits;
        self.caches = toml.caches;

        // NOTE: if you see an error within this macro call, check to make sure
        // that the fields provided to fold_in! match all the fields of the Config struct.
        fold_in! {
            // Destination and source configs
            self, toml;

            Config {
                // Keys which are handled outside of fold_in
                ..header,
                ..client,
                ..rate_limits,
                ..caches,

                // Keys only settable on the command line
                ..data,
                ..timeout,
                ..retry_attempts,
                ..retry_delay,
                ..user_agent,

                // Keys with defaults to assign
                verbose: Verbosity::default(),
                base_url: None,
                method: DEFAULT_METHOD,
                no_cache: false,
                concurrency: DEFAULT_BATCH_CONCURRENCY,
                stats: false,
                format: StatsFormat::default(),
                analytics: None,
            }
        }
    }

    /// Effective client defaults: command-line flags over the `[client]`
    /// section
    pub(crate) fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: self.timeout.unwrap_or(self.client.timeout),
            retry_attempts: self.retry_attempts.unwrap_or(self.client.retry_attempts),
            retry_delay: self.retry_delay.unwrap_or(self.client.retry_delay),
            user_agent: self.user_agent.clone().or_else(|| self.client.user_agent.clone()),
            security_headers: self.client.security_headers,
        }
    }

    /// Options shared by every request of this run
    pub(crate) fn request_options(&self) -> Result<RequestOptions> {
        let method = Method::from_str(&self.method.to_uppercase())
            .with_context(|| format!("Invalid request method `{}`", self.method))?;
        let body = self
            .data
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()
            .context("Request body is not valid JSON")?;
        let headers = HeaderMap::from_header_pairs(&self.header)?;

        Ok(RequestOptions::builder()
            .method(method)
            .headers(headers)
            .body(body)
            .cache(!self.no_cache)
            .build())
    }
}
