//! Runtime configuration from the environment.
//!
//! Every setting has a default. A variable that is unset keeps the default
//! silently; one that is set but does not parse keeps the default with a
//! warning.
//!
//! # Variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `GERRIT_EVENTS_SERVER_NAME` | `gerrit` |
//! | `GERRIT_EVENTS_HOST` | `localhost` |
//! | `GERRIT_EVENTS_PORT` | `29418` |
//! | `GERRIT_EVENTS_SERVER_VERSION` | unset |
//! | `GERRIT_EVENTS_WATCHDOG_TIMEOUT_SECS` | `0` (disabled) |
//! | `GERRIT_EVENTS_WATCHDOG_EXCEPTION_DAYS` | empty |
//! | `GERRIT_EVENTS_WATCHDOG_EXCEPTION_TIMES` | empty |
//! | `GERRIT_EVENTS_RECEIVING_WORKERS` | `3` |
//! | `GERRIT_EVENTS_SENDING_WORKERS` | `1` |
//! | `GERRIT_EVENTS_QUEUE_CAPACITY` | `1024` |
//! | `GERRIT_EVENTS_BUILD_SCHEDULE_DELAY_SECS` | `3` |
//! | `GERRIT_EVENTS_JOB_DEPENDENCIES` | empty, e.g. `test=build;deploy=build,test` |
//! | `GERRIT_EVENTS_HTTP_ADDR` | `0.0.0.0:3000` |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::dependency::DEFAULT_BUILD_SCHEDULE_DELAY;
use crate::events::{DEFAULT_SSH_PORT, Provider};
use crate::watchdog::exception::{parse_days_of_week, parse_time_spans};
use crate::watchdog::{WatchTimeExceptions, WatchdogConfig};

const ENV_PREFIX: &str = "GERRIT_EVENTS_";

const DEFAULT_SERVER_NAME: &str = "gerrit";
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_RECEIVING_WORKERS: usize = 3;
const DEFAULT_SENDING_WORKERS: usize = 1;
const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_HTTP_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 3000);

/// Prefix the server puts in front of its version string.
const VERSION_PREFIX: &str = "gerrit version ";

/// A `GERRIT_EVENTS_JOB_DEPENDENCIES` entry that is not `job=dep,...`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("expected `job=dependency,...`, got {0:?}")]
pub struct InvalidDependencyEntry(pub String);

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub server_name: String,
    pub host: String,
    pub port: u16,
    pub server_version: Option<String>,
    pub watchdog: WatchdogConfig,
    pub receiving_workers: usize,
    pub sending_workers: usize,
    pub queue_capacity: usize,
    pub build_schedule_delay: Duration,
    /// `(job, comma-separated dependencies)` pairs for the dependency gate.
    pub job_dependencies: Vec<(String, String)>,
    pub http_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Config {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_SSH_PORT,
            server_version: None,
            watchdog: WatchdogConfig::default(),
            receiving_workers: DEFAULT_RECEIVING_WORKERS,
            sending_workers: DEFAULT_SENDING_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            build_schedule_delay: DEFAULT_BUILD_SCHEDULE_DELAY,
            job_dependencies: Vec::new(),
            http_addr: SocketAddr::from(DEFAULT_HTTP_ADDR),
        }
    }

    /// Reads the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`, which is given full variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(&format!("{ENV_PREFIX}{key}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::new();

        let exceptions = WatchTimeExceptions::new(
            parse_or(get("WATCHDOG_EXCEPTION_DAYS"), "WATCHDOG_EXCEPTION_DAYS", |s| {
                parse_days_of_week(s)
            }),
            parse_or(get("WATCHDOG_EXCEPTION_TIMES"), "WATCHDOG_EXCEPTION_TIMES", |s| {
                parse_time_spans(s)
            }),
        );
        let timeout_secs: u64 = parsed(get("WATCHDOG_TIMEOUT_SECS"), "WATCHDOG_TIMEOUT_SECS")
            .unwrap_or(0);

        Config {
            server_name: get("SERVER_NAME").unwrap_or(defaults.server_name),
            host: get("HOST").unwrap_or(defaults.host),
            port: parsed(get("PORT"), "PORT").unwrap_or(defaults.port),
            server_version: get("SERVER_VERSION").map(|v| format_version(&v)),
            watchdog: WatchdogConfig::new(Duration::from_secs(timeout_secs), exceptions),
            receiving_workers: parsed(get("RECEIVING_WORKERS"), "RECEIVING_WORKERS")
                .unwrap_or(defaults.receiving_workers),
            sending_workers: parsed(get("SENDING_WORKERS"), "SENDING_WORKERS")
                .unwrap_or(defaults.sending_workers),
            queue_capacity: parsed(get("QUEUE_CAPACITY"), "QUEUE_CAPACITY")
                .unwrap_or(defaults.queue_capacity),
            build_schedule_delay: parsed(
                get("BUILD_SCHEDULE_DELAY_SECS"),
                "BUILD_SCHEDULE_DELAY_SECS",
            )
            .map(Duration::from_secs)
            .unwrap_or(defaults.build_schedule_delay),
            job_dependencies: parse_or(get("JOB_DEPENDENCIES"), "JOB_DEPENDENCIES", |s| {
                parse_job_dependencies(s)
            }),
            http_addr: parsed(get("HTTP_ADDR"), "HTTP_ADDR").unwrap_or(defaults.http_addr),
        }
    }

    /// Identity of the configured server, attached to every event it sends.
    pub fn provider(&self) -> Provider {
        Provider::new(&self.server_name, &self.host, self.port)
            .with_version(self.server_version.clone())
    }
}

fn parsed<T: FromStr>(value: Option<String>, key: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    parse_or_none(value, key, |s| s.parse::<T>())
}

fn parse_or<T: Default, E: std::fmt::Display>(
    value: Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Result<T, E>,
) -> T {
    parse_or_none(value, key, parse).unwrap_or_default()
}

fn parse_or_none<T, E: std::fmt::Display>(
    value: Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Result<T, E>,
) -> Option<T> {
    let value = value?;
    match parse(&value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(variable = %format!("{ENV_PREFIX}{key}"), %value, error = %e, "Ignoring invalid setting");
            None
        }
    }
}

/// Parses `job=dep,dep;job=dep`. Blank entries are skipped.
pub fn parse_job_dependencies(s: &str) -> Result<Vec<(String, String)>, InvalidDependencyEntry> {
    s.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (job, dependencies) = entry
                .split_once('=')
                .ok_or_else(|| InvalidDependencyEntry(entry.to_string()))?;
            let job = job.trim();
            if job.is_empty() {
                return Err(InvalidDependencyEntry(entry.to_string()));
            }
            Ok((job.to_string(), dependencies.trim().to_string()))
        })
        .collect()
}

/// Strips the `gerrit version ` prefix the server reports.
pub fn format_version(version: &str) -> String {
    let version = version.trim();
    version
        .strip_prefix(VERSION_PREFIX)
        .unwrap_or(version)
        .trim()
        .to_string()
}
