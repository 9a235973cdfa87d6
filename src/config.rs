//! Router configuration.
//!
//! [`Config::default`] suits most services. [`Config::from_env`] reads overrides from the
//! environment:
//!
//! | variable             | field          | default |
//! |----------------------|----------------|---------|
//! | `RIVER_LOG_REQUESTS` | `log_requests` | `true`  |
//! | `RIVER_DUMP_ROUTES`  | `dump_routes`  | `true`  |
//! | `RIVER_THREADS`      | `threads`      | `4`     |
//! | `RIVER_TIMEOUT_SECS` | `timeout`      | `5`     |
//! | `RIVER_MAX_BODY`     | `max_body`     | `4 MiB` |
//!
//! Missing or malformed values fall back to the default.

use std::{env, str::FromStr, time::Duration};

/// Settings a [`Router`](crate::Router) is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Insert a [`Logger`](crate::Logger) after the global middleware of every request.
    pub log_requests: bool,

    /// Log the route table when the server starts.
    pub dump_routes: bool,

    /// Worker threads kept alive by the server. More are spawned under load.
    pub threads: usize,

    /// Read and write timeout of a connection.
    pub timeout: Duration,

    /// Largest request body accepted, in bytes. Longer requests are answered with
    /// `413 Payload Too Large` and their connection is closed.
    pub max_body: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_requests: true,
            dump_routes: true,
            threads: 4,
            timeout: Duration::from_secs(5),
            max_body: 4 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            log_requests: parse_flag(lookup("RIVER_LOG_REQUESTS")).unwrap_or(defaults.log_requests),
            dump_routes: parse_flag(lookup("RIVER_DUMP_ROUTES")).unwrap_or(defaults.dump_routes),
            threads: parse(lookup("RIVER_THREADS")).unwrap_or(defaults.threads),
            timeout: parse::<u64>(lookup("RIVER_TIMEOUT_SECS"))
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_body: parse(lookup("RIVER_MAX_BODY")).unwrap_or(defaults.max_body),
        }
    }
}

fn parse<T: FromStr>(value: Option<String>) -> Option<T> {
    value?.trim().parse().ok()
}

fn parse_flag(value: Option<String>) -> Option<bool> {
    match value?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
