//! Environment-driven configuration, assembled once at process start.
//!
//! Follows the teacher's `OTEL_BSP_*`-family convention: one env var per
//! tunable, a documented default for each, and a typed error for anything
//! malformed. No file-based layer — this class of service is configured
//! the same way both the original system and the teacher workspace do it.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_STORE_CAPACITY: usize = 1000;
const DEFAULT_STORE_SAMPLE_INTERVAL_MS: u64 = 10_000;
const DEFAULT_SHUTDOWN_DRAIN_MS: u64 = 5_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Which tracing backend `vstrace-server` wires up at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracerBackend {
    Logging,
    Mock,
    Jaeger,
    Lightstep,
    Datadog,
}

impl TracerBackend {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "logging" => Some(TracerBackend::Logging),
            "mock" => Some(TracerBackend::Mock),
            "jaeger" => Some(TracerBackend::Jaeger),
            "lightstep" => Some(TracerBackend::Lightstep),
            "datadog" => Some(TracerBackend::Datadog),
            _ => None,
        }
    }
}

/// `INFO` / `WARN` / `DEBUG`, mirroring the original's three-level scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Debug,
}

impl LogLevel {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INFO" => Some(LogLevel::Info),
            "WARN" => Some(LogLevel::Warn),
            "DEBUG" => Some(LogLevel::Debug),
            _ => None,
        }
    }

    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Debug => tracing::Level::DEBUG,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub tracer_backend: TracerBackend,
    pub tracer_access_token: Option<String>,
    pub tracer_collector_url: Option<String>,
    pub log_level: LogLevel,
    pub store_capacity: usize,
    pub store_sample_interval: Duration,
    pub shutdown_drain: Duration,
    pub request_timeout: Duration,
    pub github_webhook_secret: Option<String>,
    pub gitlab_webhook_secret: Option<String>,
    pub custom_http_secret: Option<String>,
}

fn env_var(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parse_env<T, F>(name: &'static str, default: T, parse: F) -> Result<T, ConfigError>
where
    F: FnOnce(&str) -> Option<T>,
{
    match env_var(name) {
        None => Ok(default),
        Some(value) => parse(&value).ok_or_else(|| ConfigError::Invalid {
            var: name,
            value,
            reason: "could not parse".to_string(),
        }),
    }
}

impl Config {
    /// Reads every recognized `VS_*` (and webhook-secret) variable from the
    /// process environment, falling back to documented defaults.
    pub fn from_env() -> Result<Config, ConfigError> {
        let addr = parse_env("VS_ADDR", DEFAULT_ADDR.parse().unwrap(), |v| v.parse().ok())?;

        let tracer_backend = parse_env("VS_TRACER_BACKEND", TracerBackend::Logging, TracerBackend::parse)?;

        let log_level = parse_env("VS_LOG_LEVEL", LogLevel::Debug, LogLevel::parse)?;

        let store_capacity = parse_env("VS_STORE_CAPACITY", DEFAULT_STORE_CAPACITY, |v| v.parse().ok())?;

        let store_sample_interval_ms =
            parse_env("VS_STORE_SAMPLE_INTERVAL_MS", DEFAULT_STORE_SAMPLE_INTERVAL_MS, |v| v.parse().ok())?;

        let shutdown_drain_ms = parse_env("VS_SHUTDOWN_DRAIN_MS", DEFAULT_SHUTDOWN_DRAIN_MS, |v| v.parse().ok())?;

        let request_timeout_ms = parse_env("VS_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS, |v| v.parse().ok())?;

        Ok(Config {
            addr,
            tracer_backend,
            tracer_access_token: env_var("VS_TRACER_ACCESS_TOKEN"),
            tracer_collector_url: env_var("VS_TRACER_COLLECTOR_URL"),
            log_level,
            store_capacity,
            store_sample_interval: Duration::from_millis(store_sample_interval_ms),
            shutdown_drain: Duration::from_millis(shutdown_drain_ms),
            request_timeout: Duration::from_millis(request_timeout_ms),
            github_webhook_secret: env_var("GITHUB_WEBHOOK_SECRET_TOKEN"),
            gitlab_webhook_secret: env_var("GITLAB_WEBHOOK_SECRET_TOKEN"),
            custom_http_secret: env_var("VS_CUSTOM_HTTP_SECRET"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_when_unset() {
        temp_env::with_vars_unset(
            [
                "VS_ADDR",
                "VS_TRACER_BACKEND",
                "VS_LOG_LEVEL",
                "VS_STORE_CAPACITY",
                "VS_STORE_SAMPLE_INTERVAL_MS",
                "VS_SHUTDOWN_DRAIN_MS",
                "VS_REQUEST_TIMEOUT_MS",
            ],
            || {
                let cfg = Config::from_env().unwrap();
                assert_eq!(cfg.addr, DEFAULT_ADDR.parse::<SocketAddr>().unwrap());
                assert_eq!(cfg.tracer_backend, TracerBackend::Logging);
                assert_eq!(cfg.store_capacity, DEFAULT_STORE_CAPACITY);
            },
        );
    }

    #[rstest]
    fn rejects_unknown_backend() {
        temp_env::with_var("VS_TRACER_BACKEND", Some("carrier-pigeon"), || {
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { var: "VS_TRACER_BACKEND", .. }));
        });
    }

    #[rstest]
    fn rejects_unparsable_addr() {
        temp_env::with_var("VS_ADDR", Some("not-an-address"), || {
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { var: "VS_ADDR", .. }));
        });
    }
}
