//! Structured, JSON-formatted, level-filterable logging, mirroring the
//! original's `logrus` JSON formatter writing to stdout.

use tracing_subscriber::filter::LevelFilter;
use vstrace_sdk::LogLevel;

pub fn init(level: LogLevel) {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level.as_tracing_level()).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .with_current_span(false)
        .init();
}
