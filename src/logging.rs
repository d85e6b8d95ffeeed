// src/logging.rs

//! Global `tracing` subscriber setup.
//!
//! tagdag renders its dashboard through `tracing`, so the subscriber
//! configured here is the primary user-facing surface rather than a
//! diagnostics side channel: task lines come out of it at info, driver
//! internals at debug. Module targets are hidden to keep task lines clean.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Environment variable consulted when no `--log-level` flag is given.
/// Accepts the same names as the flag (`error` … `trace`).
pub const LOG_ENV_VAR: &str = "TAGDAG_LOG";

/// Install the global subscriber. Call once, before the driver starts;
/// a second call panics inside `tracing-subscriber`.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    fmt()
        .with_max_level(resolve_level(cli_level))
        .with_target(false)
        .init();
    Ok(())
}

/// Effective level: the CLI flag wins, then [`LOG_ENV_VAR`], then `info`.
fn resolve_level(cli_level: Option<LogLevel>) -> Level {
    if let Some(lvl) = cli_level {
        return lvl.into();
    }
    std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(Level::INFO)
}

impl From<LogLevel> for Level {
    fn from(lvl: LogLevel) -> Self {
        match lvl {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}
