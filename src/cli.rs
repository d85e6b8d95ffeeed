// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `tagdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tagdag",
    version,
    about = "Tag-driven incremental build orchestrator.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Tagdag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Tagdag.toml")]
    pub config: String,

    /// Source tree root (overrides `[build].src`).
    #[arg(long, value_name = "DIR")]
    pub src: Option<String>,

    /// Temp tree root for outputs (overrides `[build].tmp`).
    #[arg(long, value_name = "DIR")]
    pub tmp: Option<String>,

    /// Maximum concurrently running actions (overrides `[build].jobs`).
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Run the build to idle and exit, no watching.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, the environment variable named by
    /// [`crate::logging::LOG_ENV_VAR`] applies, then the `info` default.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the rules, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
