// src/lib.rs

pub mod action;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod driver;
pub mod errors;
pub mod event;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod tag;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dashboard::LogDashboard;
use crate::driver::Driver;
use crate::exec::{ScriptActionFactory, ScriptRule};
use crate::fs::{walk_files, File};
use crate::tag::Tag;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the driver (tag index + action state machines)
/// - one script-rule factory per `[rule.<name>]` section
/// - (optional) file watcher
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    let src = args.src.clone().unwrap_or_else(|| cfg.build.src.clone());
    let tmp = args.tmp.clone().unwrap_or_else(|| cfg.build.tmp.clone());
    let jobs = args.jobs.unwrap_or(cfg.build.jobs);

    if args.dry_run {
        // Scan for real, register nothing: show what the build would see.
        let provisions = walk_files(&File::tree_root(src.clone()))
            .with_context(|| format!("scanning source tree {src:?}"))?;
        print!("{}", dry_run_report(&cfg, &provisions));
        debug!("dry-run complete (no execution)");
        return Ok(());
    }

    let mut driver = Driver::new(Box::new(LogDashboard::new()), src.clone(), tmp, jobs)?;

    for (name, rule_cfg) in cfg.rule.iter() {
        let rule = ScriptRule::from_config(name, rule_cfg)?;
        driver.add_action_factory(Box::new(ScriptActionFactory::new(rule)));
    }

    // Optional file watcher (disabled in --once mode).
    let _watcher_handle = if !args.once {
        Some(watch::spawn_watcher(PathBuf::from(&src), driver.handle())?)
    } else {
        None
    };

    // Ctrl-C → graceful shutdown.
    {
        let handle = driver.handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            handle.request_shutdown();
        });
    }

    info!(src = %src, jobs, rules = cfg.rule.len(), "tagdag starting");
    driver.start()?;
    driver.run(args.once).await
}

/// Render the dry-run listing: the build settings, the provisions a scan
/// would register (every source file, under the default tag), and the rules
/// that would watch them.
pub fn dry_run_report(cfg: &ConfigFile, provisions: &[File]) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let _ = writeln!(out, "tagdag dry-run");
    let _ = writeln!(out, "  build.src = {}", cfg.build.src);
    let _ = writeln!(out, "  build.tmp = {}", cfg.build.tmp);
    let _ = writeln!(out, "  build.jobs = {}", cfg.build.jobs);
    let _ = writeln!(out);

    let _ = writeln!(out, "provisions ({}):", provisions.len());
    for file in provisions {
        let _ = writeln!(out, "  - {}  [{}]", file.canonical_name(), Tag::default_tag());
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "rules ({}):", cfg.rule.len());
    for (name, rule) in cfg.rule.iter() {
        let _ = writeln!(out, "  - {name}");
        let _ = writeln!(out, "      on: {}", rule.on);
        if let Some(ref pattern) = rule.pattern {
            let _ = writeln!(out, "      pattern: {pattern}");
        }
        let _ = writeln!(out, "      cmd: {}", rule.cmd);
        if !rule.outputs.is_empty() {
            let _ = writeln!(out, "      outputs: {:?}", rule.outputs);
        }
        if !rule.provides.is_empty() {
            let _ = writeln!(out, "      provides: {:?}", rule.provides);
        }
        if rule.silent {
            let _ = writeln!(out, "      silent: true");
        }
    }

    out
}
