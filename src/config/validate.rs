// src/config/validate.rs

use anyhow::{anyhow, Context, Result};
use globset::Glob;

use crate::config::model::ConfigFile;
use crate::exec::expand_template;

/// Placeholders accepted in `cmd` templates.
const CMD_VARS: &[(&str, &str)] = &[("IN", ""), ("OUT", ""), ("NAME", ""), ("DIR", "")];

/// Placeholders accepted in `outputs` templates.
const OUTPUT_VARS: &[(&str, &str)] = &[("IN", ""), ("NAME", ""), ("DIR", "")];

/// Run semantic validation against a loaded configuration.
///
/// This checks:
/// - `jobs >= 1`
/// - every rule has a non-empty `on` tag and `cmd`
/// - `pattern` compiles as a glob
/// - `cmd` and `outputs` templates only use known placeholders
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    validate_build_section(cfg)?;
    for (name, rule) in cfg.rule.iter() {
        validate_rule(name, rule)?;
    }
    Ok(())
}

fn validate_build_section(cfg: &ConfigFile) -> Result<()> {
    if cfg.build.jobs == 0 {
        return Err(anyhow!("[build].jobs must be >= 1 (got 0)"));
    }
    if cfg.build.src.is_empty() {
        return Err(anyhow!("[build].src must not be empty"));
    }
    if cfg.build.tmp.is_empty() {
        return Err(anyhow!("[build].tmp must not be empty"));
    }
    Ok(())
}

fn validate_rule(name: &str, rule: &crate::config::model::RuleConfig) -> Result<()> {
    if rule.on.as_str().is_empty() {
        return Err(anyhow!("rule '{}' has an empty `on` tag", name));
    }
    if rule.cmd.trim().is_empty() {
        return Err(anyhow!("rule '{}' has an empty `cmd`", name));
    }

    if let Some(pattern) = &rule.pattern {
        Glob::new(pattern)
            .with_context(|| format!("rule '{}' has an invalid `pattern`: {}", name, pattern))?;
    }

    expand_template(&rule.cmd, CMD_VARS)
        .with_context(|| format!("rule '{}' has an invalid `cmd` template", name))?;
    for output in &rule.outputs {
        expand_template(output, OUTPUT_VARS)
            .with_context(|| format!("rule '{}' has an invalid output template", name))?;
    }

    Ok(())
}
