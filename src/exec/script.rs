// src/exec/script.rs

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::process::Command;

use crate::action::{Action, ActionFactory, BuildContext};
use crate::config::model::RuleConfig;
use crate::event::{AsyncHandle, EventGroup};
use crate::fs::File;
use crate::tag::Tag;

/// A compiled `[rule.<name>]` section: which tag it watches, which files it
/// accepts, and what to run for them.
#[derive(Debug, Clone)]
pub struct ScriptRule {
    pub name: String,
    pub on: Tag,
    pub pattern: Option<GlobSet>,
    pub cmd: String,
    pub outputs: Vec<String>,
    pub provides: Vec<Tag>,
    pub silent: bool,
}

impl ScriptRule {
    pub fn from_config(name: &str, cfg: &RuleConfig) -> Result<Self> {
        let pattern = match &cfg.pattern {
            Some(pat) => {
                let glob = Glob::new(pat)
                    .with_context(|| format!("invalid pattern for rule '{name}': {pat}"))?;
                let mut builder = GlobSetBuilder::new();
                builder.add(glob);
                Some(builder.build()?)
            }
            None => None,
        };

        Ok(ScriptRule {
            name: name.to_string(),
            on: cfg.on.clone(),
            pattern,
            cmd: cfg.cmd.clone(),
            outputs: cfg.outputs.clone(),
            provides: cfg.provides.clone(),
            silent: cfg.silent,
        })
    }
}

/// Factory producing a [`ScriptAction`] for every file that carries the
/// rule's trigger tag and matches its pattern.
pub struct ScriptActionFactory {
    rule: Arc<ScriptRule>,
}

impl ScriptActionFactory {
    pub fn new(rule: ScriptRule) -> Self {
        ScriptActionFactory {
            rule: Arc::new(rule),
        }
    }
}

impl ActionFactory for ScriptActionFactory {
    fn trigger_tags(&self) -> Vec<Tag> {
        vec![self.rule.on.clone()]
    }

    fn try_make_action(&self, tag: &Tag, file: &File) -> Option<Box<dyn Action>> {
        if *tag != self.rule.on {
            return None;
        }
        if let Some(pattern) = &self.rule.pattern {
            if !pattern.is_match(file.canonical_name()) {
                return None;
            }
        }
        Some(Box::new(ScriptAction {
            rule: Arc::clone(&self.rule),
            input: file.clone(),
            _op: None,
        }))
    }
}

/// One rule invocation on one input file.
///
/// `start` expands the output templates, launches the shell command off the
/// driver loop, and reports the outcome from the completion callback. The
/// process handle is parked in `op`; dropping it (reset, teardown) kills the
/// process via `kill_on_drop`.
struct ScriptAction {
    rule: Arc<ScriptRule>,
    input: File,
    /// Keeps the in-flight process alive; dropping it kills the process.
    _op: Option<AsyncHandle>,
}

impl Action for ScriptAction {
    fn verb(&self) -> &str {
        &self.rule.name
    }

    fn is_silent(&self) -> bool {
        self.rule.silent
    }

    fn start(&mut self, group: &mut EventGroup, ctx: &mut dyn BuildContext) -> Result<()> {
        let canonical = self.input.canonical_name();
        let base = canonical.rsplit('/').next().unwrap_or(canonical);
        let name = base.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(base);
        let dir = canonical.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
        let in_path = self.input.full_path().display().to_string();

        let mut outputs = Vec::with_capacity(self.rule.outputs.len());
        for template in &self.rule.outputs {
            let rel = expand_template(
                template,
                &[("NAME", name), ("DIR", dir), ("IN", &in_path)],
            )?;
            outputs.push(ctx.new_output(&rel)?);
        }

        let out_path = outputs
            .first()
            .map(|f| f.full_path().display().to_string())
            .unwrap_or_default();
        let cmd = expand_template(
            &self.rule.cmd,
            &[
                ("NAME", name),
                ("DIR", dir),
                ("IN", &in_path),
                ("OUT", &out_path),
            ],
        )?;

        ctx.log(&format!("$ {cmd}"))?;

        let provides = self.rule.provides.clone();
        self._op = Some(group.run_on_completion(
            run_shell(cmd),
            move |_action, _group, ctx, result| {
                let output = result?;

                for line in String::from_utf8_lossy(&output.stdout).lines() {
                    ctx.log(line)?;
                }
                for line in String::from_utf8_lossy(&output.stderr).lines() {
                    ctx.log(line)?;
                }

                if output.status.success() {
                    if !provides.is_empty() {
                        for file in &outputs {
                            ctx.provide(file.clone(), provides.clone())?;
                        }
                    }
                    ctx.passed()
                } else {
                    ctx.log(&format!(
                        "exit code {}",
                        output.status.code().unwrap_or(-1)
                    ))?;
                    ctx.failed()
                }
            },
        ));
        Ok(())
    }
}

/// Run a command line through the platform shell, capturing output.
async fn run_shell(cmd: String) -> Result<std::process::Output> {
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&cmd);
        c
    };

    command.stdin(Stdio::null()).kill_on_drop(true);

    command
        .output()
        .await
        .with_context(|| format!("running shell command `{cmd}`"))
}

/// Substitute `${KEY}` placeholders. Unknown keys are an error so a typo in
/// a rule fails loudly instead of producing a half-expanded command line.
pub fn expand_template(template: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            bail!("unterminated ${{...}} in template: {template}");
        };
        let key = &after[..end];
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => result.push_str(value),
            None => bail!("unknown placeholder ${{{key}}} in template: {template}"),
        }
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    Ok(result)
}
