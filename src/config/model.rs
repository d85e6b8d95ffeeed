// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::tag::Tag;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [build]
/// src = "src"
/// tmp = "tmp"
/// jobs = 4
///
/// [rule.compile]
/// on = "default"
/// pattern = "**/*.c"
/// cmd = "cc -c ${IN} -o ${OUT}"
/// outputs = ["${DIR}/${NAME}.o"]
/// provides = ["obj"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    /// Tree locations and the concurrency bound from `[build]`.
    #[serde(default)]
    pub build: BuildSection,

    /// All rules from `[rule.<name>]`. Keys are the rule names.
    #[serde(default)]
    pub rule: BTreeMap<String, RuleConfig>,
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    /// Source tree root, scanned for input files.
    #[serde(default = "default_src")]
    pub src: String,

    /// Temp tree root where actions allocate their outputs.
    #[serde(default = "default_tmp")]
    pub tmp: String,

    /// Maximum number of actions running at once.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

fn default_src() -> String {
    "src".to_string()
}

fn default_tmp() -> String {
    "tmp".to_string()
}

fn default_jobs() -> usize {
    4
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            src: default_src(),
            tmp: default_tmp(),
            jobs: default_jobs(),
        }
    }
}

/// `[rule.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Trigger tag: `"default"` for freshly discovered files, `"file:<path>"`
    /// for a specific canonical path, or any tag another rule provides.
    #[serde(default = "default_on")]
    pub on: Tag,

    /// Optional glob the triggering file's canonical name must match.
    #[serde(default)]
    pub pattern: Option<String>,

    /// Command line, expanded with `${IN}`, `${OUT}`, `${NAME}`, `${DIR}`.
    pub cmd: String,

    /// Output path templates under the temp tree, expanded with `${NAME}`,
    /// `${DIR}`, `${IN}`.
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Extra tags attached to each output (outputs always carry the default
    /// tag as well).
    #[serde(default)]
    pub provides: Vec<Tag>,

    /// Silent rules only surface on the dashboard when something goes wrong.
    #[serde(default)]
    pub silent: bool,
}

fn default_on() -> Tag {
    Tag::default_tag()
}
