// src/exec/mod.rs

//! Process execution layer.
//!
//! This module turns the `[rule.<name>]` config sections into concrete
//! actions: a [`script::ScriptActionFactory`] triggers on the configured tag,
//! and each matching file gets a `ScriptAction` that runs the rule's command
//! through the platform shell with `tokio::process`.

pub mod script;

pub use script::{expand_template, ScriptActionFactory, ScriptRule};
