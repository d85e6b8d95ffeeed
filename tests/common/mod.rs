// tests/common/mod.rs

//! Shared helpers for the integration tests: a recording dashboard and a few
//! small actions/factories that tag and look up files.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tagdag::action::{Action, ActionFactory, BuildContext};
use tagdag::dashboard::{Dashboard, DashboardTask, TaskState, TaskStyle};
use tagdag::event::EventGroup;
use tagdag::fs::File;
use tagdag::tag::Tag;

/// Shared log of everything the dashboard saw, as `"verb noun: event"` lines.
#[derive(Clone, Default)]
pub struct TaskLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl TaskLog {
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn push(&self, line: String) {
        self.entries.lock().unwrap().push(line);
    }

    /// Lines for a given noun, in order.
    pub fn for_noun(&self, noun: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|line| line.contains(&format!(" {noun}: ")))
            .collect()
    }
}

pub struct RecordingDashboard {
    pub log: TaskLog,
}

impl RecordingDashboard {
    pub fn new(log: TaskLog) -> Self {
        RecordingDashboard { log }
    }
}

impl Dashboard for RecordingDashboard {
    fn begin_task(&mut self, verb: &str, noun: &str, _style: TaskStyle) -> Box<dyn DashboardTask> {
        self.log.push(format!("{verb} {noun}: opened"));
        Box::new(RecordingTask {
            verb: verb.to_string(),
            noun: noun.to_string(),
            log: self.log.clone(),
        })
    }
}

struct RecordingTask {
    verb: String,
    noun: String,
    log: TaskLog,
}

impl DashboardTask for RecordingTask {
    fn set_state(&mut self, state: TaskState) {
        self.log
            .push(format!("{} {}: {state}", self.verb, self.noun));
    }

    fn add_output(&mut self, text: &str) {
        self.log
            .push(format!("{} {}: > {text}", self.verb, self.noun));
    }
}

impl Drop for RecordingTask {
    fn drop(&mut self) {
        self.log.push(format!("{} {}: closed", self.verb, self.noun));
    }
}

/// Factory built from a closure, so tests can express trigger policies
/// inline.
pub struct FnFactory {
    tags: Vec<Tag>,
    make: Box<dyn Fn(&Tag, &File) -> Option<Box<dyn Action>> + Send>,
}

impl FnFactory {
    pub fn new(
        tags: Vec<Tag>,
        make: impl Fn(&Tag, &File) -> Option<Box<dyn Action>> + Send + 'static,
    ) -> Self {
        FnFactory {
            tags,
            make: Box::new(make),
        }
    }
}

impl ActionFactory for FnFactory {
    fn trigger_tags(&self) -> Vec<Tag> {
        self.tags.clone()
    }

    fn try_make_action(&self, tag: &Tag, file: &File) -> Option<Box<dyn Action>> {
        (self.make)(tag, file)
    }
}

/// Action that declares its triggering file under extra tags and passes.
pub struct TagAction {
    pub file: File,
    pub tags: Vec<Tag>,
}

impl Action for TagAction {
    fn verb(&self) -> &str {
        "tag"
    }

    fn start(&mut self, _group: &mut EventGroup, ctx: &mut dyn BuildContext) -> Result<()> {
        ctx.provide(self.file.clone(), self.tags.clone())?;
        ctx.passed()
    }
}

/// Action that looks up a tag, records what it found, and passes.
pub struct LookupAction {
    pub tag: Tag,
    pub seen: SeenProviders,
    pub runs: Arc<AtomicUsize>,
}

pub type SeenProviders = Arc<Mutex<Vec<Option<String>>>>;

impl Action for LookupAction {
    fn verb(&self) -> &str {
        "lookup"
    }

    fn start(&mut self, _group: &mut EventGroup, ctx: &mut dyn BuildContext) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let found = ctx.find_provider(self.tag.clone())?;
        self.seen
            .lock()
            .unwrap()
            .push(found.map(|f| f.canonical_name().to_string()));
        ctx.passed()
    }
}

/// Action that reports success and nothing else.
pub struct PassAction;

impl Action for PassAction {
    fn verb(&self) -> &str {
        "noop"
    }

    fn start(&mut self, _group: &mut EventGroup, ctx: &mut dyn BuildContext) -> Result<()> {
        ctx.passed()
    }
}

/// Action that counts its runs and passes.
pub struct CountedAction {
    pub runs: Arc<AtomicUsize>,
}

impl Action for CountedAction {
    fn verb(&self) -> &str {
        "count"
    }

    fn start(&mut self, _group: &mut EventGroup, ctx: &mut dyn BuildContext) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        ctx.passed()
    }
}

/// Action that looks up one tag, then declares its own file under others.
/// The building block for dependency chains in tests.
pub struct LookupProvideAction {
    pub file: File,
    pub lookup: Tag,
    pub provide_tags: Vec<Tag>,
    pub seen: SeenProviders,
    pub runs: Arc<AtomicUsize>,
}

impl Action for LookupProvideAction {
    fn verb(&self) -> &str {
        "derive"
    }

    fn start(&mut self, _group: &mut EventGroup, ctx: &mut dyn BuildContext) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let found = ctx.find_provider(self.lookup.clone())?;
        self.seen
            .lock()
            .unwrap()
            .push(found.map(|f| f.canonical_name().to_string()));
        ctx.provide(self.file.clone(), self.provide_tags.clone())?;
        ctx.passed()
    }
}

/// Factory for `TagAction`s: every file whose canonical name matches
/// `suffix` is re-provided under `tags`.
pub fn tagger(suffix: &'static str, tags: Vec<Tag>) -> FnFactory {
    FnFactory::new(vec![Tag::default_tag()], move |_tag, file| {
        if file.canonical_name().ends_with(suffix) {
            Some(Box::new(TagAction {
                file: file.clone(),
                tags: tags.clone(),
            }))
        } else {
            None
        }
    })
}

/// Factory for a `LookupAction` triggered by files matching `suffix`.
pub fn lookup(
    suffix: &'static str,
    tag: Tag,
    seen: SeenProviders,
    runs: Arc<AtomicUsize>,
) -> FnFactory {
    FnFactory::new(vec![Tag::default_tag()], move |_tag, file| {
        if file.canonical_name().ends_with(suffix) {
            Some(Box::new(LookupAction {
                tag: tag.clone(),
                seen: Arc::clone(&seen),
                runs: Arc::clone(&runs),
            }))
        } else {
            None
        }
    })
}

/// Create the given relative files (with their parent directories) under
/// `root`, each containing its own name.
pub fn make_tree(root: &Path, files: &[&str]) {
    for rel in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, rel.as_bytes()).unwrap();
    }
}

/// Last provider a `LookupAction` observed.
pub fn last_seen(seen: &SeenProviders) -> Option<String> {
    seen.lock().unwrap().last().cloned().flatten()
}
