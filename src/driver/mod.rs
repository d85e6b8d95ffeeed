// src/driver/mod.rs

//! The build driver: tag index, dependency tracking, and the action
//! lifecycle.
//!
//! - [`tables`] holds the multi-index tables (tag ↔ provision, recorded
//!   dependency lookups).
//! - [`prefer`] implements the deterministic provider-preference rules.
//! - [`action_driver`] is the per-action state machine.
//! - [`context`] is the `BuildContext` actions call back into.
//! - [`reset`] implements the invalidation cascade that re-runs everything
//!   affected by a superseded provider.
//!
//! Everything runs on a single cooperative event loop: the driver drains one
//! event at a time, and parallelism comes only from actions parking external
//! work whose completion re-enters the loop.

mod action_driver;
mod context;
mod prefer;
mod reset;
mod tables;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::action::ActionFactory;
use crate::dashboard::{Dashboard, TaskState, TaskStyle};
use crate::errors::DriverError;
use crate::event::{self, DriverEvent, DriverHandle, EventReceiver, EventSender};
use crate::fs::{file, ContentHash, File};
use crate::tag::Tag;

use action_driver::{ActionDriver, ActionState};
use tables::{DependencyTable, TagTable};

/// Stable id of an action within the driver's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// Stable id of a provision within the driver's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProvisionId(u64);

impl fmt::Display for ProvisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// A file registered (or about to be registered) under one or more tags.
///
/// Each registration creates a fresh provision; two provisions may refer to
/// equal files and still be distinct rows in the tables.
pub(crate) struct Provision {
    pub file: File,
    /// Captured at registration time; absent until then.
    pub content_hash: ContentHash,
    /// Tags declared by whoever produced this provision.
    pub tags: Vec<Tag>,
}

/// Owner of the tag index, the dependency graph, and every action.
///
/// Construct it, add factories, then either [`Driver::run`] it on a tokio
/// runtime or drive it manually with [`Driver::start`] + [`Driver::pump`].
pub struct Driver {
    tx: EventSender,
    rx: EventReceiver,
    dashboard: Box<dyn Dashboard>,
    src: File,
    tmp: File,
    max_concurrent_actions: usize,

    actions: HashMap<ActionId, ActionDriver>,
    provisions: HashMap<ProvisionId, Provision>,
    root_provisions: Vec<ProvisionId>,

    tag_table: TagTable,
    dependency_table: DependencyTable,
    /// Tag → indices into `factories`.
    triggers: HashMap<Tag, Vec<usize>>,
    /// Triggering provision → actions spawned because it existed.
    actions_by_trigger: HashMap<ProvisionId, Vec<ActionId>>,
    factories: Vec<Box<dyn ActionFactory>>,

    pending_actions: VecDeque<ActionId>,
    active_actions: Vec<ActionId>,
    completed_actions: HashSet<ActionId>,

    next_action: u64,
    next_provision: u64,
}

impl Driver {
    /// Create a driver over a source tree and a temp tree. The temp tree is
    /// created if missing; the source tree must exist.
    pub fn new(
        dashboard: Box<dyn Dashboard>,
        src_root: impl Into<PathBuf>,
        tmp_root: impl Into<PathBuf>,
        max_concurrent_actions: usize,
    ) -> Result<Self> {
        let src = File::tree_root(src_root);
        if !src.is_directory() {
            bail!("source tree {:?} is not a directory", src.full_path());
        }
        let tmp = File::tree_root(tmp_root);
        if !tmp.exists() {
            tmp.create_directory()
                .with_context(|| format!("creating temp tree {:?}", tmp.full_path()))?;
        }

        let (tx, rx) = event::channel();
        Ok(Driver {
            tx,
            rx,
            dashboard,
            src,
            tmp,
            max_concurrent_actions: max_concurrent_actions.max(1),
            actions: HashMap::new(),
            provisions: HashMap::new(),
            root_provisions: Vec::new(),
            tag_table: TagTable::default(),
            dependency_table: DependencyTable::default(),
            triggers: HashMap::new(),
            actions_by_trigger: HashMap::new(),
            factories: Vec::new(),
            pending_actions: VecDeque::new(),
            active_actions: Vec::new(),
            completed_actions: HashSet::new(),
            next_action: 0,
            next_provision: 0,
        })
    }

    /// Handle for feeding events into a running driver (watcher, signals).
    pub fn handle(&self) -> DriverHandle {
        DriverHandle {
            tx: self.tx.clone(),
        }
    }

    /// Register a factory: its trigger tags are indexed so future provisions
    /// carrying those tags are offered to it.
    pub fn add_action_factory(&mut self, factory: Box<dyn ActionFactory>) {
        self.adopt_factory(factory);
    }

    pub(crate) fn adopt_factory(&mut self, factory: Box<dyn ActionFactory>) -> usize {
        let idx = self.factories.len();
        self.factories.push(factory);
        for tag in self.factories[idx].trigger_tags() {
            debug!(tag = %tag, factory = idx, "registered trigger");
            self.triggers.entry(tag).or_default().push(idx);
        }
        idx
    }

    /// Offer existing provisions to a factory registered after the scan.
    pub(crate) fn rescan_for_new_factory(&mut self, idx: usize) -> Result<()> {
        for tag in self.factories[idx].trigger_tags() {
            let candidates: Vec<ProvisionId> = self.tag_table.providers(&tag).to_vec();
            for p in candidates {
                let Some(pr) = self.provisions.get(&p) else {
                    continue;
                };
                let file = pr.file.clone();
                if let Some(action) = self.factories[idx].try_make_action(&tag, &file) {
                    self.queue_new_action(action, p)?;
                }
            }
        }
        Ok(())
    }

    /// Scan the source tree and begin running actions.
    pub fn start(&mut self) -> Result<()> {
        info!(src = %self.src.full_path().display(), "scanning source tree");
        self.scan_source_tree()?;
        self.start_some_actions()
    }

    /// Drain and handle every event currently queued. Tests use this to step
    /// the loop deterministically without a runtime.
    pub fn pump(&mut self) -> Result<()> {
        while let Ok(event) = self.rx.try_recv() {
            if !self.handle_event(event)? {
                break;
            }
        }
        Ok(())
    }

    /// Main event loop. With `exit_when_idle`, returns once no actions are
    /// pending or active and the queue is drained; otherwise runs until
    /// shutdown is requested.
    pub async fn run(&mut self, exit_when_idle: bool) -> Result<()> {
        loop {
            while let Ok(event) = self.rx.try_recv() {
                if !self.handle_event(event)? {
                    return Ok(());
                }
            }
            if exit_when_idle && self.is_idle() {
                info!("driver idle, exiting");
                return Ok(());
            }
            match self.rx.recv().await {
                Some(event) => {
                    if !self.handle_event(event)? {
                        return Ok(());
                    }
                }
                None => return Ok(()),
            }
        }
    }

    /// True when no action is pending or active. Completed (including
    /// blocked) actions don't count; they only wake up via invalidation.
    pub fn is_idle(&self) -> bool {
        self.pending_actions.is_empty() && self.active_actions.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending_actions.len()
    }

    pub fn active_count(&self) -> usize {
        self.active_actions.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed_actions.len()
    }

    /// Total live actions across pending, active and completed.
    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Current providers registered under `tag`, in registration order.
    pub fn providers(&self, tag: &Tag) -> Vec<File> {
        self.tag_table
            .providers(tag)
            .iter()
            .filter_map(|p| self.provisions.get(p))
            .map(|pr| pr.file.clone())
            .collect()
    }

    /// Returns false when the loop should stop.
    pub(crate) fn handle_event(&mut self, event: DriverEvent) -> Result<bool> {
        match event {
            DriverEvent::Callback(cb) => {
                self.handle_callback(cb)?;
                Ok(true)
            }
            DriverEvent::SourceChanged { path } => {
                self.handle_source_changed(&path)?;
                Ok(true)
            }
            DriverEvent::Shutdown => {
                info!("shutdown requested, stopping driver");
                Ok(false)
            }
        }
    }

    /// Walk the source tree; every regular file becomes a root provision
    /// carrying the default tag.
    fn scan_source_tree(&mut self) -> Result<()> {
        for found in file::walk_files(&self.src)? {
            let p = self.new_provision(found, vec![Tag::default_tag()]);
            self.register_provider(p)?;
            self.root_provisions.push(p);
        }
        debug!(
            provisions = self.root_provisions.len(),
            "source scan complete"
        );
        Ok(())
    }

    pub(crate) fn new_provision(&mut self, file: File, tags: Vec<Tag>) -> ProvisionId {
        let p = ProvisionId(self.next_provision);
        self.next_provision += 1;
        self.provisions.insert(
            p,
            Provision {
                file,
                content_hash: ContentHash::absent(),
                tags,
            },
        );
        p
    }

    /// Make a provision findable: capture its content hash, then for each of
    /// its tags (in declaration order) index it, reset lookups the new row
    /// supersedes, and fire factory triggers.
    pub(crate) fn register_provider(&mut self, p: ProvisionId) -> Result<()> {
        let hash = {
            let pr = self
                .provisions
                .get(&p)
                .ok_or_else(|| DriverError::invariant(format!("registering unknown provision {p}")))?;
            match pr.file.content_hash() {
                Ok(h) => h,
                Err(err) => {
                    warn!(path = %pr.file.canonical_name(), error = %err, "hashing provider failed");
                    ContentHash::absent()
                }
            }
        };
        let tags = {
            let pr = self
                .provisions
                .get_mut(&p)
                .ok_or_else(|| DriverError::invariant(format!("registering unknown provision {p}")))?;
            pr.content_hash = hash;
            pr.tags.clone()
        };

        for tag in tags {
            debug!(tag = %tag, provision = %p, "registering provider");
            self.tag_table.add(tag.clone(), p);
            self.reset_dependent_actions(&tag)?;
            self.fire_triggers(&tag, p)?;
        }
        Ok(())
    }

    /// Offer a freshly registered provision to every factory watching `tag`.
    fn fire_triggers(&mut self, tag: &Tag, p: ProvisionId) -> Result<()> {
        let factory_ids = self.triggers.get(tag).cloned().unwrap_or_default();
        if factory_ids.is_empty() {
            return Ok(());
        }
        let file = {
            let Some(pr) = self.provisions.get(&p) else {
                return Ok(());
            };
            pr.file.clone()
        };
        for idx in factory_ids {
            if let Some(action) = self.factories[idx].try_make_action(tag, &file) {
                self.queue_new_action(action, p)?;
            }
        }
        Ok(())
    }

    /// Wrap a new action and queue it at the front: actions triggered
    /// together tend to touch the same files, so running them near each other
    /// keeps caches warm.
    pub(crate) fn queue_new_action(
        &mut self,
        action: Box<dyn crate::action::Action>,
        trigger: ProvisionId,
    ) -> Result<()> {
        let (file, hash) = {
            let pr = self.provisions.get(&trigger).ok_or_else(|| {
                DriverError::invariant(format!("queueing action for unknown provision {trigger}"))
            })?;
            (pr.file.clone(), pr.content_hash)
        };

        let style = if action.is_silent() {
            TaskStyle::Silent
        } else {
            TaskStyle::Normal
        };
        let task = self
            .dashboard
            .begin_task(action.verb(), file.canonical_name(), style);

        let id = ActionId(self.next_action);
        self.next_action += 1;
        debug!(action = %id, noun = %file.canonical_name(), "queued action");

        self.actions
            .insert(id, ActionDriver::new(action, file, hash, task));
        self.actions_by_trigger.entry(trigger).or_default().push(id);
        self.pending_actions.push_front(id);
        Ok(())
    }

    /// Refill the active set from the front of the pending queue, up to the
    /// concurrency bound.
    pub(crate) fn start_some_actions(&mut self) -> Result<()> {
        while self.active_actions.len() < self.max_concurrent_actions {
            let Some(id) = self.pending_actions.pop_front() else {
                break;
            };
            self.active_actions.push(id);
            self.start_action(id)?;
        }
        Ok(())
    }

    pub(crate) fn choose_preferred_provider(
        &self,
        tag: &Tag,
        src_name: &str,
    ) -> Option<ProvisionId> {
        prefer::choose_preferred(
            src_name,
            self.tag_table
                .providers(tag)
                .iter()
                .filter_map(|p| self.provisions.get(p).map(|pr| (*p, pr.file.canonical_name()))),
        )
    }

    /// A source-tree path changed on disk: tear down its old provision (if
    /// its content actually changed) and register the file afresh.
    fn handle_source_changed(&mut self, path: &Path) -> Result<()> {
        let rel = if path.is_absolute() {
            let root = self.src.full_path();
            let root = root.canonicalize().unwrap_or(root);
            match file::canonical_name_under(&root, path) {
                Some(rel) => rel,
                None => {
                    debug!(path = ?path, "change outside source tree, ignoring");
                    return Ok(());
                }
            }
        } else {
            path.to_string_lossy().replace('\\', "/")
        };

        let changed = self.src.relative(&rel)?;
        if changed.is_directory() {
            return Ok(());
        }

        let existing = self.root_provisions.iter().position(|p| {
            self.provisions
                .get(p)
                .is_some_and(|pr| pr.file.canonical_name() == rel)
        });

        if let Some(pos) = existing {
            let p = self.root_provisions[pos];
            if changed.exists() {
                let unchanged = self
                    .provisions
                    .get(&p)
                    .zip(changed.content_hash().ok())
                    .is_some_and(|(pr, h)| !h.is_absent() && h == pr.content_hash);
                if unchanged {
                    debug!(path = %rel, "content unchanged, ignoring");
                    return Ok(());
                }
            }
            info!(path = %rel, "source file changed, invalidating");
            self.root_provisions.remove(pos);
            self.invalidate_provision(p)?;
        }

        if changed.exists() {
            let p = self.new_provision(changed, vec![Tag::default_tag()]);
            self.register_provider(p)?;
            self.root_provisions.push(p);
        }

        self.start_some_actions()
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        // A build that ends with blocked actions ends with failed actions:
        // their dependencies never arrived.
        let completed: Vec<ActionId> = self.completed_actions.iter().copied().collect();
        for id in completed {
            if let Some(d) = self.actions.get_mut(&id) {
                if d.state == ActionState::Failed {
                    d.task.set_state(TaskState::Failed);
                }
            }
        }
    }
}
