// tests/scenarios.rs

//! End-to-end driver lifecycle: scanning, triggering, completion reporting,
//! and the terminal-transition rules actions must obey.

mod common;

use std::error::Error;
use std::sync::Arc;

use anyhow::Result as AnyResult;
use common::{
    make_tree, FnFactory, PassAction, RecordingDashboard, SeenProviders, TagAction, TaskLog,
};
use tagdag::action::{Action, BuildContext};
use tagdag::driver::Driver;
use tagdag::event::EventGroup;
use tagdag::fs::File;
use tagdag::tag::Tag;

type TestResult = Result<(), Box<dyn Error>>;

fn driver_over(
    files: &[&str],
    log: &TaskLog,
    jobs: usize,
) -> Result<(tempfile::TempDir, Driver), Box<dyn Error>> {
    let td = tempfile::tempdir()?;
    let src = td.path().join("src");
    make_tree(&src, files);
    let driver = Driver::new(
        Box::new(RecordingDashboard::new(log.clone())),
        src,
        td.path().join("tmp"),
        jobs,
    )?;
    Ok((td, driver))
}

#[test]
fn scan_registers_default_tag_and_stays_idle_without_factories() -> TestResult {
    let log = TaskLog::default();
    let (_td, mut driver) = driver_over(&["a.txt"], &log, 1)?;

    driver.start()?;
    driver.pump()?;

    let providers = driver.providers(&Tag::default_tag());
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0].canonical_name(), "a.txt");

    assert_eq!(driver.pending_count(), 0);
    assert_eq!(driver.active_count(), 0);
    assert_eq!(driver.action_count(), 0);
    assert!(driver.is_idle());
    Ok(())
}

#[test]
fn single_factory_runs_one_action_to_passed() -> TestResult {
    let log = TaskLog::default();
    let (_td, mut driver) = driver_over(&["a.txt"], &log, 1)?;
    driver.add_action_factory(Box::new(FnFactory::new(
        vec![Tag::default_tag()],
        |_tag, _file| Some(Box::new(PassAction)),
    )));

    driver.start()?;
    driver.pump()?;

    assert!(driver.is_idle());
    assert_eq!(driver.completed_count(), 1);
    assert_eq!(
        log.for_noun("a.txt"),
        vec![
            "noop a.txt: opened",
            "noop a.txt: running",
            "noop a.txt: passed",
        ]
    );
    Ok(())
}

struct FailAfterPass;

impl Action for FailAfterPass {
    fn verb(&self) -> &str {
        "confused"
    }

    fn start(&mut self, _group: &mut EventGroup, ctx: &mut dyn BuildContext) -> AnyResult<()> {
        ctx.passed()?;
        ctx.failed()?;
        Ok(())
    }
}

#[test]
fn failing_after_passing_is_an_error_and_blocks_the_action() -> TestResult {
    let log = TaskLog::default();
    let (_td, mut driver) = driver_over(&["a.txt"], &log, 1)?;
    driver.add_action_factory(Box::new(FnFactory::new(
        vec![Tag::default_tag()],
        |_tag, _file| Some(Box::new(FailAfterPass)),
    )));

    driver.start()?;
    driver.pump()?;

    assert_eq!(driver.completed_count(), 1);
    let lines = log.for_noun("a.txt");
    assert!(lines
        .iter()
        .any(|l| l.contains("bad terminal transition")));
    assert!(lines.iter().any(|l| l.ends_with("blocked")));
    assert!(!lines.iter().any(|l| l.ends_with("passed")));
    Ok(())
}

struct FirstFailureWins;

impl Action for FirstFailureWins {
    fn verb(&self) -> &str {
        "flaky"
    }

    fn start(&mut self, _group: &mut EventGroup, ctx: &mut dyn BuildContext) -> AnyResult<()> {
        ctx.failed()?;
        // Both of these must be ignored.
        ctx.passed()?;
        ctx.failed()?;
        Ok(())
    }
}

#[test]
fn first_failure_wins_and_driver_drop_finalizes_failed() -> TestResult {
    let log = TaskLog::default();
    let (_td, mut driver) = driver_over(&["a.txt"], &log, 1)?;
    driver.add_action_factory(Box::new(FnFactory::new(
        vec![Tag::default_tag()],
        |_tag, _file| Some(Box::new(FirstFailureWins)),
    )));

    driver.start()?;
    driver.pump()?;

    assert_eq!(driver.completed_count(), 1);
    let lines = log.for_noun("a.txt");
    assert!(lines.iter().any(|l| l.ends_with("blocked")));
    assert!(!lines.iter().any(|l| l.ends_with("passed")));

    // Dropping the driver turns every still-blocked action into a failure:
    // its dependencies are never going to arrive now.
    drop(driver);
    assert!(log
        .for_noun("a.txt")
        .iter()
        .any(|l| l.ends_with("failed")));
    Ok(())
}

struct ProvideTwice {
    file: File,
}

impl Action for ProvideTwice {
    fn verb(&self) -> &str {
        "tagtwice"
    }

    fn start(&mut self, _group: &mut EventGroup, ctx: &mut dyn BuildContext) -> AnyResult<()> {
        ctx.provide(self.file.clone(), vec![Tag::new("alpha")])?;
        ctx.provide(self.file.clone(), vec![Tag::new("beta"), Tag::new("alpha")])?;
        ctx.passed()
    }
}

#[test]
fn repeated_provide_unions_tags_on_one_provision() -> TestResult {
    let log = TaskLog::default();
    let (_td, mut driver) = driver_over(&["a.txt"], &log, 1)?;
    driver.add_action_factory(Box::new(FnFactory::new(
        vec![Tag::default_tag()],
        |_tag, file| {
            Some(Box::new(ProvideTwice {
                file: file.clone(),
            }))
        },
    )));

    driver.start()?;
    driver.pump()?;

    let alpha = driver.providers(&Tag::new("alpha"));
    let beta = driver.providers(&Tag::new("beta"));
    assert_eq!(alpha.len(), 1);
    assert_eq!(beta.len(), 1);
    assert_eq!(alpha[0].canonical_name(), "a.txt");
    assert_eq!(alpha[0], beta[0]);
    Ok(())
}

struct FindInputAction {
    seen: SeenProviders,
}

impl Action for FindInputAction {
    fn verb(&self) -> &str {
        "use"
    }

    fn start(&mut self, _group: &mut EventGroup, ctx: &mut dyn BuildContext) -> AnyResult<()> {
        let found = ctx.find_input("a.h")?;
        self.seen
            .lock()
            .unwrap()
            .push(found.map(|f| f.canonical_name().to_string()));
        ctx.passed()
    }
}

#[test]
fn find_input_resolves_through_file_path_tags() -> TestResult {
    let log = TaskLog::default();
    let (_td, mut driver) = driver_over(&["inc/a.h", "use.cpp"], &log, 1)?;

    // Header files are indexed under their base name, the way an indexing
    // action would publish them for inclusion lookups.
    driver.add_action_factory(Box::new(FnFactory::new(
        vec![Tag::default_tag()],
        |_tag, file| {
            if !file.canonical_name().ends_with(".h") {
                return None;
            }
            let base = file.canonical_name().rsplit('/').next()?.to_string();
            Some(Box::new(TagAction {
                file: file.clone(),
                tags: vec![Tag::from_file(&base)],
            }))
        },
    )));
    let seen: SeenProviders = Default::default();
    {
        let seen = Arc::clone(&seen);
        driver.add_action_factory(Box::new(FnFactory::new(
            vec![Tag::default_tag()],
            move |_tag, file| {
                if !file.canonical_name().ends_with(".cpp") {
                    return None;
                }
                Some(Box::new(FindInputAction {
                    seen: Arc::clone(&seen),
                }))
            },
        )));
    }

    driver.start()?;
    driver.pump()?;

    assert!(driver.is_idle());
    assert_eq!(
        seen.lock().unwrap().last().cloned().flatten().as_deref(),
        Some("inc/a.h")
    );
    Ok(())
}

#[test]
fn concurrency_bound_caps_active_actions() -> TestResult {
    let log = TaskLog::default();
    let (_td, mut driver) = driver_over(&["a.txt", "b.txt", "c.txt", "d.txt"], &log, 2)?;
    driver.add_action_factory(Box::new(FnFactory::new(
        vec![Tag::default_tag()],
        |_tag, _file| Some(Box::new(PassAction)),
    )));

    // start() promotes at most two actions; the rest stay queued until the
    // loop runs their completions.
    driver.start()?;
    assert_eq!(driver.active_count(), 2);
    assert_eq!(driver.pending_count(), 2);

    driver.pump()?;
    assert!(driver.is_idle());
    assert_eq!(driver.completed_count(), 4);
    Ok(())
}
