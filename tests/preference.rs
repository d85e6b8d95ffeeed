// tests/preference.rs

//! Provider preference: when several files carry the same tag, lookups must
//! pick the same winner deterministically, preferring providers close to the
//! requesting file, then shallow, then lexicographically smallest.

mod common;

use std::error::Error;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use common::{
    last_seen, lookup, make_tree, tagger, RecordingDashboard, SeenProviders, TaskLog,
};
use tagdag::driver::Driver;
use tagdag::tag::Tag;

type TestResult = Result<(), Box<dyn Error>>;

/// Build a driver over `files`, tag every `.h` file with `header`, and have
/// every `.cpp` file look `header` up. Returns what the lookup saw last.
fn run_lookup(files: &[&str]) -> Result<Option<String>, Box<dyn Error>> {
    let td = tempfile::tempdir()?;
    let src = td.path().join("src");
    make_tree(&src, files);

    let seen: SeenProviders = Default::default();
    let runs = Arc::new(AtomicUsize::new(0));

    let log = TaskLog::default();
    let mut driver = Driver::new(
        Box::new(RecordingDashboard::new(log)),
        src,
        td.path().join("tmp"),
        2,
    )?;
    driver.add_action_factory(Box::new(tagger(".h", vec![Tag::new("header")])));
    driver.add_action_factory(Box::new(lookup(
        ".cpp",
        Tag::new("header"),
        Arc::clone(&seen),
        runs,
    )));

    driver.start()?;
    driver.pump()?;
    assert!(driver.is_idle());

    Ok(last_seen(&seen))
}

#[test]
fn provider_in_same_directory_wins() -> TestResult {
    // foo/a.h shares the prefix "foo/" with the requesting foo/x.cpp;
    // bar/a.h shares nothing.
    let seen = run_lookup(&["foo/a.h", "bar/a.h", "foo/x.cpp"])?;
    assert_eq!(seen.as_deref(), Some("foo/a.h"));
    Ok(())
}

#[test]
fn shallower_provider_wins_on_prefix_tie() -> TestResult {
    // Neither candidate shares a prefix with other.cpp; a.h is less nested.
    let seen = run_lookup(&["a.h", "dir/a.h", "other.cpp"])?;
    assert_eq!(seen.as_deref(), Some("a.h"));
    Ok(())
}

#[test]
fn lexicographically_smallest_wins_on_full_tie() -> TestResult {
    let seen = run_lookup(&["x/a.h", "y/a.h", "z.cpp"])?;
    assert_eq!(seen.as_deref(), Some("x/a.h"));
    Ok(())
}

#[test]
fn preference_is_deterministic_across_builds() -> TestResult {
    let files = &["m/one.h", "n/two.h", "use.cpp"];
    let first = run_lookup(files)?;
    let second = run_lookup(files)?;
    assert!(first.is_some());
    assert_eq!(first, second);
    Ok(())
}
