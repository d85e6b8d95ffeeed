// src/watch.rs

//! File watching.
//!
//! Wires a cross-platform filesystem watcher (`notify`) onto the source tree
//! and forwards changed paths into the driver's event loop. The driver itself
//! decides whether a change is interesting (it compares content hashes and
//! ignores paths outside the tree), so this layer stays a thin bridge.

use std::path::PathBuf;

use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info};

use crate::event::DriverHandle;

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive
/// for as long as needed. Dropping this handle stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Spawn a filesystem watcher that observes `root` recursively and reports
/// every changed path to the driver.
pub fn spawn_watcher(root: impl Into<PathBuf>, driver: DriverHandle) -> Result<WatcherHandle> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or(root); // best-effort

    // The notify callback runs on the watcher's own thread; forwarding into
    // the driver is a plain unbounded send, so no bridging task is needed.
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                debug!(?event, "filesystem event");
                for path in event.paths {
                    driver.notify_source_changed(path);
                }
            }
            Err(err) => {
                eprintln!("tagdag: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!("file watcher started on {:?}", root);

    Ok(WatcherHandle { _inner: watcher })
}
