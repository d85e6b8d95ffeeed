// src/event.rs

//! Event plumbing for the driver's single-threaded cooperative loop.
//!
//! All table mutation happens while handling one event at a time; actions
//! achieve parallelism by parking async work (subprocesses, timers) whose
//! completion re-enters the loop as another event. Within one event handler
//! the driver's state moves from one consistent snapshot to the next with no
//! interleaving.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::action::{Action, BuildContext};
use crate::driver::ActionId;

/// A continuation scheduled on behalf of an action. It runs on the driver
/// loop with access to the action object and its build context.
pub type ActionCallback =
    Box<dyn FnOnce(&mut dyn Action, &mut EventGroup, &mut dyn BuildContext) -> Result<()> + Send>;

/// Events consumed by the driver loop.
pub(crate) enum DriverEvent {
    Callback(QueuedCallback),
    SourceChanged { path: PathBuf },
    Shutdown,
}

pub(crate) struct QueuedCallback {
    pub cancelled: Arc<AtomicBool>,
    pub kind: CallbackKind,
}

pub(crate) enum CallbackKind {
    /// Deferred invocation of `Action::start`.
    StartAction { action: ActionId, generation: u64 },
    /// Deferred post-completion bookkeeping for an action.
    ActionReturned { action: ActionId, generation: u64 },
    /// A continuation the action scheduled through its [`EventGroup`].
    Continue {
        action: ActionId,
        generation: u64,
        callback: ActionCallback,
    },
}

pub(crate) type EventSender = mpsc::UnboundedSender<DriverEvent>;
pub(crate) type EventReceiver = mpsc::UnboundedReceiver<DriverEvent>;

pub(crate) fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Enqueue a callback and hand back the cancellation handle for it.
pub(crate) fn schedule(tx: &EventSender, kind: CallbackKind) -> AsyncHandle {
    let cancelled = Arc::new(AtomicBool::new(false));
    let _ = tx.send(DriverEvent::Callback(QueuedCallback {
        cancelled: Arc::clone(&cancelled),
        kind,
    }));
    AsyncHandle {
        cancelled,
        abort: None,
    }
}

/// Handle to a scheduled callback or parked async operation.
///
/// Dropping the handle cancels the work: a not-yet-dispatched callback is
/// skipped, and a spawned future is aborted. An action that cancels its own
/// in-flight operation must still report an outcome (or schedule further
/// work), otherwise it never completes.
pub struct AsyncHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl Drop for AsyncHandle {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
    }
}

impl std::fmt::Debug for AsyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncHandle")
            .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
            .finish()
    }
}

/// The scheduling surface an action sees while one of its callbacks runs.
///
/// Everything scheduled here is attributed to the action: the driver counts
/// outstanding work and, once an action's last event has run without the
/// action reporting an outcome, completes it as DONE.
pub struct EventGroup {
    tx: EventSender,
    action: ActionId,
    generation: u64,
    scheduled: usize,
}

impl EventGroup {
    pub(crate) fn new(tx: EventSender, action: ActionId, generation: u64) -> Self {
        EventGroup {
            tx,
            action,
            generation,
            scheduled: 0,
        }
    }

    /// How many events this group scheduled during the current callback.
    pub(crate) fn scheduled_count(&self) -> usize {
        self.scheduled
    }

    /// Run `callback` on the next driver-loop turn.
    pub fn run_asynchronously(&mut self, callback: ActionCallback) -> AsyncHandle {
        self.scheduled += 1;
        schedule(
            &self.tx,
            CallbackKind::Continue {
                action: self.action,
                generation: self.generation,
                callback,
            },
        )
    }

    /// Drive `future` off the loop (subprocess, I/O, timer) and run
    /// `callback` with its output once it completes.
    pub fn run_on_completion<T, F, C>(&mut self, future: F, callback: C) -> AsyncHandle
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
        C: FnOnce(&mut dyn Action, &mut EventGroup, &mut dyn BuildContext, T) -> Result<()>
            + Send
            + 'static,
    {
        self.scheduled += 1;

        let cancelled = Arc::new(AtomicBool::new(false));
        let tx = self.tx.clone();
        let action = self.action;
        let generation = self.generation;
        let flag = Arc::clone(&cancelled);

        let join = tokio::spawn(async move {
            let value = future.await;
            let boxed: ActionCallback =
                Box::new(move |action, group, ctx| callback(action, group, ctx, value));
            let _ = tx.send(DriverEvent::Callback(QueuedCallback {
                cancelled: flag,
                kind: CallbackKind::Continue {
                    action,
                    generation,
                    callback: boxed,
                },
            }));
        });

        AsyncHandle {
            cancelled,
            abort: Some(join.abort_handle()),
        }
    }
}

/// Cheap, cloneable handle for feeding events into a running driver from
/// the outside (file watcher, signal handling).
#[derive(Clone)]
pub struct DriverHandle {
    pub(crate) tx: EventSender,
}

impl DriverHandle {
    /// Report that a path under the source tree changed on disk.
    pub fn notify_source_changed(&self, path: PathBuf) {
        let _ = self.tx.send(DriverEvent::SourceChanged { path });
    }

    /// Ask the driver loop to stop after the current event.
    pub fn request_shutdown(&self) {
        let _ = self.tx.send(DriverEvent::Shutdown);
    }
}

impl std::fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverHandle").finish()
    }
}
