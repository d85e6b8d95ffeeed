// src/driver/action_driver.rs

use std::sync::atomic::Ordering;

use anyhow::Result;
use tracing::{debug, warn};

use crate::action::Action;
use crate::dashboard::{DashboardTask, TaskState};
use crate::driver::context::BuildCtx;
use crate::driver::{ActionId, Driver};
use crate::errors::DriverError;
use crate::event::{self, AsyncHandle, CallbackKind, EventGroup, QueuedCallback};
use crate::fs::{ContentHash, File};

/// Lifecycle of one action.
///
/// Terminal-ness and running-ness are tracked separately: `passed()` moves
/// the state to `Passed` immediately, but the action stays "running" (and may
/// still log) until the deferred completion callback flips
/// [`ActionDriver::is_running`] and registers its outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActionState {
    Pending,
    Running,
    /// Ran out of events without reporting an outcome.
    Done,
    Passed,
    Failed,
}

/// Driver-side record for one action: the opaque action object, where it came
/// from, its dashboard task, and everything it has produced so far.
pub(crate) struct ActionDriver {
    /// Taken out while one of the action's callbacks runs on the loop.
    pub action: Option<Box<dyn Action>>,
    /// The file whose registration created this action.
    pub src_file: File,
    pub src_hash: ContentHash,
    pub task: Box<dyn DashboardTask>,
    pub state: ActionState,
    pub is_running: bool,
    /// Bumped to invalidate every event scheduled on this action's behalf.
    pub generation: u64,
    /// Outstanding events attributed to this action's event group.
    pub pending_events: usize,
    /// Slot for the driver-scheduled start/done callback; replacing or
    /// clearing it cancels the queued callback.
    pub async_callback: Option<AsyncHandle>,
    /// Files allocated through `new_output`.
    pub outputs: Vec<File>,
    /// Provisions this action declared, owned until reset or teardown.
    pub provisions: Vec<super::ProvisionId>,
}

impl ActionDriver {
    pub fn new(
        action: Box<dyn Action>,
        src_file: File,
        src_hash: ContentHash,
        task: Box<dyn DashboardTask>,
    ) -> Self {
        ActionDriver {
            action: Some(action),
            src_file,
            src_hash,
            task,
            state: ActionState::Pending,
            is_running: false,
            generation: 0,
            pending_events: 0,
            async_callback: None,
            outputs: Vec::new(),
            provisions: Vec::new(),
        }
    }
}

enum CallbackBody {
    Start,
    Continue(crate::event::ActionCallback),
}

impl Driver {
    /// Promote a pending action to RUNNING and schedule its start callback.
    pub(crate) fn start_action(&mut self, id: ActionId) -> Result<()> {
        if self.dependency_table.has_action(id) {
            return Err(DriverError::invariant(format!(
                "action {id} has dependency rows before starting"
            ))
            .into());
        }

        let tx = self.tx.clone();
        let d = self
            .actions
            .get_mut(&id)
            .ok_or_else(|| DriverError::invariant(format!("starting unknown action {id}")))?;
        if d.state != ActionState::Pending {
            return Err(DriverError::invariant(format!(
                "starting action {id} that is not pending"
            ))
            .into());
        }
        debug_assert!(!d.is_running);
        debug_assert!(d.outputs.is_empty() && d.provisions.is_empty());

        debug!(action = %id, "action starting");
        d.state = ActionState::Running;
        d.is_running = true;
        d.pending_events = 1;
        d.task.set_state(TaskState::Running);
        d.async_callback = Some(event::schedule(
            &tx,
            CallbackKind::StartAction {
                action: id,
                generation: d.generation,
            },
        ));
        Ok(())
    }

    pub(crate) fn handle_callback(&mut self, cb: QueuedCallback) -> Result<()> {
        let cancelled = cb.cancelled.load(Ordering::Relaxed);
        match cb.kind {
            CallbackKind::StartAction { action, generation } => {
                self.dispatch_action_callback(action, generation, cancelled, CallbackBody::Start)
            }
            CallbackKind::Continue {
                action,
                generation,
                callback,
            } => self.dispatch_action_callback(
                action,
                generation,
                cancelled,
                CallbackBody::Continue(callback),
            ),
            CallbackKind::ActionReturned { action, generation } => {
                if cancelled {
                    return Ok(());
                }
                match self.actions.get(&action) {
                    Some(d) if d.generation == generation => {}
                    _ => return Ok(()),
                }
                self.action_returned(action)?;
                self.start_some_actions()
            }
        }
    }

    /// Run one callback attributed to an action's event group.
    fn dispatch_action_callback(
        &mut self,
        id: ActionId,
        generation: u64,
        cancelled: bool,
        body: CallbackBody,
    ) -> Result<()> {
        {
            let Some(d) = self.actions.get_mut(&id) else {
                return Ok(());
            };
            if d.generation != generation {
                return Ok(());
            }
            d.pending_events = d.pending_events.saturating_sub(1);
        }
        if cancelled {
            // The work never runs, but its slot in the group is spent.
            return self.maybe_no_more_events(id);
        }

        let is_start = matches!(body, CallbackBody::Start);
        let mut action = {
            let Some(d) = self.actions.get_mut(&id) else {
                return Ok(());
            };
            if !d.is_running {
                warn!(action = %id, "dropping callback for an action that is no longer running");
                return Ok(());
            }
            if is_start {
                d.async_callback = None;
            }
            d.action.take().ok_or_else(|| {
                DriverError::invariant(format!("action object for {id} is already checked out"))
            })?
        };

        let mut group = EventGroup::new(self.tx.clone(), id, generation);
        let result = {
            let mut ctx = BuildCtx { driver: self, id };
            match body {
                CallbackBody::Start => action.start(&mut group, &mut ctx),
                CallbackBody::Continue(f) => f(action.as_mut(), &mut group, &mut ctx),
            }
        };

        let scheduled = group.scheduled_count();
        if let Some(d) = self.actions.get_mut(&id) {
            d.action = Some(action);
            if d.generation == generation {
                d.pending_events += scheduled;
            }
        }

        match result {
            Ok(()) => self.maybe_no_more_events(id),
            Err(err) => self.action_error(id, err),
        }
    }

    /// Complete a running action as DONE once its event group has drained
    /// without a reported outcome.
    fn maybe_no_more_events(&mut self, id: ActionId) -> Result<()> {
        let drained = self.actions.get(&id).is_some_and(|d| {
            d.is_running && d.state == ActionState::Running && d.pending_events == 0
        });
        if drained {
            if let Some(d) = self.actions.get_mut(&id) {
                debug!(action = %id, "no more events; completing as done");
                d.state = ActionState::Done;
            }
            self.queue_done_callback(id)?;
        }
        Ok(())
    }

    /// Defer completion bookkeeping to the next loop turn so the action's
    /// remaining callbacks in this turn still see it running.
    pub(crate) fn queue_done_callback(&mut self, id: ActionId) -> Result<()> {
        let tx = self.tx.clone();
        let d = self
            .actions
            .get_mut(&id)
            .ok_or_else(|| DriverError::invariant(format!("queueing done for unknown action {id}")))?;
        d.async_callback = Some(event::schedule(
            &tx,
            CallbackKind::ActionReturned {
                action: id,
                generation: d.generation,
            },
        ));
        Ok(())
    }

    /// The deferred completion callback: detach from the active set, then
    /// either discard everything (failure) or register the surviving outputs
    /// as providers.
    pub(crate) fn action_returned(&mut self, id: ActionId) -> Result<()> {
        let state = {
            let d = self.actions.get_mut(&id).ok_or_else(|| {
                DriverError::invariant(format!("completion for unknown action {id}"))
            })?;
            if !d.is_running {
                return Err(DriverError::invariant(format!(
                    "completion for action {id} that is not running"
                ))
                .into());
            }
            // Cancel anything still scheduled on the action's behalf.
            d.generation += 1;
            d.pending_events = 0;
            d.async_callback = None;
            d.is_running = false;
            d.state
        };

        let pos = self
            .active_actions
            .iter()
            .position(|a| *a == id)
            .ok_or_else(|| {
                DriverError::invariant(format!("completed action {id} missing from active set"))
            })?;
        self.active_actions.remove(pos);
        self.completed_actions.insert(id);

        if state == ActionState::Failed {
            // Failed, possibly on a missing dependency. Forget everything it
            // made; a later reset gives it a clean slate.
            let pids = {
                let d = self.actions.get_mut(&id).ok_or_else(|| {
                    DriverError::invariant(format!("completion lost action {id}"))
                })?;
                d.outputs.clear();
                d.task.set_state(TaskState::Blocked);
                std::mem::take(&mut d.provisions)
            };
            for p in pids {
                self.provisions.remove(&p);
            }
            debug!(action = %id, "action failed; holding as blocked");
        } else {
            let pids = {
                let d = self.actions.get_mut(&id).ok_or_else(|| {
                    DriverError::invariant(format!("completion lost action {id}"))
                })?;
                d.task.set_state(if state == ActionState::Passed {
                    TaskState::Passed
                } else {
                    TaskState::Done
                });
                std::mem::take(&mut d.provisions)
            };

            // Some actions create files and delete them again before
            // finishing; only surviving files become providers.
            let mut live = Vec::with_capacity(pids.len());
            for p in pids {
                let exists = self
                    .provisions
                    .get(&p)
                    .is_some_and(|pr| pr.file.exists());
                if exists {
                    live.push(p);
                } else {
                    self.provisions.remove(&p);
                }
            }
            if let Some(d) = self.actions.get_mut(&id) {
                d.provisions = live.clone();
            }
            for p in live {
                self.register_provider(p)?;
            }
        }
        Ok(())
    }

    /// Failure path for an error raised out of one of the action's callbacks:
    /// record it, mark the action failed, and complete synchronously rather
    /// than through the deferred done callback.
    pub(crate) fn action_error(&mut self, id: ActionId, err: anyhow::Error) -> Result<()> {
        warn!(action = %id, error = %err, "action raised an error");
        {
            let Some(d) = self.actions.get_mut(&id) else {
                return Ok(());
            };
            if !d.is_running {
                return Err(DriverError::invariant(format!(
                    "error from action {id} that is not running"
                ))
                .into());
            }
            d.task.add_output(&format!("error: {err:#}"));
            d.async_callback = None;
            d.state = ActionState::Failed;
        }
        self.action_returned(id)?;
        self.start_some_actions()
    }
}
