// src/driver/reset.rs

//! The reset cascade: returning actions to PENDING and transitively
//! invalidating everything that depended on what they produced.
//!
//! All loops here collect ids before mutating, because resets mutate the very
//! tables being scanned.

use anyhow::Result;
use tracing::{debug, error};

use crate::dashboard::TaskState;
use crate::driver::action_driver::ActionState;
use crate::driver::{ActionId, Driver, ProvisionId};
use crate::errors::DriverError;

impl Driver {
    /// Return an action to PENDING so it can be retried, and invalidate its
    /// outputs. A no-op on actions that are already pending or already torn
    /// down earlier in the same cascade.
    pub(crate) fn reset_action(&mut self, id: ActionId) -> Result<()> {
        let Some(d) = self.actions.get(&id) else {
            return Ok(());
        };
        if d.state == ActionState::Pending {
            return Ok(());
        }

        debug!(action = %id, "resetting action");
        if d.is_running {
            let d = self
                .actions
                .get_mut(&id)
                .ok_or_else(|| DriverError::invariant(format!("reset lost action {id}")))?;
            d.task.set_state(TaskState::Blocked);
            d.async_callback = None;
            d.generation += 1;
            d.pending_events = 0;
            d.is_running = false;

            let pos = self
                .active_actions
                .iter()
                .position(|a| *a == id)
                .ok_or_else(|| {
                    DriverError::invariant(format!("running action {id} missing from active set"))
                })?;
            self.active_actions.remove(pos);
        } else if !self.completed_actions.remove(&id) {
            return Err(DriverError::invariant(format!(
                "action {id} is neither running nor pending, but not completed either"
            ))
            .into());
        }

        if let Some(d) = self.actions.get_mut(&id) {
            d.state = ActionState::Pending;
        }
        // Back of the queue: actions that churn must not starve the rest, and
        // this action should re-run before the dependents reset below.
        self.pending_actions.push_back(id);

        self.invalidate_outputs(id)
    }

    /// Tear an action down completely: cancel it, detach it from whichever
    /// set holds it, cascade through its outputs, and delete it. Used for
    /// actions whose triggering provision disappeared; they must not linger
    /// in the pending queue the way a reset action does.
    pub(crate) fn drop_action(&mut self, id: ActionId) -> Result<()> {
        let was_running = {
            let Some(d) = self.actions.get_mut(&id) else {
                return Ok(());
            };
            d.generation += 1;
            d.pending_events = 0;
            d.async_callback = None;
            let was_running = d.is_running;
            d.is_running = false;
            was_running
        };

        debug!(action = %id, "dropping action with its trigger");
        if was_running {
            let pos = self
                .active_actions
                .iter()
                .position(|a| *a == id)
                .ok_or_else(|| {
                    DriverError::invariant(format!("running action {id} missing from active set"))
                })?;
            self.active_actions.remove(pos);
        } else if !self.completed_actions.remove(&id) {
            // Scan from the back; a pending action is usually near its
            // insertion point.
            let pos = self
                .pending_actions
                .iter()
                .rposition(|a| *a == id)
                .ok_or_else(|| {
                    DriverError::invariant(format!("dropped action {id} not found in any set"))
                })?;
            self.pending_actions.remove(pos);
        }

        self.invalidate_outputs(id)?;
        self.actions.remove(&id);
        Ok(())
    }

    /// Invalidate everything downstream of an action's provisions, then
    /// forget the provisions and outputs themselves.
    fn invalidate_outputs(&mut self, id: ActionId) -> Result<()> {
        let pids = {
            let d = self
                .actions
                .get_mut(&id)
                .ok_or_else(|| DriverError::invariant(format!("invalidating unknown action {id}")))?;
            std::mem::take(&mut d.provisions)
        };
        for p in pids {
            self.invalidate_provision(p)?;
        }

        self.dependency_table.erase_action(id);

        if let Some(d) = self.actions.get_mut(&id) {
            d.outputs.clear();
        }
        Ok(())
    }

    /// Remove one provision from the world: reset the actions that chose it,
    /// drop the actions it triggered, and erase it from every table.
    pub(crate) fn invalidate_provision(&mut self, p: ProvisionId) -> Result<()> {
        let dependents = self.dependency_table.actions_for_provision(p);
        for action in dependents {
            self.reset_action(action)?;
        }

        // Actions spawned because this provision existed disappear entirely.
        let spawned = self.actions_by_trigger.remove(&p).unwrap_or_default();
        for action in spawned {
            self.drop_action(action)?;
        }

        self.tag_table.erase_provision(p);
        let leftover = self.dependency_table.erase_provision(p);
        if leftover > 0 {
            error!(
                provision = %p,
                leftover,
                "resetting dependents should have cleared this provision from the dependency table"
            );
        }
        self.provisions.remove(&p);
        Ok(())
    }

    /// After a registration under `tag`, reset every action whose recorded
    /// lookup of `tag` would now resolve differently.
    pub(crate) fn reset_dependent_actions(&mut self, tag: &crate::tag::Tag) -> Result<()> {
        let mut to_reset = Vec::new();
        for (action, previous) in self.dependency_table.rows_for_tag(tag) {
            let Some(d) = self.actions.get(&action) else {
                continue;
            };
            let current =
                self.choose_preferred_provider(tag, d.src_file.canonical_name());
            if current != previous {
                to_reset.push(action);
            }
        }
        for action in to_reset {
            self.reset_action(action)?;
        }
        Ok(())
    }
}
