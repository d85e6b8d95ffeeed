// src/driver/context.rs

use anyhow::Result;

use crate::action::{ActionFactory, BuildContext};
use crate::driver::action_driver::ActionState;
use crate::driver::{ActionId, Driver, Provision, ProvisionId};
use crate::errors::DriverError;
use crate::fs::{ContentHash, File};
use crate::tag::Tag;

/// The [`BuildContext`] handed to an action while one of its callbacks runs.
///
/// Borrows the driver for the duration of the callback; all table access goes
/// through the arena by id.
pub(crate) struct BuildCtx<'a> {
    pub driver: &'a mut Driver,
    pub id: ActionId,
}

impl BuildCtx<'_> {
    fn ensure_running(&self) -> Result<()> {
        let d = self
            .driver
            .actions
            .get(&self.id)
            .ok_or_else(|| DriverError::invariant(format!("context for unknown action {}", self.id)))?;
        if d.is_running {
            Ok(())
        } else {
            Err(DriverError::NotRunning.into())
        }
    }

    fn state(&self) -> Result<ActionState> {
        self.driver
            .actions
            .get(&self.id)
            .map(|d| d.state)
            .ok_or_else(|| {
                DriverError::invariant(format!("context for unknown action {}", self.id)).into()
            })
    }

    fn set_state(&mut self, state: ActionState) -> Result<()> {
        let d = self.driver.actions.get_mut(&self.id).ok_or_else(|| {
            DriverError::invariant(format!("context for unknown action {}", self.id))
        })?;
        d.state = state;
        Ok(())
    }
}

impl BuildContext for BuildCtx<'_> {
    fn find_provider(&mut self, tag: Tag) -> Result<Option<File>> {
        self.ensure_running()?;

        let src_name = self
            .driver
            .actions
            .get(&self.id)
            .map(|d| d.src_file.canonical_name().to_string())
            .ok_or_else(|| {
                DriverError::invariant(format!("context for unknown action {}", self.id))
            })?;

        let chosen = self.driver.choose_preferred_provider(&tag, &src_name);
        self.driver.dependency_table.add(tag, self.id, chosen);

        Ok(chosen
            .and_then(|p| self.driver.provisions.get(&p))
            .map(|pr| pr.file.clone()))
    }

    fn find_input(&mut self, path: &str) -> Result<Option<File>> {
        self.find_provider(Tag::from_file(path))
    }

    fn provide(&mut self, file: File, tags: Vec<Tag>) -> Result<()> {
        self.ensure_running()?;

        let Driver {
            actions,
            provisions,
            next_provision,
            ..
        } = &mut *self.driver;
        let d = actions.get_mut(&self.id).ok_or_else(|| {
            DriverError::invariant(format!("context for unknown action {}", self.id))
        })?;

        // Deduplicate by underlying file; repeated provide() unions tags.
        let existing = d
            .provisions
            .iter()
            .copied()
            .find(|p| provisions.get(p).is_some_and(|pr| pr.file == file));
        if let Some(p) = existing {
            let pr = provisions
                .get_mut(&p)
                .ok_or_else(|| DriverError::invariant(format!("provision {p} vanished")))?;
            for tag in tags {
                if !pr.tags.contains(&tag) {
                    pr.tags.push(tag);
                }
            }
            return Ok(());
        }

        let p = ProvisionId(*next_provision);
        *next_provision += 1;
        let mut uniq: Vec<Tag> = Vec::with_capacity(tags.len());
        for tag in tags {
            if !uniq.contains(&tag) {
                uniq.push(tag);
            }
        }
        provisions.insert(
            p,
            Provision {
                file,
                content_hash: ContentHash::absent(),
                tags: uniq,
            },
        );
        d.provisions.push(p);
        Ok(())
    }

    fn new_output(&mut self, path: &str) -> Result<File> {
        self.ensure_running()?;

        let file = self.driver.tmp.relative(path)?;
        if let Some(parent) = file.parent() {
            parent.create_directory()?;
        }
        self.provide(file.clone(), vec![Tag::default_tag()])?;

        let d = self.driver.actions.get_mut(&self.id).ok_or_else(|| {
            DriverError::invariant(format!("context for unknown action {}", self.id))
        })?;
        d.outputs.push(file.clone());
        Ok(file)
    }

    fn add_action_type(&mut self, factory: Box<dyn ActionFactory>) -> Result<()> {
        self.ensure_running()?;
        let idx = self.driver.adopt_factory(factory);
        self.driver.rescan_for_new_factory(idx)
    }

    fn log(&mut self, text: &str) -> Result<()> {
        self.ensure_running()?;
        let d = self.driver.actions.get_mut(&self.id).ok_or_else(|| {
            DriverError::invariant(format!("context for unknown action {}", self.id))
        })?;
        d.task.add_output(text);
        Ok(())
    }

    fn passed(&mut self) -> Result<()> {
        self.ensure_running()?;
        if self.state()? == ActionState::Failed {
            // First failure wins.
            return Ok(());
        }
        self.set_state(ActionState::Passed)?;
        self.driver.queue_done_callback(self.id)
    }

    fn failed(&mut self) -> Result<()> {
        self.ensure_running()?;
        match self.state()? {
            ActionState::Failed => Ok(()),
            ActionState::Done => {
                Err(DriverError::BadTerminalTransition("failed() after completion").into())
            }
            ActionState::Passed => {
                Err(DriverError::BadTerminalTransition("failed() after passed()").into())
            }
            _ => {
                self.set_state(ActionState::Failed)?;
                self.driver.queue_done_callback(self.id)
            }
        }
    }
}
