// src/action.rs

//! The contracts between the driver and the work it orchestrates.
//!
//! An [`ActionFactory`] watches for tags and turns matching files into
//! [`Action`]s; a running action talks back to the driver exclusively through
//! its [`BuildContext`].

use anyhow::Result;

use crate::event::EventGroup;
use crate::fs::File;
use crate::tag::Tag;

/// One unit of build work, typically wrapping an external command.
///
/// `start` is invoked on the driver loop. An action may finish synchronously
/// by calling [`BuildContext::passed`] / [`BuildContext::failed`] before
/// returning, or park async work on the [`EventGroup`] and finish from a
/// later callback. An action that neither reports an outcome nor schedules
/// work completes as DONE.
pub trait Action: Send {
    /// Short verb for the dashboard, e.g. `"compile"`.
    fn verb(&self) -> &str;

    /// Silent tasks only surface on the dashboard when something goes wrong.
    fn is_silent(&self) -> bool {
        false
    }

    fn start(&mut self, group: &mut EventGroup, ctx: &mut dyn BuildContext) -> Result<()>;
}

/// Policy object that decides which tagged files deserve an action.
pub trait ActionFactory: Send {
    /// The tags whose registration should be offered to this factory.
    fn trigger_tags(&self) -> Vec<Tag>;

    /// Offer a file registered under `tag`. `None` means the combination is
    /// not actionable; it is not an error.
    fn try_make_action(&self, tag: &Tag, file: &File) -> Option<Box<dyn Action>>;
}

/// The driver-side surface a running action calls into.
///
/// Every method fails with [`crate::errors::DriverError::NotRunning`] once
/// the action has completed; the separate running flag stays set until the
/// deferred completion callback has run, so late logging between a terminal
/// report and completion is still accepted.
pub trait BuildContext {
    /// Best current provider for `tag`, recording the lookup (and its result,
    /// found or not) as a dependency of this action.
    fn find_provider(&mut self, tag: Tag) -> Result<Option<File>>;

    /// Shorthand for [`BuildContext::find_provider`] with a file-path tag.
    fn find_input(&mut self, path: &str) -> Result<Option<File>>;

    /// Declare that this action produces `file` carrying `tags`. Repeated
    /// calls for the same file union the tag sets.
    fn provide(&mut self, file: File, tags: Vec<Tag>) -> Result<()>;

    /// Allocate an output file under the temp tree, create its parent
    /// directories, and register it with the default tag.
    fn new_output(&mut self, path: &str) -> Result<File>;

    /// Register a factory discovered at build time. Existing provisions are
    /// rescanned so the factory can act on files registered before it.
    fn add_action_type(&mut self, factory: Box<dyn ActionFactory>) -> Result<()>;

    /// Append text to this action's dashboard task.
    fn log(&mut self, text: &str) -> Result<()>;

    /// Report success. Ignored if the action already failed.
    fn passed(&mut self) -> Result<()>;

    /// Report failure. Reporting failure after success is an error; repeated
    /// failure reports are ignored (first failure wins).
    fn failed(&mut self) -> Result<()>;
}
