// src/dashboard.rs

//! Progress reporting surface.
//!
//! The driver opens one dashboard task per action and drives its state
//! through the action lifecycle. [`LogDashboard`] renders tasks through
//! `tracing`; tests substitute their own recording implementations.

use std::fmt;

use tracing::{debug, info, warn};

/// Lifecycle states a dashboard task can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    /// Completed and explicitly reported success.
    Passed,
    /// Completed without reporting an outcome.
    Done,
    Failed,
    /// Failed or cancelled, pending a retry once its inputs change.
    Blocked,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Running => "running",
            TaskState::Passed => "passed",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
            TaskState::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// How prominently a task should be displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStyle {
    Normal,
    /// Housekeeping tasks that only surface when something goes wrong.
    Silent,
}

/// One task line on the dashboard.
pub trait DashboardTask: Send {
    fn set_state(&mut self, state: TaskState);
    fn add_output(&mut self, text: &str);
}

/// Factory for dashboard tasks.
pub trait Dashboard: Send {
    fn begin_task(&mut self, verb: &str, noun: &str, style: TaskStyle) -> Box<dyn DashboardTask>;
}

/// Dashboard that renders task lifecycle through `tracing`.
#[derive(Debug, Default)]
pub struct LogDashboard;

impl LogDashboard {
    pub fn new() -> Self {
        LogDashboard
    }
}

impl Dashboard for LogDashboard {
    fn begin_task(&mut self, verb: &str, noun: &str, style: TaskStyle) -> Box<dyn DashboardTask> {
        debug!(verb = %verb, noun = %noun, "task opened");
        Box::new(LogTask {
            verb: verb.to_string(),
            noun: noun.to_string(),
            style,
        })
    }
}

struct LogTask {
    verb: String,
    noun: String,
    style: TaskStyle,
}

impl DashboardTask for LogTask {
    fn set_state(&mut self, state: TaskState) {
        match state {
            TaskState::Failed | TaskState::Blocked => {
                warn!(verb = %self.verb, noun = %self.noun, state = %state, "task state");
            }
            _ if self.style == TaskStyle::Silent => {
                debug!(verb = %self.verb, noun = %self.noun, state = %state, "task state");
            }
            _ => {
                info!(verb = %self.verb, noun = %self.noun, state = %state, "task state");
            }
        }
    }

    fn add_output(&mut self, text: &str) {
        for line in text.lines() {
            if self.style == TaskStyle::Silent {
                debug!(verb = %self.verb, noun = %self.noun, "{line}");
            } else {
                info!(verb = %self.verb, noun = %self.noun, "{line}");
            }
        }
    }
}

impl Drop for LogTask {
    fn drop(&mut self) {
        debug!(verb = %self.verb, noun = %self.noun, "task closed");
    }
}
