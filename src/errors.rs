// src/errors.rs

//! Crate-wide error types.
//!
//! The driver distinguishes programmer errors in actions (calling back after
//! completion, double-reporting an outcome) from bugs in the driver itself
//! (invariant violations). Action failures themselves are not errors at this
//! level: they are a normal terminal state, surfaced through the dashboard.
//!
//! Application plumbing (config, I/O, process spawn) uses `anyhow` with
//! context, as elsewhere in the crate.

use std::io;

use thiserror::Error;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

#[derive(Error, Debug)]
pub enum DriverError {
    /// A `BuildContext` method was called after the action reached a terminal
    /// state. This is a bug in the action.
    #[error("action is not running")]
    NotRunning,

    /// The action reported conflicting outcomes, e.g. `failed()` after
    /// `passed()`.
    #[error("bad terminal transition: {0}")]
    BadTerminalTransition(&'static str),

    /// An internal consistency check failed. This is a bug in the driver.
    #[error("driver invariant violated: {0}")]
    InvariantViolation(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DriverError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        DriverError::InvariantViolation(msg.into())
    }
}
