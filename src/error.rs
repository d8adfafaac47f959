//! # Usage-Error Taxonomy
//!
//! [`EngineError`] covers misuse of the engine API and environment problems
//! surfaced synchronously from `run`/`start`. It is deliberately distinct
//! from [`crate::failure::Failure`], which records what went wrong *inside*
//! a run: a run that completes with failures is still a successful call.

use thiserror::Error;

/// Errors reported synchronously by the engine API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A second `run`/`start` attempt on a runner whose configuration has
    /// already been consumed by an earlier execution.
    #[error("test configuration already consumed: runner is {state}")]
    AlreadyConsumed { state: String },

    /// A lifecycle transition that the run state machine does not allow.
    #[error("invalid lifecycle transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    /// Invalid or unusable engine configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An I/O error outside the measurement itself.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
