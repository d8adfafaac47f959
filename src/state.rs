//! # Run Lifecycle State Machine
//!
//! The run lifecycle marker for a test runner: `Configured` until execution
//! begins, `Running` while the phase sequence executes, `Completed` once
//! finalization has fired. Exactly one execution is permitted per runner;
//! invalid transitions (notably a second start) are rejected at the
//! state-check level rather than by letting phases execute against vacated
//! configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EngineError, Result};

/// Lifecycle states of a test runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Configuration is open; no execution attempted yet.
    Configured,
    /// The phase sequence owns the configuration and is executing.
    Running,
    /// Finalization fired; the runner can never execute again.
    Completed,
}

impl RunState {
    /// Check if this is a terminal state (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Check if the phase sequence is currently executing.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Attempt the transition triggered by `event`.
    pub fn next(self, event: RunEvent) -> Result<RunState> {
        match (self, event) {
            (RunState::Configured, RunEvent::Start) => Ok(RunState::Running),
            (RunState::Running, RunEvent::Finish) => Ok(RunState::Completed),
            (from, event) => Err(EngineError::InvalidTransition {
                from: from.to_string(),
                event: event.to_string(),
            }),
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::Configured
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configured => write!(f, "configured"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "configured" => Ok(Self::Configured),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid run state: {s}")),
        }
    }
}

/// Events that drive the run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEvent {
    /// Execution begins; configuration ownership transfers to the run.
    Start,
    /// Finalization completed.
    Finish,
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Finish => write!(f, "finish"),
        }
    }
}
