//! # Orchestration Types
//!
//! Core types shared across the orchestration components: the context
//! handed to the measurement body, the summary returned when a run
//! completes, and the endpoints discovered through the bouncer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::failure::Failure;
use crate::options::Options;
use crate::probe::ProbeMetadata;
use crate::state::RunState;

/// Collector and helper endpoints discovered via the bouncer.
///
/// Explicit options override any of these after discovery; "nothing
/// discovered" is the default and is a valid outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredServices {
    /// Base URL of the collector that should receive results.
    pub collector_base_url: Option<String>,

    /// Helper endpoints keyed by helper name.
    #[serde(default)]
    pub test_helpers: HashMap<String, String>,
}

/// The assembled context a measurement body runs against.
///
/// The probe record is frozen after redaction; measurement bodies never
/// see pre-redaction metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Unique identifier of this run.
    pub run_id: Uuid,

    /// Test name from the descriptor.
    pub test_name: String,

    /// Test version from the descriptor.
    pub test_version: String,

    /// Explicit inputs followed by inputs loaded from input files.
    pub inputs: Vec<String>,

    /// The option mapping the run was configured with.
    pub options: Options,

    /// The redacted probe metadata record.
    pub probe: ProbeMetadata,

    /// IP of the resolver in effect, when discovered.
    pub resolver_ip: Option<String>,

    /// Collector base URL after override resolution.
    pub collector_base_url: Option<String>,

    /// Helper endpoint for this test after override resolution.
    pub test_helper: Option<String>,

    /// When the run started.
    pub started_at: DateTime<Utc>,
}

/// Outcome of a completed run.
///
/// A summary with a truthy [`Failure`] is still a completed run: the
/// failure records what went wrong inside the phase sequence or the
/// measurement body, aggregated and never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub test_name: String,
    pub state: RunState,
    pub failure: Failure,
    pub entries_emitted: usize,
    pub report_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Whether anything at all failed during the run.
    pub fn is_failure(&self) -> bool {
        self.failure.is_failure()
    }
}
