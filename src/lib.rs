#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Nettest Core
//!
//! The orchestration core of a network-measurement engine.
//!
//! ## Overview
//!
//! Given a declarative test configuration (inputs, options, output
//! destinations, observers), this crate drives the fixed multi-phase
//! lifecycle around an opaque measurement body: service discovery through
//! a bouncer, probe IP/ASN/country lookups, privacy redaction, resolver
//! discovery, and report-file setup — streaming log lines, structured
//! events, and progress to registered observers, and aggregating every
//! failure into a single reportable outcome.
//!
//! The concrete network protocols (DNS mechanics, HTTP/TLS mechanics, the
//! test bodies themselves, bouncer/collector wire formats, GeoIP parsing)
//! are external collaborators behind trait seams; the orchestrator consumes
//! them as black-box operations with a name, an input, and a
//! `(result | Failure)` outcome.
//!
//! ## Module Organization
//!
//! - [`failure`] - Composite failure model shared by every component
//! - [`logger`] - Observer dispatch: log lines, events, progress
//! - [`options`] - Per-run option resolution
//! - [`constants`] - Option keys, failure strings, sentinels, severities
//! - [`state`] - Run lifecycle state machine
//! - [`probe`] - Probe metadata and redaction policy
//! - [`registry`] - Built-in test catalogue
//! - [`config`] - Engine-level configuration defaults
//! - [`error`] - Usage-error taxonomy
//! - [`orchestration`] - The phase-sequence runner and collaborator seams
//! - [`logging`] - Structured diagnostic logging for the engine itself
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nettest_core::constants::options;
//! use nettest_core::logger::Logger;
//! use nettest_core::orchestration::{EntryEmitter, Nettest, RunContext, TestRunner};
//! use nettest_core::failure::Failure;
//!
//! struct Noop;
//!
//! #[async_trait::async_trait]
//! impl Nettest for Noop {
//!     fn name(&self) -> &str {
//!         "ndt"
//!     }
//!
//!     async fn run(&self, _ctx: &RunContext, emitter: &mut EntryEmitter<'_>) -> Failure {
//!         emitter.emit(serde_json::json!({"status": "ok"})).await;
//!         Failure::none()
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let logger = Logger::new();
//! logger.on_log(|level, line| eprintln!("<{level}> {line}"));
//!
//! let mut runner = TestRunner::new(Arc::new(Noop));
//! runner
//!     .set_logger(logger)
//!     .set_option(options::NO_BOUNCER, "true")
//!     .set_option(options::NO_IP_LOOKUP, "true")
//!     .set_option(options::NO_RESOLVER_LOOKUP, "true")
//!     .set_option(options::NO_FILE_REPORT, "true")
//!     .on_entry(|entry| println!("{entry}"));
//!
//! let summary = runner.run().await?;
//! assert!(!summary.is_failure());
//! # Ok(())
//! # }
//! ```
//!
//! ## Execution Modes
//!
//! `run().await` executes the whole sequence on the caller's task and
//! returns once completed. `start(cb)` moves exclusive ownership of the
//! configuration into a background task and returns immediately; the
//! outcome arrives only through `cb`. Either way a runner executes at most
//! once: the second attempt is rejected synchronously.

pub mod config;
pub mod constants;
pub mod error;
pub mod failure;
pub mod logger;
pub mod logging;
pub mod options;
pub mod orchestration;
pub mod probe;
pub mod registry;
pub mod state;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use failure::Failure;
pub use logger::Logger;
pub use options::Options;
pub use orchestration::{
    BouncerClient, Collaborators, DiscoveredServices, EntryEmitter, FileReporter, GeoDb,
    IpLocator, LookupResult, Nettest, ResolverLocator, RunContext, RunSummary, TestRunner,
};
pub use probe::{ProbeMetadata, RetentionPolicy};
pub use registry::{TestDescriptor, TestRegistry};
pub use state::{RunEvent, RunState};
