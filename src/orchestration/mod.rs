//! # Orchestration
//!
//! The test-run orchestration core: the [`TestRunner`] phase-sequence state
//! machine, the collaborator seams it drives, and the types flowing between
//! them.

pub mod collaborators;
pub mod report;
pub mod runner;
pub mod types;

// Re-export main types for convenient access
pub use collaborators::{
    BouncerClient, Collaborators, EntryEmitter, GeoDb, IpLocator, LookupResult, Nettest,
    ResolverLocator, Unconfigured,
};
pub use report::FileReporter;
pub use runner::TestRunner;
pub use types::{DiscoveredServices, RunContext, RunSummary};
