//! # Collaborator Seams
//!
//! The black-box operations the orchestrator drives: bouncer discovery,
//! probe IP lookup, GeoIP database lookups, resolver discovery, and the
//! measurement body itself. Each is a trait with a name, an input, and a
//! `(result | Failure)` outcome; the orchestrator never looks inside.
//!
//! Collaborators are expected to bound their own blocking time and surface
//! a timeout Failure rather than block indefinitely; the orchestrator
//! applies no scheduling deadline across the sequence.

use async_trait::async_trait;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::report::FileReporter;
use super::types::{DiscoveredServices, RunContext};
use crate::constants::failures;
use crate::failure::Failure;
use crate::logger::guarded_invoke;

/// Outcome of a black-box lookup operation.
pub type LookupResult<T> = std::result::Result<T, Failure>;

/// Directory service mapping a test type to collector/helper endpoints.
#[async_trait]
pub trait BouncerClient: Send + Sync {
    /// Query the bouncer at `base_url` for the services serving this test.
    async fn query(
        &self,
        base_url: &str,
        test_name: &str,
        test_version: &str,
    ) -> LookupResult<DiscoveredServices>;
}

/// Remote discovery of the probe's public IP.
#[async_trait]
pub trait IpLocator: Send + Sync {
    async fn lookup_ip(&self) -> LookupResult<String>;
}

/// Local GeoIP database lookups keyed by database path.
#[async_trait]
pub trait GeoDb: Send + Sync {
    /// Map `ip` to a country code using the database at `db_path`.
    async fn lookup_cc(&self, db_path: &str, ip: &str) -> LookupResult<String>;

    /// Map `ip` to an ASN using the database at `db_path`.
    async fn lookup_asn(&self, db_path: &str, ip: &str) -> LookupResult<String>;
}

/// Discovery of the IP of the DNS resolver in effect.
#[async_trait]
pub trait ResolverLocator: Send + Sync {
    /// Discover the resolver IP using the configured engine and nameserver
    /// hint, both passed through verbatim from the options. An `Ok` empty
    /// string means there is nothing to report and is not a failure.
    async fn lookup_resolver_ip(
        &self,
        dns_engine: &str,
        nameserver_hint: &str,
    ) -> LookupResult<String>;
}

/// Placeholder collaborator used until a real one is injected.
///
/// Every operation fails with `not_supported`, so a run missing a
/// collaborator still records an observable per-phase outcome instead of
/// silently skipping work.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

#[async_trait]
impl BouncerClient for Unconfigured {
    async fn query(&self, _: &str, _: &str, _: &str) -> LookupResult<DiscoveredServices> {
        Err(Failure::new(failures::NOT_SUPPORTED))
    }
}

#[async_trait]
impl IpLocator for Unconfigured {
    async fn lookup_ip(&self) -> LookupResult<String> {
        Err(Failure::new(failures::NOT_SUPPORTED))
    }
}

#[async_trait]
impl GeoDb for Unconfigured {
    async fn lookup_cc(&self, _: &str, _: &str) -> LookupResult<String> {
        Err(Failure::new(failures::NOT_SUPPORTED))
    }

    async fn lookup_asn(&self, _: &str, _: &str) -> LookupResult<String> {
        Err(Failure::new(failures::NOT_SUPPORTED))
    }
}

#[async_trait]
impl ResolverLocator for Unconfigured {
    async fn lookup_resolver_ip(&self, _: &str, _: &str) -> LookupResult<String> {
        Err(Failure::new(failures::NOT_SUPPORTED))
    }
}

/// The full set of lookup collaborators a run drives.
#[derive(Clone)]
pub struct Collaborators {
    pub bouncer: Arc<dyn BouncerClient>,
    pub ip_locator: Arc<dyn IpLocator>,
    pub geo_db: Arc<dyn GeoDb>,
    pub resolver_locator: Arc<dyn ResolverLocator>,
}

impl Default for Collaborators {
    fn default() -> Self {
        let unconfigured = Arc::new(Unconfigured);
        Self {
            bouncer: unconfigured.clone(),
            ip_locator: unconfigured.clone(),
            geo_db: unconfigured.clone(),
            resolver_locator: unconfigured,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

pub(crate) type EntryCallback = Box<dyn FnMut(&str) + Send>;

/// Dispatches measurement entries to the per-entry callback and, when the
/// report file is open, appends them to it.
///
/// Each entry is serialized exactly once so both destinations see
/// byte-identical lines. Write failures are collected rather than
/// propagated; the runner merges them into the aggregate Failure.
pub struct EntryEmitter<'a> {
    callback: Option<&'a mut EntryCallback>,
    reporter: Option<&'a mut FileReporter>,
    emitted: usize,
    write_failures: Vec<Failure>,
}

impl<'a> EntryEmitter<'a> {
    pub(crate) fn new(
        callback: Option<&'a mut EntryCallback>,
        reporter: Option<&'a mut FileReporter>,
    ) -> Self {
        Self {
            callback,
            reporter,
            emitted: 0,
            write_failures: Vec::new(),
        }
    }

    /// Dispatch one measurement entry.
    pub async fn emit(&mut self, entry: serde_json::Value) {
        let line = entry.to_string();
        if let Some(cb) = self.callback.as_mut() {
            guarded_invoke("on_entry", AssertUnwindSafe(|| cb(&line)));
        }
        if let Some(reporter) = self.reporter.as_mut() {
            if let Err(failure) = reporter.append(&line).await {
                self.write_failures.push(failure);
            }
        }
        self.emitted += 1;
    }

    /// How many entries have been dispatched so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub(crate) fn finish(self) -> (usize, Vec<Failure>) {
        (self.emitted, self.write_failures)
    }
}

/// The measurement body: the test-specific logic run against the assembled
/// context once discovery, redaction, and reporting setup are done.
#[async_trait]
pub trait Nettest: Send + Sync {
    /// Stable test name; looked up in the test registry for version and
    /// helper metadata.
    fn name(&self) -> &str;

    /// Run the measurement, emitting zero or more result entries. The
    /// returned Failure (if any) is merged into the run's aggregate.
    async fn run(&self, ctx: &RunContext, emitter: &mut EntryEmitter<'_>) -> Failure;
}
