//! Shared test doubles for orchestration integration tests: scripted
//! collaborators with call counters and a recording measurement body.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nettest_core::orchestration::{
    BouncerClient, Collaborators, DiscoveredServices, EntryEmitter, GeoDb, IpLocator,
    LookupResult, Nettest, ResolverLocator, RunContext,
};
use nettest_core::Failure;

/// Bouncer returning a fixed answer (or failure) and counting calls.
pub struct ScriptedBouncer {
    pub answer: Result<DiscoveredServices, String>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedBouncer {
    pub fn succeeding(services: DiscoveredServices) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                answer: Ok(services),
                calls: calls.clone(),
            },
            calls,
        )
    }

    pub fn failing(reason: &str) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                answer: Err(reason.to_string()),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl BouncerClient for ScriptedBouncer {
    async fn query(
        &self,
        _base_url: &str,
        _test_name: &str,
        _test_version: &str,
    ) -> LookupResult<DiscoveredServices> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            Ok(services) => Ok(services.clone()),
            Err(reason) => Err(Failure::new(reason.clone())),
        }
    }
}

/// IP locator returning a fixed address and counting calls.
pub struct ScriptedIpLocator {
    pub ip: String,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedIpLocator {
    pub fn new(ip: &str) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                ip: ip.to_string(),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl IpLocator for ScriptedIpLocator {
    async fn lookup_ip(&self) -> LookupResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ip.clone())
    }
}

/// GeoIP lookups returning fixed answers and recording the IPs queried.
pub struct ScriptedGeoDb {
    pub cc: String,
    pub asn: String,
    pub queried_ips: Arc<Mutex<Vec<String>>>,
}

impl ScriptedGeoDb {
    pub fn new(cc: &str, asn: &str) -> (Self, Arc<Mutex<Vec<String>>>) {
        let queried = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                cc: cc.to_string(),
                asn: asn.to_string(),
                queried_ips: queried.clone(),
            },
            queried,
        )
    }
}

#[async_trait]
impl GeoDb for ScriptedGeoDb {
    async fn lookup_cc(&self, _db_path: &str, ip: &str) -> LookupResult<String> {
        self.queried_ips.lock().push(ip.to_string());
        Ok(self.cc.clone())
    }

    async fn lookup_asn(&self, _db_path: &str, ip: &str) -> LookupResult<String> {
        self.queried_ips.lock().push(ip.to_string());
        Ok(self.asn.clone())
    }
}

/// Resolver locator returning a fixed address and counting calls.
pub struct ScriptedResolver {
    pub ip: String,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedResolver {
    pub fn new(ip: &str) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                ip: ip.to_string(),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl ResolverLocator for ScriptedResolver {
    async fn lookup_resolver_ip(
        &self,
        _dns_engine: &str,
        _nameserver_hint: &str,
    ) -> LookupResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ip.clone())
    }
}

/// Measurement body that records the context it ran against and emits one
/// entry per input.
pub struct RecordingNettest {
    pub test_name: String,
    pub failure: Failure,
    pub runs: Arc<AtomicUsize>,
    pub seen_context: Arc<Mutex<Option<RunContext>>>,
}

impl RecordingNettest {
    pub fn new(test_name: &str) -> Self {
        Self {
            test_name: test_name.to_string(),
            failure: Failure::none(),
            runs: Arc::new(AtomicUsize::new(0)),
            seen_context: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_failure(mut self, failure: Failure) -> Self {
        self.failure = failure;
        self
    }

    pub fn runs(&self) -> Arc<AtomicUsize> {
        self.runs.clone()
    }

    pub fn seen_context(&self) -> Arc<Mutex<Option<RunContext>>> {
        self.seen_context.clone()
    }
}

#[async_trait]
impl Nettest for RecordingNettest {
    fn name(&self) -> &str {
        &self.test_name
    }

    async fn run(&self, ctx: &RunContext, emitter: &mut EntryEmitter<'_>) -> Failure {
        self.runs.fetch_add(1, Ordering::SeqCst);
        *self.seen_context.lock() = Some(ctx.clone());
        for input in &ctx.inputs {
            emitter
                .emit(serde_json::json!({
                    "test_name": ctx.test_name,
                    "input": input,
                    "probe_ip": ctx.probe.probe_ip,
                    "probe_asn": ctx.probe.probe_asn,
                    "probe_cc": ctx.probe.probe_cc,
                }))
                .await;
        }
        self.failure.clone()
    }
}

/// Collaborators that succeed with plausible fixed answers.
pub fn scripted_collaborators() -> (Collaborators, CollaboratorProbes) {
    let (bouncer, bouncer_calls) = ScriptedBouncer::succeeding(DiscoveredServices::default());
    let (ip_locator, ip_calls) = ScriptedIpLocator::new("203.0.113.9");
    let (geo_db, geo_queries) = ScriptedGeoDb::new("IT", "AS30722");
    let (resolver, resolver_calls) = ScriptedResolver::new("192.0.2.53");
    (
        Collaborators {
            bouncer: Arc::new(bouncer),
            ip_locator: Arc::new(ip_locator),
            geo_db: Arc::new(geo_db),
            resolver_locator: Arc::new(resolver),
        },
        CollaboratorProbes {
            bouncer_calls,
            ip_calls,
            geo_queries,
            resolver_calls,
        },
    )
}

/// Call counters exposed by [`scripted_collaborators`].
pub struct CollaboratorProbes {
    pub bouncer_calls: Arc<AtomicUsize>,
    pub ip_calls: Arc<AtomicUsize>,
    pub geo_queries: Arc<Mutex<Vec<String>>>,
    pub resolver_calls: Arc<AtomicUsize>,
}
