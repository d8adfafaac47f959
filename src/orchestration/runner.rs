//! # Test Runner
//!
//! The orchestration state machine common to all tests. A runner is
//! configured fluently (inputs, options, logger, output paths, callbacks),
//! then executed exactly once: either synchronously with [`TestRunner::run`]
//! or in the background with [`TestRunner::start`].
//!
//! Configuration lives in a consumable inner value. The moment execution
//! begins, the inner moves into the executing context and the caller can no
//! longer touch it; a second execution attempt is rejected at the
//! state-check level with [`EngineError::AlreadyConsumed`] instead of ever
//! running phases against vacated state.
//!
//! ## Phase sequence
//!
//! Phases execute strictly in order; each one either succeeds, soft-fails
//! (recorded, sequence continues), or hard-fails (recorded, remaining
//! phases and the measurement body are skipped). Finalization always runs.
//!
//! 1. The resolved options are logged at debug verbosity.
//! 2. The start time is recorded and `on_begin` fires.
//! 3. Unless `no_bouncer` is set, the bouncer is queried for collector and
//!    helper endpoints. Soft by default; `fail_if_bouncer_fails` promotes.
//! 4. An explicit `collector_base_url` option overrides whatever the
//!    bouncer found, including nothing.
//! 5. An explicit `<test_name>/helper` option overrides the helper the
//!    bouncer found for tests that use one.
//! 6. Unless `no_ip_lookup` is set, the probe's public IP is discovered.
//!    On failure the IP stays `127.0.0.1`; `fail_if_ip_lookup_fails`
//!    promotes to hard.
//! 7. If `geoip_country_path` is set, the IP is mapped to a country code;
//!    any miss leaves `ZZ`. Never hard.
//! 8. If `geoip_asn_path` is set, likewise for the ASN; misses leave
//!    `AS0`. Never hard.
//! 9.–11. Unless the corresponding `save_probe_*` option is truthy, the
//!    discovered IP, ASN, and country are discarded and replaced with the
//!    sentinels for all downstream use.
//! 12. The (possibly redacted) triple is frozen into the run record.
//! 13. Unless `no_resolver_lookup` is set, the resolver IP is discovered.
//!    Soft by default; `fail_if_resolver_lookup_fails` promotes.
//! 14. Unless `no_file_report` is set, the report file is opened at the
//!    configured or derived path. Soft by default (entries are then only
//!    streamed); `fail_if_open_file_report_fails` promotes.
//!
//! The measurement body then runs against the assembled context, each
//! produced entry dispatched through `on_entry` and appended to the open
//! report. Finally `on_end` fires, the state becomes `completed`, the
//! background completion callback (if any) is invoked, and `on_destroy`
//! fires as the run's resources are released.

use chrono::Utc;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::collaborators::{Collaborators, EntryCallback, EntryEmitter, Nettest};
use super::report::FileReporter;
use super::types::{DiscoveredServices, RunContext, RunSummary};
use crate::config::EngineConfig;
use crate::constants::options as option_keys;
use crate::constants::failures;
use crate::error::{EngineError, Result};
use crate::failure::Failure;
use crate::logger::{guarded_invoke, Logger};
use crate::logging::log_run_operation;
use crate::options::Options;
use crate::probe::{ProbeMetadata, RetentionPolicy};
use crate::registry::{TestDescriptor, TestRegistry};
use crate::state::{RunEvent, RunState};

type LifecycleCallback = Box<dyn FnMut() + Send>;
type DestroyCallback = Box<dyn FnOnce() + Send>;

struct RunnerInner {
    descriptor: TestDescriptor,
    nettest: Arc<dyn Nettest>,
    collaborators: Collaborators,
    engine_config: EngineConfig,
    logger: Logger,
    inputs: Vec<String>,
    input_filepaths: Vec<PathBuf>,
    output_filepath: Option<PathBuf>,
    error_filepath: Option<PathBuf>,
    options: Options,
    on_entry: Option<EntryCallback>,
    on_begin: Option<LifecycleCallback>,
    on_end: Option<LifecycleCallback>,
    on_destroy: Option<DestroyCallback>,
}

/// Orchestrates one measurement run through the fixed phase sequence.
pub struct TestRunner {
    lifecycle: Arc<Mutex<RunState>>,
    inner: Option<RunnerInner>,
}

impl TestRunner {
    /// A runner for `nettest`, using the built-in registry entry for its
    /// name when one exists.
    pub fn new(nettest: Arc<dyn Nettest>) -> Self {
        let descriptor = TestRegistry::with_builtin()
            .get(nettest.name())
            .unwrap_or_else(|| TestDescriptor::new(nettest.name(), "0.1.0"));
        Self::with_descriptor(nettest, descriptor)
    }

    /// A runner with an explicit descriptor, for tests outside the
    /// built-in catalogue.
    pub fn with_descriptor(nettest: Arc<dyn Nettest>, descriptor: TestDescriptor) -> Self {
        Self {
            lifecycle: Arc::new(Mutex::new(RunState::Configured)),
            inner: Some(RunnerInner {
                descriptor,
                nettest,
                collaborators: Collaborators::default(),
                engine_config: EngineConfig::default(),
                logger: Logger::new(),
                inputs: Vec::new(),
                input_filepaths: Vec::new(),
                output_filepath: None,
                error_filepath: None,
                options: Options::new(),
                on_entry: None,
                on_begin: None,
                on_end: None,
                on_destroy: None,
            }),
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> RunState {
        *self.lifecycle.lock()
    }

    fn configure(&mut self, f: impl FnOnce(&mut RunnerInner)) -> &mut Self {
        match self.inner.as_mut() {
            Some(inner) => f(inner),
            None => debug!("configuration ignored: runner already consumed"),
        }
        self
    }

    /// Inject the lookup collaborators driven during discovery phases.
    pub fn set_collaborators(&mut self, collaborators: Collaborators) -> &mut Self {
        self.configure(|inner| inner.collaborators = collaborators)
    }

    /// Replace the engine-level configuration defaults.
    pub fn set_engine_config(&mut self, config: EngineConfig) -> &mut Self {
        self.configure(|inner| inner.engine_config = config)
    }

    /// Attach a logger. The logger is shared, not owned: the caller may
    /// keep using it, including across concurrently running tests.
    pub fn set_logger(&mut self, logger: Logger) -> &mut Self {
        self.configure(|inner| inner.logger = logger)
    }

    /// Append one input to the input list.
    pub fn add_input(&mut self, input: impl Into<String>) -> &mut Self {
        let input = input.into();
        self.configure(|inner| inner.inputs.push(input))
    }

    /// Append a file whose non-empty lines become inputs.
    pub fn add_input_filepath(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        let path = path.into();
        self.configure(|inner| inner.input_filepaths.push(path))
    }

    /// Replace the input file list with a single file.
    pub fn set_input_filepath(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        let path = path.into();
        self.configure(|inner| inner.input_filepaths = vec![path])
    }

    /// Set the report file path, overriding the derived default.
    pub fn set_output_filepath(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        let path = path.into();
        self.configure(|inner| inner.output_filepath = Some(path))
    }

    /// Append the run's log lines to the given file.
    pub fn set_error_filepath(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        let path = path.into();
        self.configure(|inner| inner.error_filepath = Some(path))
    }

    /// Set one option, replacing any previous value for the key.
    pub fn set_option(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        let (key, value) = (key.into(), value.into());
        self.configure(|inner| {
            inner.options.set(key, value);
        })
    }

    #[deprecated(note = "use set_option()")]
    pub fn set_options(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.set_option(key, value)
    }

    /// Register the per-entry callback, replacing any previous one. Each
    /// measurement entry is delivered as a serialized JSON string.
    pub fn on_entry(&mut self, callback: impl FnMut(&str) + Send + 'static) -> &mut Self {
        self.configure(|inner| inner.on_entry = Some(Box::new(callback)))
    }

    /// Register the begin callback, fired once when the run starts.
    pub fn on_begin(&mut self, callback: impl FnMut() + Send + 'static) -> &mut Self {
        self.configure(|inner| inner.on_begin = Some(Box::new(callback)))
    }

    /// Register the end callback, fired once during finalization, also on
    /// hard-failed runs.
    pub fn on_end(&mut self, callback: impl FnMut() + Send + 'static) -> &mut Self {
        self.configure(|inner| inner.on_end = Some(Box::new(callback)))
    }

    /// Register the destroy callback, fired once when the run's resources
    /// are released.
    pub fn on_destroy(&mut self, callback: impl FnOnce() + Send + 'static) -> &mut Self {
        self.configure(|inner| inner.on_destroy = Some(Box::new(callback)))
    }

    #[deprecated(note = "configure the Logger directly")]
    pub fn set_verbosity(&mut self, verbosity: u32) -> &mut Self {
        self.configure(|inner| {
            inner.logger.set_verbosity(verbosity);
        })
    }

    #[deprecated(note = "configure the Logger directly")]
    pub fn increase_verbosity(&mut self) -> &mut Self {
        self.configure(|inner| {
            inner.logger.increase_verbosity();
        })
    }

    #[deprecated(note = "configure the Logger directly")]
    pub fn on_log(&mut self, handler: impl FnMut(u32, &str) + Send + 'static) -> &mut Self {
        self.configure(|inner| {
            inner.logger.on_log(handler);
        })
    }

    #[deprecated(note = "configure the Logger directly")]
    pub fn on_event(&mut self, handler: impl FnMut(&str) + Send + 'static) -> &mut Self {
        self.configure(|inner| {
            inner.logger.on_event(handler);
        })
    }

    #[deprecated(note = "configure the Logger directly")]
    pub fn on_progress(&mut self, handler: impl FnMut(f64, &str) + Send + 'static) -> &mut Self {
        self.configure(|inner| {
            inner.logger.on_progress(handler);
        })
    }

    fn consume(&mut self) -> Result<RunnerInner> {
        let mut lifecycle = self.lifecycle.lock();
        let next = lifecycle.next(RunEvent::Start).map_err(|_| {
            EngineError::AlreadyConsumed {
                state: lifecycle.to_string(),
            }
        })?;
        let inner = self.inner.take().ok_or_else(|| EngineError::AlreadyConsumed {
            state: lifecycle.to_string(),
        })?;
        *lifecycle = next;
        Ok(inner)
    }

    fn finish(lifecycle: &Mutex<RunState>) {
        let mut state = lifecycle.lock();
        if let Ok(next) = state.next(RunEvent::Finish) {
            *state = next;
        }
    }

    /// Execute the whole phase sequence on the caller's task and return
    /// once the run has completed. Failures inside the run are reported in
    /// the summary, not as an `Err`; `Err` means the runner was already
    /// consumed.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let inner = self.consume()?;
        let summary = Self::execute(inner).await;
        Self::finish(&self.lifecycle);
        Ok(summary)
    }

    /// Start the run on a background task, transferring exclusive
    /// ownership of the configuration to it, and return immediately. The
    /// caller learns the outcome exclusively through `on_complete`.
    pub fn start<F>(&mut self, on_complete: F) -> Result<tokio::task::JoinHandle<()>>
    where
        F: FnOnce(RunSummary) + Send + 'static,
    {
        let inner = self.consume()?;
        let lifecycle = self.lifecycle.clone();
        Ok(tokio::spawn(async move {
            let summary = Self::execute(inner).await;
            Self::finish(&lifecycle);
            guarded_invoke("on_complete", move || on_complete(summary));
        }))
    }

    async fn execute(mut inner: RunnerInner) -> RunSummary {
        let run_id = Uuid::new_v4();
        let logger = inner.logger.clone();
        let options = inner.options.clone();
        let descriptor = inner.descriptor.clone();
        let test_name = descriptor.name.clone();

        if let Some(path) = inner.error_filepath.take() {
            logger.set_logfile(path);
        }

        info!(run_id = %run_id, test_name = %test_name, "🚀 starting measurement run");
        log_run_operation(
            "run_started",
            Some(&run_id.to_string()),
            Some(&test_name),
            "running",
            None,
        );

        // Phase 1: dump the resolved options.
        logger.debug(&format!("resolved options for {test_name}:"));
        for (key, value) in options.iter() {
            logger.debug(&format!("  {key}: {value}"));
        }

        // Phase 2: record the start time and fire on_begin.
        let started_at = Utc::now();
        if let Some(cb) = inner.on_begin.as_mut() {
            guarded_invoke("on_begin", AssertUnwindSafe(|| cb()));
        }
        logger.progress(0.0, "starting test");
        let software_name = options.get_or(
            option_keys::SOFTWARE_NAME,
            &inner.engine_config.software_name,
        );
        let software_version = options.get_or(
            option_keys::SOFTWARE_VERSION,
            &inner.engine_config.software_version,
        );
        logger.event(
            &serde_json::json!({
                "key": "status.started",
                "value": {
                    "test_name": test_name,
                    "run_id": run_id.to_string(),
                    "software_name": software_name,
                    "software_version": software_version,
                },
            })
            .to_string(),
        );

        let mut phase_failures: Vec<Failure> = Vec::new();
        let mut hard_failed = false;
        let mut services = DiscoveredServices::default();
        let mut probe = ProbeMetadata::default();

        // Phase 3: bouncer query.
        if !hard_failed && !options.is_truthy(option_keys::NO_BOUNCER) {
            logger.progress(0.1, "contacting bouncer");
            let base_url = options.get_or(
                option_keys::BOUNCER_BASE_URL,
                &inner.engine_config.bouncer_base_url,
            );
            match inner
                .collaborators
                .bouncer
                .query(base_url, &descriptor.name, &descriptor.version)
                .await
            {
                Ok(discovered) => {
                    logger.debug("bouncer discovery complete");
                    services = discovered;
                }
                Err(failure) => {
                    logger.warn(&format!("bouncer query failed: {}", failure.reason()));
                    if options.is_truthy(option_keys::FAIL_IF_BOUNCER_FAILS) {
                        hard_failed = true;
                    }
                    phase_failures.push(failure);
                }
            }
        }

        // Phase 4: explicit collector override wins over discovery.
        if !hard_failed {
            if let Some(url) = options.get(option_keys::COLLECTOR_BASE_URL) {
                services.collector_base_url = Some(url.to_string());
            }
        }

        // Phase 5: per-test helper selection and override.
        let mut test_helper: Option<String> = None;
        if !hard_failed {
            if let Some(helper_name) = descriptor.test_helper.as_deref() {
                test_helper = services.test_helpers.get(helper_name).cloned();
            }
            if let Some(explicit) = options.get(&option_keys::test_helper_key(&descriptor.name)) {
                test_helper = Some(explicit.to_string());
            }
        }

        // Phase 6: probe IP lookup.
        if !hard_failed && !options.is_truthy(option_keys::NO_IP_LOOKUP) {
            logger.progress(0.2, "looking up probe ip");
            match inner.collaborators.ip_locator.lookup_ip().await {
                Ok(ip) => {
                    logger.debug("probe ip lookup complete");
                    probe.probe_ip = ip;
                }
                Err(failure) => {
                    logger.warn(&format!("probe ip lookup failed: {}", failure.reason()));
                    if options.is_truthy(option_keys::FAIL_IF_IP_LOOKUP_FAILS) {
                        hard_failed = true;
                    }
                    phase_failures.push(failure);
                }
            }
        }

        // Phase 7: country lookup, only with a database path. Never hard.
        if !hard_failed {
            if let Some(db_path) = options.get(option_keys::GEOIP_COUNTRY_PATH) {
                match inner
                    .collaborators
                    .geo_db
                    .lookup_cc(db_path, &probe.probe_ip)
                    .await
                {
                    Ok(cc) => probe.probe_cc = cc,
                    Err(failure) => {
                        logger.warn(&format!("country lookup failed: {}", failure.reason()));
                        phase_failures.push(failure);
                    }
                }
            }
        }

        // Phase 8: ASN lookup, same shape with its own database path.
        if !hard_failed {
            if let Some(db_path) = options.get(option_keys::GEOIP_ASN_PATH) {
                match inner
                    .collaborators
                    .geo_db
                    .lookup_asn(db_path, &probe.probe_ip)
                    .await
                {
                    Ok(asn) => probe.probe_asn = asn,
                    Err(failure) => {
                        logger.warn(&format!("asn lookup failed: {}", failure.reason()));
                        phase_failures.push(failure);
                    }
                }
            }
        }

        // Phases 9-11: redaction, discard-unless-retained per field.
        if !hard_failed {
            probe.redact(RetentionPolicy::from_options(&options));
            logger.debug2(&format!(
                "probe record after redaction: ip={} asn={} cc={}",
                probe.probe_ip, probe.probe_asn, probe.probe_cc
            ));
        }

        // Phase 12: freeze the record for everything downstream.
        let record = probe.clone();

        // Phase 13: resolver IP lookup.
        let mut resolver_ip: Option<String> = None;
        if !hard_failed && !options.is_truthy(option_keys::NO_RESOLVER_LOOKUP) {
            logger.progress(0.4, "looking up resolver ip");
            let engine = options.get_or(option_keys::DNS_ENGINE, "");
            let nameserver = options.get_or(option_keys::DNS_NAMESERVER_HINT, "");
            match inner
                .collaborators
                .resolver_locator
                .lookup_resolver_ip(engine, nameserver)
                .await
            {
                // An empty answer is benign emptiness, not a failure.
                Ok(ip) if ip.is_empty() => {}
                Ok(ip) => resolver_ip = Some(ip),
                Err(failure) => {
                    logger.warn(&format!("resolver lookup failed: {}", failure.reason()));
                    if options.is_truthy(option_keys::FAIL_IF_RESOLVER_LOOKUP_FAILS) {
                        hard_failed = true;
                    }
                    phase_failures.push(failure);
                }
            }
        }

        // Phase 14: open the report file.
        let mut reporter: Option<FileReporter> = None;
        if !hard_failed && !options.is_truthy(option_keys::NO_FILE_REPORT) {
            logger.progress(0.5, "opening report file");
            let path = inner.output_filepath.clone().unwrap_or_else(|| {
                FileReporter::derived_path(
                    &inner.engine_config.report_dir,
                    &descriptor.name,
                    started_at,
                )
            });
            match FileReporter::open(path).await {
                Ok(open) => reporter = Some(open),
                Err(failure) => {
                    logger.warn(&format!("report file open failed: {}", failure.reason()));
                    if options.is_truthy(option_keys::FAIL_IF_OPEN_FILE_REPORT_FAILS) {
                        hard_failed = true;
                    }
                    phase_failures.push(failure);
                }
            }
        }

        // Measurement body, skipped entirely after a hard failure.
        let mut entries_emitted = 0;
        if !hard_failed {
            let mut inputs = std::mem::take(&mut inner.inputs);
            for path in &inner.input_filepaths {
                match tokio::fs::read_to_string(path).await {
                    Ok(contents) => {
                        inputs.extend(
                            contents
                                .lines()
                                .filter(|line| !line.trim().is_empty())
                                .map(str::to_string),
                        );
                    }
                    Err(error) => {
                        logger.warn(&format!(
                            "cannot read input file {}: {error}",
                            path.display()
                        ));
                        phase_failures.push(Failure::new(failures::FILE_ERROR));
                    }
                }
            }
            if descriptor.needs_input && inputs.is_empty() {
                logger.warn(&format!("{test_name} expects input but none was provided"));
            }

            let ctx = RunContext {
                run_id,
                test_name: descriptor.name.clone(),
                test_version: descriptor.version.clone(),
                inputs,
                options: options.clone(),
                probe: record.clone(),
                resolver_ip,
                collector_base_url: services.collector_base_url.clone(),
                test_helper,
                started_at,
            };

            logger.progress(0.6, "running measurement body");
            let nettest = inner.nettest.clone();
            let mut emitter = EntryEmitter::new(inner.on_entry.as_mut(), reporter.as_mut());
            let body_failure = nettest.run(&ctx, &mut emitter).await;
            let (emitted, write_failures) = emitter.finish();
            entries_emitted = emitted;
            phase_failures.extend(write_failures);
            if body_failure.is_failure() {
                logger.warn(&format!(
                    "measurement body failed: {}",
                    body_failure.reason()
                ));
            }
            phase_failures.push(body_failure);
        }

        if let Some(reporter) = reporter.as_mut() {
            if let Err(failure) = reporter.flush().await {
                phase_failures.push(failure);
            }
        }

        // Finalization always runs, also after a hard failure.
        let failure = Failure::compose(phase_failures);
        if let Some(cb) = inner.on_end.as_mut() {
            guarded_invoke("on_end", AssertUnwindSafe(|| cb()));
        }
        logger.progress(1.0, "test completed");
        logger.event(
            &serde_json::json!({
                "key": "status.ended",
                "value": {
                    "test_name": test_name,
                    "run_id": run_id.to_string(),
                    "failure": failure.reason(),
                },
            })
            .to_string(),
        );

        let summary = RunSummary {
            run_id,
            test_name: test_name.clone(),
            state: RunState::Completed,
            failure,
            entries_emitted,
            report_path: reporter.as_ref().map(|r| r.path().to_path_buf()),
            started_at,
            finished_at: Utc::now(),
        };

        if summary.is_failure() {
            warn!(
                run_id = %run_id,
                test_name = %test_name,
                failure = %summary.failure.detailed_reason(),
                "measurement run completed with failures"
            );
        } else {
            info!(run_id = %run_id, test_name = %test_name, "✅ measurement run completed");
        }
        log_run_operation(
            "run_completed",
            Some(&run_id.to_string()),
            Some(&test_name),
            "completed",
            Some(summary.failure.reason()),
        );

        // The run's resources are released here.
        if let Some(cb) = inner.on_destroy.take() {
            guarded_invoke("on_destroy", cb);
        }

        summary
    }
}

impl std::fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRunner")
            .field("state", &self.state())
            .field("consumed", &self.inner.is_none())
            .finish()
    }
}
