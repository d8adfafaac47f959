//! Integration tests for the test-run orchestration lifecycle: phase
//! ordering, skip and fail-if policy, redaction defaults, single
//! consumption, and observer dispatch.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{scripted_collaborators, RecordingNettest, ScriptedBouncer};
use nettest_core::constants::{failures, options};
use nettest_core::orchestration::{DiscoveredServices, TestRunner};
use nettest_core::{EngineError, Failure, Logger, RunState};

fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let clone = count.clone();
    (count, move || {
        clone.fetch_add(1, Ordering::SeqCst);
    })
}

#[tokio::test]
async fn test_skip_everything_end_to_end() {
    let nettest = RecordingNettest::new("ndt");
    let runs = nettest.runs();
    let seen = nettest.seen_context();
    let (collaborators, probes) = scripted_collaborators();

    let (begins, on_begin) = counter();
    let (ends, on_end) = counter();
    let (destroys, mut on_destroy) = counter();

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .add_input("example.com")
        .set_option(options::NO_BOUNCER, "true")
        .set_option(options::NO_IP_LOOKUP, "true")
        .set_option(options::NO_RESOLVER_LOOKUP, "true")
        .set_option(options::NO_FILE_REPORT, "true")
        .on_begin(on_begin)
        .on_end(on_end)
        .on_destroy(move || on_destroy());

    let summary = runner.run().await.unwrap();

    // No remote discovery happened at all.
    assert_eq!(probes.bouncer_calls.load(Ordering::SeqCst), 0);
    assert_eq!(probes.ip_calls.load(Ordering::SeqCst), 0);
    assert_eq!(probes.resolver_calls.load(Ordering::SeqCst), 0);
    assert!(probes.geo_queries.lock().is_empty());

    // Lifecycle callbacks fired exactly once each.
    assert_eq!(begins.load(Ordering::SeqCst), 1);
    assert_eq!(ends.load(Ordering::SeqCst), 1);
    assert_eq!(destroys.load(Ordering::SeqCst), 1);

    // The body ran once against the single input with sentinel metadata.
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    let ctx = seen.lock().clone().unwrap();
    assert_eq!(ctx.inputs, vec!["example.com"]);
    assert_eq!(ctx.probe.probe_ip, "127.0.0.1");
    assert_eq!(ctx.probe.probe_asn, "AS0");
    assert_eq!(ctx.probe.probe_cc, "ZZ");
    assert!(ctx.collector_base_url.is_none());
    assert!(ctx.resolver_ip.is_none());

    assert_eq!(summary.state, RunState::Completed);
    assert!(!summary.is_failure());
    assert!(summary.report_path.is_none());
    assert_eq!(summary.entries_emitted, 1);
}

#[tokio::test]
async fn test_second_execution_is_rejected() {
    let nettest = RecordingNettest::new("ndt");
    let runs = nettest.runs();

    let (begins, on_begin) = counter();

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_option(options::NO_BOUNCER, "true")
        .set_option(options::NO_IP_LOOKUP, "true")
        .set_option(options::NO_RESOLVER_LOOKUP, "true")
        .set_option(options::NO_FILE_REPORT, "true")
        .on_begin(on_begin);

    runner.run().await.unwrap();
    assert_eq!(runner.state(), RunState::Completed);

    let second = runner.run().await;
    assert!(matches!(second, Err(EngineError::AlreadyConsumed { .. })));

    let third = runner.start(|_| {});
    assert!(matches!(third, Err(EngineError::AlreadyConsumed { .. })));

    // The phase sequence never executed a second time.
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(begins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_redaction_discards_by_default() {
    let nettest = RecordingNettest::new("ndt");
    let seen = nettest.seen_context();
    let (collaborators, probes) = scripted_collaborators();

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .set_option(options::GEOIP_COUNTRY_PATH, "/tmp/country.mmdb")
        .set_option(options::GEOIP_ASN_PATH, "/tmp/asn.mmdb")
        .set_option(options::NO_RESOLVER_LOOKUP, "true")
        .set_option(options::NO_FILE_REPORT, "true");

    let summary = runner.run().await.unwrap();
    assert!(!summary.is_failure());

    // The discovered IP drove the geo lookups...
    let queried = probes.geo_queries.lock().clone();
    assert_eq!(queried, vec!["203.0.113.9", "203.0.113.9"]);

    // ...but only sentinels reached the measurement body.
    let ctx = seen.lock().clone().unwrap();
    assert_eq!(ctx.probe.probe_ip, "127.0.0.1");
    assert_eq!(ctx.probe.probe_asn, "AS0");
    assert_eq!(ctx.probe.probe_cc, "ZZ");
}

#[tokio::test]
async fn test_retention_keeps_opted_fields() {
    let nettest = RecordingNettest::new("ndt");
    let seen = nettest.seen_context();
    let (collaborators, _probes) = scripted_collaborators();

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .set_option(options::GEOIP_COUNTRY_PATH, "/tmp/country.mmdb")
        .set_option(options::GEOIP_ASN_PATH, "/tmp/asn.mmdb")
        .set_option(options::SAVE_PROBE_CC, "true")
        .set_option(options::SAVE_PROBE_ASN, "true")
        .set_option(options::NO_RESOLVER_LOOKUP, "true")
        .set_option(options::NO_FILE_REPORT, "true");

    runner.run().await.unwrap();

    let ctx = seen.lock().clone().unwrap();
    assert_eq!(ctx.probe.probe_ip, "127.0.0.1");
    assert_eq!(ctx.probe.probe_asn, "AS30722");
    assert_eq!(ctx.probe.probe_cc, "IT");
}

#[tokio::test]
async fn test_bouncer_failure_is_soft_by_default() {
    let nettest = RecordingNettest::new("ndt");
    let runs = nettest.runs();
    let (mut collaborators, probes) = scripted_collaborators();
    let (failing, bouncer_calls) = ScriptedBouncer::failing(failures::GENERIC_TIMEOUT_ERROR);
    collaborators.bouncer = Arc::new(failing);

    let (ends, on_end) = counter();

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .set_option(options::NO_RESOLVER_LOOKUP, "true")
        .set_option(options::NO_FILE_REPORT, "true")
        .on_end(on_end);

    let summary = runner.run().await.unwrap();

    // The run proceeded past the bouncer: IP lookup and the body both ran.
    assert_eq!(bouncer_calls.load(Ordering::SeqCst), 1);
    assert_eq!(probes.ip_calls.load(Ordering::SeqCst), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(ends.load(Ordering::SeqCst), 1);
    assert_eq!(summary.state, RunState::Completed);

    // The bouncer failure is recorded, not fatal.
    assert!(summary.is_failure());
    let reasons: Vec<&str> = summary
        .failure
        .children()
        .iter()
        .map(Failure::reason)
        .collect();
    assert!(reasons.contains(&failures::GENERIC_TIMEOUT_ERROR));
}

#[tokio::test]
async fn test_bouncer_hard_failure_skips_to_finalization() {
    let nettest = RecordingNettest::new("ndt");
    let runs = nettest.runs();
    let (mut collaborators, probes) = scripted_collaborators();
    let (failing, _) = ScriptedBouncer::failing(failures::EOF_ERROR);
    collaborators.bouncer = Arc::new(failing);

    let (ends, on_end) = counter();
    let (destroys, mut on_destroy) = counter();

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .set_option(options::FAIL_IF_BOUNCER_FAILS, "true")
        .set_option(options::NO_FILE_REPORT, "true")
        .on_end(on_end)
        .on_destroy(move || on_destroy());

    let summary = runner.run().await.unwrap();

    // Everything after the bouncer was skipped.
    assert_eq!(probes.ip_calls.load(Ordering::SeqCst), 0);
    assert_eq!(probes.resolver_calls.load(Ordering::SeqCst), 0);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(summary.entries_emitted, 0);

    // Finalization still fired.
    assert_eq!(ends.load(Ordering::SeqCst), 1);
    assert_eq!(destroys.load(Ordering::SeqCst), 1);
    assert_eq!(summary.state, RunState::Completed);
    assert!(summary.is_failure());
}

#[tokio::test]
async fn test_report_open_hard_failure_skips_measurement() {
    let nettest = RecordingNettest::new("ndt");
    let runs = nettest.runs();
    let (collaborators, _probes) = scripted_collaborators();

    let (ends, on_end) = counter();
    let (destroys, mut on_destroy) = counter();

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .set_output_filepath("/definitely/not/a/directory/report.njson")
        .set_option(options::FAIL_IF_OPEN_FILE_REPORT_FAILS, "true")
        .set_option(options::NO_RESOLVER_LOOKUP, "true")
        .on_end(on_end)
        .on_destroy(move || on_destroy());

    let summary = runner.run().await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(ends.load(Ordering::SeqCst), 1);
    assert_eq!(destroys.load(Ordering::SeqCst), 1);
    let reasons: Vec<&str> = summary
        .failure
        .children()
        .iter()
        .map(Failure::reason)
        .collect();
    assert!(reasons.contains(&failures::FILE_ERROR));
}

#[tokio::test]
async fn test_report_open_soft_failure_still_runs_measurement() {
    let nettest = RecordingNettest::new("ndt");
    let runs = nettest.runs();
    let (collaborators, _probes) = scripted_collaborators();

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .add_input("example.com")
        .set_output_filepath("/definitely/not/a/directory/report.njson")
        .set_option(options::NO_RESOLVER_LOOKUP, "true");

    let summary = runner.run().await.unwrap();

    // No report file, but the measurement still ran and streamed entries.
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(summary.report_path.is_none());
    assert_eq!(summary.entries_emitted, 1);
    assert!(summary.is_failure());
}

#[tokio::test]
async fn test_entries_reach_callback_and_report_file() {
    let dir = tempfile::tempdir().unwrap();
    let report_path = dir.path().join("report.njson");

    let nettest = RecordingNettest::new("ndt");
    let (collaborators, _probes) = scripted_collaborators();

    let streamed = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = streamed.clone();

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .add_input("a.example")
        .add_input("b.example")
        .set_output_filepath(&report_path)
        .set_option(options::NO_RESOLVER_LOOKUP, "true")
        .on_entry(move |entry| sink.lock().push(entry.to_string()));

    let summary = runner.run().await.unwrap();

    assert_eq!(summary.entries_emitted, 2);
    assert_eq!(summary.report_path.as_deref(), Some(report_path.as_path()));

    let streamed = streamed.lock().clone();
    let written: Vec<String> = std::fs::read_to_string(&report_path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(streamed, written);
    assert!(written[0].contains("a.example"));
    assert!(written[1].contains("b.example"));
}

#[tokio::test]
async fn test_overrides_win_over_discovery() {
    let nettest = RecordingNettest::new("web_connectivity");
    let seen = nettest.seen_context();

    let mut discovered = DiscoveredServices::default();
    discovered.collector_base_url = Some("https://collector.discovered".to_string());
    discovered.test_helpers = HashMap::from([(
        "web-connectivity".to_string(),
        "https://helper.discovered".to_string(),
    )]);
    let (bouncer, _) = ScriptedBouncer::succeeding(discovered);

    let (mut collaborators, _probes) = scripted_collaborators();
    collaborators.bouncer = Arc::new(bouncer);

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .add_input("https://example.com/")
        .set_option(options::COLLECTOR_BASE_URL, "https://collector.explicit")
        .set_option(
            options::test_helper_key("web_connectivity"),
            "https://helper.explicit",
        )
        .set_option(options::NO_IP_LOOKUP, "true")
        .set_option(options::NO_RESOLVER_LOOKUP, "true")
        .set_option(options::NO_FILE_REPORT, "true");

    runner.run().await.unwrap();

    let ctx = seen.lock().clone().unwrap();
    assert_eq!(
        ctx.collector_base_url.as_deref(),
        Some("https://collector.explicit")
    );
    assert_eq!(ctx.test_helper.as_deref(), Some("https://helper.explicit"));
}

#[tokio::test]
async fn test_discovered_helper_used_without_override() {
    let nettest = RecordingNettest::new("web_connectivity");
    let seen = nettest.seen_context();

    let mut discovered = DiscoveredServices::default();
    discovered.test_helpers = HashMap::from([(
        "web-connectivity".to_string(),
        "https://helper.discovered".to_string(),
    )]);
    let (bouncer, _) = ScriptedBouncer::succeeding(discovered);

    let (mut collaborators, _probes) = scripted_collaborators();
    collaborators.bouncer = Arc::new(bouncer);

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .add_input("https://example.com/")
        .set_option(options::NO_IP_LOOKUP, "true")
        .set_option(options::NO_RESOLVER_LOOKUP, "true")
        .set_option(options::NO_FILE_REPORT, "true");

    runner.run().await.unwrap();

    let ctx = seen.lock().clone().unwrap();
    assert_eq!(
        ctx.test_helper.as_deref(),
        Some("https://helper.discovered")
    );
}

#[tokio::test]
async fn test_background_start_reports_through_callback() {
    let nettest = RecordingNettest::new("ndt");
    let (collaborators, _probes) = scripted_collaborators();

    let (sender, receiver) = tokio::sync::oneshot::channel();

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .add_input("example.com")
        .set_option(options::NO_BOUNCER, "true")
        .set_option(options::NO_IP_LOOKUP, "true")
        .set_option(options::NO_RESOLVER_LOOKUP, "true")
        .set_option(options::NO_FILE_REPORT, "true");

    let handle = runner
        .start(move |summary| {
            let _ = sender.send(summary);
        })
        .unwrap();

    let summary = receiver.await.unwrap();
    handle.await.unwrap();

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.entries_emitted, 1);
    assert_eq!(runner.state(), RunState::Completed);

    // The configuration was consumed by the background execution.
    assert!(matches!(
        runner.start(|_| {}),
        Err(EngineError::AlreadyConsumed { .. })
    ));
}

#[tokio::test]
async fn test_input_files_merge_after_explicit_inputs() {
    use std::io::Write;

    let mut input_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(input_file, "from-file-1.example").unwrap();
    writeln!(input_file).unwrap();
    writeln!(input_file, "from-file-2.example").unwrap();

    let nettest = RecordingNettest::new("ndt");
    let seen = nettest.seen_context();
    let (collaborators, _probes) = scripted_collaborators();

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .add_input("explicit.example")
        .add_input_filepath(input_file.path())
        .add_input_filepath("/definitely/not/an/input/file")
        .set_option(options::NO_BOUNCER, "true")
        .set_option(options::NO_IP_LOOKUP, "true")
        .set_option(options::NO_RESOLVER_LOOKUP, "true")
        .set_option(options::NO_FILE_REPORT, "true");

    let summary = runner.run().await.unwrap();

    let ctx = seen.lock().clone().unwrap();
    assert_eq!(
        ctx.inputs,
        vec![
            "explicit.example",
            "from-file-1.example",
            "from-file-2.example"
        ]
    );

    // The unreadable file is a recorded soft failure, not an abort.
    let reasons: Vec<&str> = summary
        .failure
        .children()
        .iter()
        .map(Failure::reason)
        .collect();
    assert!(reasons.contains(&failures::FILE_ERROR));
}

#[tokio::test]
async fn test_measurement_body_failure_is_recorded() {
    let nettest =
        RecordingNettest::new("ndt").with_failure(Failure::new(failures::CONNECTION_RESET_ERROR));
    let (collaborators, _probes) = scripted_collaborators();

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .set_option(options::NO_BOUNCER, "true")
        .set_option(options::NO_IP_LOOKUP, "true")
        .set_option(options::NO_RESOLVER_LOOKUP, "true")
        .set_option(options::NO_FILE_REPORT, "true");

    let summary = runner.run().await.unwrap();

    assert!(summary.is_failure());
    let reasons: Vec<&str> = summary
        .failure
        .children()
        .iter()
        .map(Failure::reason)
        .collect();
    assert_eq!(reasons, vec![failures::CONNECTION_RESET_ERROR]);
}

#[tokio::test]
async fn test_panicking_callbacks_do_not_disturb_the_run() {
    let nettest = RecordingNettest::new("ndt");
    let runs = nettest.runs();
    let (collaborators, _probes) = scripted_collaborators();

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .add_input("example.com")
        .set_option(options::NO_BOUNCER, "true")
        .set_option(options::NO_IP_LOOKUP, "true")
        .set_option(options::NO_RESOLVER_LOOKUP, "true")
        .set_option(options::NO_FILE_REPORT, "true")
        .on_begin(|| panic!("begin observer bug"))
        .on_entry(|_| panic!("entry observer bug"))
        .on_end(|| panic!("end observer bug"));

    let summary = runner.run().await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.entries_emitted, 1);
    assert!(!summary.is_failure());
}

#[tokio::test]
async fn test_logger_observes_run_and_error_filepath_receives_lines() {
    let dir = tempfile::tempdir().unwrap();
    let error_log = dir.path().join("run.log");

    let nettest = RecordingNettest::new("ndt");
    let (collaborators, _probes) = scripted_collaborators();

    let progress_updates = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let events = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let logger = Logger::new();
    logger.set_verbosity(nettest_core::constants::verbosity::DEBUG);
    let sink = progress_updates.clone();
    logger.on_progress(move |fraction, label| sink.lock().push((fraction, label.to_string())));
    let sink = events.clone();
    logger.on_event(move |event| sink.lock().push(event.to_string()));

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .set_logger(logger)
        .set_error_filepath(&error_log)
        .add_input("example.com")
        .set_option(options::NO_BOUNCER, "true")
        .set_option(options::NO_IP_LOOKUP, "true")
        .set_option(options::NO_RESOLVER_LOOKUP, "true")
        .set_option(options::NO_FILE_REPORT, "true");

    runner.run().await.unwrap();

    // Progress went from start to completion in order.
    let updates = progress_updates.lock().clone();
    assert!(updates.len() >= 2);
    assert_eq!(updates.first().unwrap().0, 0.0);
    assert_eq!(updates.last().unwrap().0, 1.0);
    for pair in updates.windows(2) {
        assert!(pair[0].0 <= pair[1].0);
    }

    // Lifecycle events are well-formed JSON with the documented keys.
    let events = events.lock().clone();
    assert_eq!(events.len(), 2);
    let started: serde_json::Value = serde_json::from_str(&events[0]).unwrap();
    assert_eq!(started["key"], "status.started");
    let ended: serde_json::Value = serde_json::from_str(&events[1]).unwrap();
    assert_eq!(ended["key"], "status.ended");
    assert_eq!(ended["value"]["failure"], "");

    // The error filepath received formatted log lines.
    let logged = std::fs::read_to_string(&error_log).unwrap();
    assert!(logged.contains("resolved options for ndt"));
}

#[tokio::test]
#[allow(deprecated)]
async fn test_deprecated_aliases_delegate_to_logger() {
    let nettest = RecordingNettest::new("ndt");
    let (collaborators, _probes) = scripted_collaborators();

    let lines = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = lines.clone();

    let mut runner = TestRunner::new(Arc::new(nettest));
    runner
        .set_collaborators(collaborators)
        .set_verbosity(nettest_core::constants::verbosity::DEBUG)
        .on_log(move |_, line| sink.lock().push(line.to_string()))
        .set_option(options::NO_BOUNCER, "true")
        .set_option(options::NO_IP_LOOKUP, "true")
        .set_option(options::NO_RESOLVER_LOOKUP, "true")
        .set_option(options::NO_FILE_REPORT, "true");

    runner.run().await.unwrap();

    let lines = lines.lock();
    assert!(lines.iter().any(|line| line.contains("resolved options")));
}

#[tokio::test]
async fn test_shared_logger_across_concurrent_runs() {
    let lines = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = lines.clone();

    let logger = Logger::new();
    logger.set_verbosity(nettest_core::constants::verbosity::DEBUG);
    logger.on_log(move |_, line| sink.lock().push(line.to_string()));

    let mut handles = Vec::new();
    for _ in 0..3 {
        let nettest = RecordingNettest::new("ndt");
        let (collaborators, _probes) = scripted_collaborators();
        let mut runner = TestRunner::new(Arc::new(nettest));
        runner
            .set_collaborators(collaborators)
            .set_logger(logger.clone())
            .set_option(options::NO_BOUNCER, "true")
            .set_option(options::NO_IP_LOOKUP, "true")
            .set_option(options::NO_RESOLVER_LOOKUP, "true")
            .set_option(options::NO_FILE_REPORT, "true");
        handles.push(runner.start(|_| {}).unwrap());
    }

    for handle in handles {
        handle.await.unwrap();
    }

    // All three runs logged through the one shared logger.
    let logged = lines.lock();
    let option_dumps = logged
        .iter()
        .filter(|line| line.contains("resolved options"))
        .count();
    assert_eq!(option_dumps, 3);
}
