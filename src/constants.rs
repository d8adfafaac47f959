//! # System Constants
//!
//! Stable string namespaces and numeric levels that define the external
//! contract of the measurement engine: option keys, failure strings,
//! redaction sentinels, and log severity levels.
//!
//! Option keys and failure strings are append-only namespaces. Adding a
//! constant is backward compatible; renaming a constant is an API break;
//! changing the string a constant maps to is a silent behavior break and
//! must be avoided.

/// Option keys consulted by the orchestrator during a run.
///
/// Boolean-like keys are truthy only for the exact string `"true"`
/// (see [`crate::options::Options::is_truthy`]). String-valued keys
/// short-circuit the corresponding discovery phase when present.
pub mod options {
    /// Skip the bouncer query phase entirely.
    pub const NO_BOUNCER: &str = "no_bouncer";

    /// Base URL of the bouncer to query for collector/helper endpoints.
    pub const BOUNCER_BASE_URL: &str = "bouncer_base_url";

    /// Promote a bouncer-query failure from soft to hard.
    pub const FAIL_IF_BOUNCER_FAILS: &str = "fail_if_bouncer_fails";

    /// Explicit collector base URL, overriding whatever the bouncer found.
    pub const COLLECTOR_BASE_URL: &str = "collector_base_url";

    /// Skip the probe IP lookup phase.
    pub const NO_IP_LOOKUP: &str = "no_ip_lookup";

    /// Promote a probe-IP-lookup failure from soft to hard.
    pub const FAIL_IF_IP_LOOKUP_FAILS: &str = "fail_if_ip_lookup_fails";

    /// Path of the GeoIP country database. Country lookup runs only when set.
    pub const GEOIP_COUNTRY_PATH: &str = "geoip_country_path";

    /// Path of the GeoIP ASN database. ASN lookup runs only when set.
    pub const GEOIP_ASN_PATH: &str = "geoip_asn_path";

    /// Retain the discovered probe IP instead of redacting it.
    pub const SAVE_PROBE_IP: &str = "save_probe_ip";

    /// Retain the discovered probe ASN instead of redacting it.
    pub const SAVE_PROBE_ASN: &str = "save_probe_asn";

    /// Retain the discovered probe country code instead of redacting it.
    pub const SAVE_PROBE_CC: &str = "save_probe_cc";

    /// Skip the resolver IP lookup phase.
    pub const NO_RESOLVER_LOOKUP: &str = "no_resolver_lookup";

    /// Promote a resolver-lookup failure from soft to hard.
    pub const FAIL_IF_RESOLVER_LOOKUP_FAILS: &str = "fail_if_resolver_lookup_fails";

    /// Skip opening the report file; entries are only streamed to callbacks.
    pub const NO_FILE_REPORT: &str = "no_file_report";

    /// Promote a report-file-open failure from soft to hard.
    pub const FAIL_IF_OPEN_FILE_REPORT_FAILS: &str = "fail_if_open_file_report_fails";

    /// Nameserver the DNS engine should use, where the engine supports it.
    pub const DNS_NAMESERVER_HINT: &str = "dns/nameserver";

    /// DNS engine selector. Passed through to the resolver collaborator.
    pub const DNS_ENGINE: &str = "dns/engine";

    /// Name of the software running the measurement, reported to the bouncer.
    pub const SOFTWARE_NAME: &str = "software_name";

    /// Version of the software running the measurement.
    pub const SOFTWARE_VERSION: &str = "software_version";

    /// Derive the per-test helper override key for a test name.
    ///
    /// Setting `web_connectivity/helper` overrides the helper endpoint the
    /// bouncer discovered for the `web_connectivity` test.
    pub fn test_helper_key(test_name: &str) -> String {
        format!("{test_name}/helper")
    }
}

/// Failure strings reportable through [`crate::failure::Failure`].
///
/// `COMPOSITE_FAILURE` is reserved for composite nodes and never used for
/// a leaf failure.
pub mod failures {
    /// An operation did not complete within its own deadline.
    pub const GENERIC_TIMEOUT_ERROR: &str = "generic_timeout_error";

    /// The remote side closed the stream before the operation finished.
    pub const EOF_ERROR: &str = "eof_error";

    /// Aggregation of multiple sub-attempt failures.
    pub const COMPOSITE_FAILURE: &str = "composite_failure";

    /// The connection was reset by the remote side.
    pub const CONNECTION_RESET_ERROR: &str = "connection_reset_error";

    /// A DNS lookup did not produce a usable answer.
    pub const DNS_LOOKUP_ERROR: &str = "dns_lookup_error";

    /// A payload could not be parsed as the expected JSON document.
    pub const JSON_PARSE_ERROR: &str = "json_parse_error";

    /// A local file could not be opened, read, or written.
    pub const FILE_ERROR: &str = "file_error";

    /// The requested operation has no configured collaborator.
    pub const NOT_SUPPORTED: &str = "not_supported";

    /// A failure that does not map to any better string.
    pub const UNKNOWN_ERROR: &str = "unknown_error";
}

/// Redaction sentinels for probe metadata.
///
/// These are the values persisted in place of discovered metadata unless
/// the corresponding `save_probe_*` option is explicitly truthy.
pub mod probe {
    /// Sentinel replacing the probe IP.
    pub const IP_SENTINEL: &str = "127.0.0.1";

    /// Sentinel replacing the probe ASN.
    pub const ASN_SENTINEL: &str = "AS0";

    /// Sentinel replacing the probe country code.
    pub const CC_SENTINEL: &str = "ZZ";
}

/// Log severity levels understood by [`crate::logger::Logger`].
///
/// Higher value means chattier. A line is delivered only when its level is
/// less than or equal to the configured verbosity.
pub mod verbosity {
    pub const WARNING: u32 = 0;
    pub const INFO: u32 = 1;
    pub const DEBUG: u32 = 2;
    pub const DEBUG2: u32 = 3;
}

/// Engine-wide identity constants.
pub mod system {
    /// Default software name reported to the bouncer.
    pub const ENGINE_NAME: &str = "nettest-core-rs";

    /// Default software version reported to the bouncer.
    pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
}
