//! # Probe Metadata and Redaction
//!
//! The probe metadata record discovered during a run (public IP, ASN,
//! country code) and the retention policy applied to it before anything is
//! persisted or forwarded to observers.
//!
//! Redaction defaults to discard: unless the corresponding `save_probe_*`
//! option is explicitly truthy, discovered values are replaced with fixed
//! non-identifying sentinels, and the pre-redaction values are used only
//! transiently to drive the geo lookups.

use serde::{Deserialize, Serialize};

use crate::constants::options as option_keys;
use crate::constants::probe;
use crate::options::Options;

/// The probe IP/ASN/country triple attached to a result record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeMetadata {
    pub probe_ip: String,
    pub probe_asn: String,
    pub probe_cc: String,
}

impl Default for ProbeMetadata {
    fn default() -> Self {
        Self {
            probe_ip: probe::IP_SENTINEL.to_string(),
            probe_asn: probe::ASN_SENTINEL.to_string(),
            probe_cc: probe::CC_SENTINEL.to_string(),
        }
    }
}

impl ProbeMetadata {
    /// Apply the retention policy, replacing non-retained fields with the
    /// redaction sentinels.
    pub fn redact(&mut self, retention: RetentionPolicy) {
        if !retention.keep_ip {
            self.probe_ip = probe::IP_SENTINEL.to_string();
        }
        if !retention.keep_asn {
            self.probe_asn = probe::ASN_SENTINEL.to_string();
        }
        if !retention.keep_cc {
            self.probe_cc = probe::CC_SENTINEL.to_string();
        }
    }
}

/// Which discovered probe fields a run is allowed to retain.
///
/// The default retains nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub keep_ip: bool,
    pub keep_asn: bool,
    pub keep_cc: bool,
}

impl RetentionPolicy {
    /// Read the `save_probe_*` options.
    pub fn from_options(options: &Options) -> Self {
        Self {
            keep_ip: options.is_truthy(option_keys::SAVE_PROBE_IP),
            keep_asn: options.is_truthy(option_keys::SAVE_PROBE_ASN),
            keep_cc: options.is_truthy(option_keys::SAVE_PROBE_CC),
        }
    }
}
