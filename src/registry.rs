//! # Test Registry
//!
//! The catalogue of test types the engine knows how to orchestrate. Each
//! descriptor carries the identity the orchestrator reports to the bouncer
//! and the metadata driving per-test behavior: whether the test consumes
//! input and which helper endpoint, if any, it relies on.
//!
//! The registry is thread-safe and shared: embedding applications may look
//! up descriptors while runs are executing.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Identity and orchestration metadata for one test type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDescriptor {
    /// Stable test name, also the key under which the descriptor registers.
    pub name: String,

    /// Test version reported to the bouncer.
    pub version: String,

    /// Name of the helper endpoint this test relies on, if any. Used to
    /// select the helper from bouncer results and to derive the per-test
    /// helper override option key.
    pub test_helper: Option<String>,

    /// Whether the test consumes an input list.
    pub needs_input: bool,
}

impl TestDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            test_helper: None,
            needs_input: false,
        }
    }

    pub fn with_helper(mut self, helper: impl Into<String>) -> Self {
        self.test_helper = Some(helper.into());
        self
    }

    pub fn with_input(mut self) -> Self {
        self.needs_input = true;
        self
    }
}

/// Thread-safe registry of test descriptors keyed by test name.
#[derive(Debug, Default)]
pub struct TestRegistry {
    descriptors: DashMap<String, TestDescriptor>,
}

impl TestRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in test catalogue.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        for descriptor in builtin_descriptors() {
            registry.register(descriptor);
        }
        registry
    }

    /// Register a descriptor, replacing any previous one with the same name.
    pub fn register(&self, descriptor: TestDescriptor) {
        self.descriptors.insert(descriptor.name.clone(), descriptor);
    }

    /// Look up a descriptor by test name.
    pub fn get(&self, name: &str) -> Option<TestDescriptor> {
        self.descriptors.get(name).map(|entry| entry.clone())
    }

    /// All registered test names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .descriptors
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn builtin_descriptors() -> Vec<TestDescriptor> {
    vec![
        TestDescriptor::new("captive_portal", "0.4.0"),
        TestDescriptor::new("dash", "0.7.0"),
        TestDescriptor::new("dns_injection", "0.1.0").with_input(),
        TestDescriptor::new("facebook_messenger", "0.2.0"),
        TestDescriptor::new("http_header_field_manipulation", "0.2.0")
            .with_helper("http-return-json-headers"),
        TestDescriptor::new("http_invalid_request_line", "0.3.0").with_helper("tcp-echo"),
        TestDescriptor::new("meek_fronted_requests", "0.1.0").with_input(),
        TestDescriptor::new("multi_ndt", "0.1.0"),
        TestDescriptor::new("ndt", "0.1.0"),
        TestDescriptor::new("tcp_connect", "0.2.0").with_input(),
        TestDescriptor::new("telegram", "0.5.0"),
        TestDescriptor::new("web_connectivity", "0.0.1")
            .with_helper("web-connectivity")
            .with_input(),
    ]
}
