//! # Option Resolution
//!
//! A string-keyed, string-valued option mapping consulted read-only during
//! orchestration. Lookup never fails: an unrecognized key is simply absent,
//! and every key has documented default-if-absent semantics (see
//! [`crate::constants::options`]).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The option mapping for a single test run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    values: HashMap<String, String>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option, replacing any previous value for the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// The value for a key, absent when never set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The value for a key, or the given default when absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Whether a boolean-like option is enabled.
    ///
    /// Only the exact string `"true"` is truthy. Anything else, including
    /// `"1"`, `"TRUE"`, and absence, is false.
    pub fn is_truthy(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }

    /// Whether a key has been set at all, regardless of its value.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterate over all `(key, value)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<HashMap<String, String>> for Options {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Options {
    fn from(pairs: [(&str, &str); N]) -> Self {
        let mut options = Options::new();
        for (key, value) in pairs {
            options.set(key, value);
        }
        options
    }
}
