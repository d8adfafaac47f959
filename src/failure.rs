//! # Failure Model
//!
//! The [`Failure`] value represents the outcome of a measurement operation:
//! either "no failure" or a named failure, optionally composed of the
//! failures of several sub-attempts.
//!
//! A `Failure` is a pure value. There is no global error state behind it:
//! the same low-level condition (say, a connection reset) may be a hard
//! failure for a performance test and an interesting observation for a
//! censorship test, so each phase decides independently whether to escalate
//! a raw condition into a `Failure`.
//!
//! Composite failures let a multi-attempt operation (connecting to every
//! resolved address, querying several lookup services) report all
//! sub-outcomes without collapsing information, while still behaving as a
//! single string for callers that only check whether the run failed.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::failures;

/// The failure reported by a measurement operation, possibly composite.
///
/// Constructed once at the point an operation completes and immutable
/// thereafter; aggregation wraps failures into a new composite parent
/// instead of mutating them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Failure>,
}

impl Failure {
    /// The failure representing "no failure occurred".
    pub fn none() -> Self {
        Self::default()
    }

    /// A leaf failure with the given reason string.
    ///
    /// Reason strings come from [`crate::constants::failures`]; an empty
    /// reason is equivalent to [`Failure::none`]. `composite_failure` is
    /// reserved for [`Failure::compose`] and must not be used here.
    pub fn new(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        debug_assert_ne!(reason, failures::COMPOSITE_FAILURE);
        Self {
            reason,
            children: Vec::new(),
        }
    }

    /// Aggregate the outcomes of several sub-attempts.
    ///
    /// Falsy children are dropped. When every child is falsy the result is
    /// [`Failure::none`]; otherwise the result is a `composite_failure`
    /// whose children are the truthy subset in their original order, even
    /// when only one child survives.
    pub fn compose(children: impl IntoIterator<Item = Failure>) -> Self {
        let truthy: Vec<Failure> = children.into_iter().filter(Failure::is_failure).collect();
        if truthy.is_empty() {
            Self::none()
        } else {
            Self {
                reason: failures::COMPOSITE_FAILURE.to_string(),
                children: truthy,
            }
        }
    }

    /// Whether a failure actually occurred.
    pub fn is_failure(&self) -> bool {
        !self.reason.is_empty()
    }

    /// The failure string, empty when no failure occurred.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// The sub-attempt failures of a composite, empty for leaves.
    pub fn children(&self) -> &[Failure] {
        &self.children
    }

    /// The failure including all child failures, as a serialized JSON value.
    ///
    /// For a leaf this is just the reason string; for no failure it is the
    /// empty string. The projection is recomputed from `reason` and
    /// `children` on every call and is deterministic: the same failure
    /// always serializes to the same bytes.
    pub fn detailed_reason(&self) -> String {
        if self.children.is_empty() {
            return self.reason.clone();
        }
        self.detailed_value().to_string()
    }

    fn detailed_value(&self) -> Value {
        if self.children.is_empty() {
            return Value::String(self.reason.clone());
        }
        json!({
            "failure": self.reason,
            "child_failures": self
                .children
                .iter()
                .map(Failure::detailed_value)
                .collect::<Vec<Value>>(),
        })
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl From<&str> for Failure {
    fn from(reason: &str) -> Self {
        if reason.is_empty() {
            Self::none()
        } else {
            Self::new(reason)
        }
    }
}
