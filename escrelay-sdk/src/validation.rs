//! Field-scoped validation failures.
//!
//! A schema check never stops at the first problem: it collects one
//! [`Violation`] per offending field so callers can report every field at
//! once.

use serde::{Deserialize, Serialize};

/// One failed constraint on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Dotted path of the field. Empty for the record itself.
    pub path: String,
    /// Human-readable description of the constraint.
    pub expected: String,
    /// The value that was received, or `None` when the field was absent.
    pub received: Option<serde_json::Value>,
}

impl Violation {
    pub fn new(
        path: impl Into<String>,
        expected: impl Into<String>,
        received: Option<&serde_json::Value>,
    ) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
            received: received.cloned(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = if self.path.is_empty() {
            "<root>"
        } else {
            &self.path
        };
        match &self.received {
            Some(value) => write!(f, "{path}: expected {}, received {value}", self.expected),
            None => write!(f, "{path}: expected {}, received nothing", self.expected),
        }
    }
}

/// A non-empty list of violations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub violations: Vec<Violation>,
}

impl ValidationErrors {
    /// Whether any violation was reported for `path`.
    pub fn has_field(&self, path: &str) -> bool {
        self.violations.iter().any(|v| v.path == path)
    }

    /// Violations reported for `path`.
    pub fn field(&self, path: &str) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.path == path)
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation failed")?;
        for (i, violation) in self.violations.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
