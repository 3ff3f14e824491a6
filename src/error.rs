use std::fmt::{Display, Formatter, Result as FmtResult};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::DenyReason;

/// One offending attribute (or scope element) found while validating
/// something against the schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Violation {
    /// Dotted path of the offending attribute, e.g. `tasks.name`, or the
    /// scope slot (`principal`, `action`, `resource`) for policies.
    pub path: String,
    pub problem: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, problem: impl Into<String>) -> Self {
        Violation {
            path: path.into(),
            problem: problem.into(),
        }
    }
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}: {}", self.path, self.problem)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyError {
    #[error("failed to parse schema: {0}")]
    SchemaParseError(String),

    #[error("failed to parse policy: {0}")]
    PolicyParseError(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("entity type {0} is already registered")]
    DuplicateType(String),

    #[error("action {0} is already registered")]
    DuplicateAction(String),

    #[error("policy {0} already exists")]
    DuplicatePolicy(String),

    #[error("unknown entity type: {0}")]
    UnknownType(String),

    #[error("action {action} references unregistered entity type {type_name}")]
    UnknownEntityTypeRef { action: String, type_name: String },

    #[error(
        "schema violation in {subject}: {}",
        .violations.iter().join("; ")
    )]
    SchemaViolation {
        subject: String,
        violations: Vec<Violation>,
    },

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("unknown policy: {0}")]
    UnknownPolicy(String),

    #[error("adding {parent} as parent of {child} would create a cycle")]
    CycleDetected { child: String, parent: String },

    #[error("hierarchy traversal from {from} exceeded the maximum depth of {limit}")]
    HierarchyTooDeep { from: String, limit: usize },

    #[error("access denied: {0}")]
    AuthDenied(DenyReason),

    #[error("Poisoned lock error: {0}")]
    PoisonedLockError(String),
}

impl PolicyError {
    pub(crate) fn violation(subject: impl Display, violations: Vec<Violation>) -> Self {
        PolicyError::SchemaViolation {
            subject: subject.to_string(),
            violations,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for PolicyError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        PolicyError::PoisonedLockError(err.to_string())
    }
}

impl From<serde_json::Error> for PolicyError {
    fn from(err: serde_json::Error) -> Self {
        PolicyError::InvalidFormat(err.to_string())
    }
}
