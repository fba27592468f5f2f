//! Error types for policy loading, mutation and rule evaluation.

use idsync_audit::AuditError;
use thiserror::Error;

/// Errors raised by the policy store and document handling.
///
/// Any of these on load means a sync run cannot proceed.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("IO error on policy document: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed policy document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid policy: {0}")]
    Invalid(String),

    #[error("role mapping for '{0}' not found")]
    RoleNotFound(String),

    #[error("rule at index {index} not found ({len} rules defined)")]
    RuleNotFound { index: usize, len: usize },

    #[error("policy lock poisoned")]
    LockPoisoned,

    #[error("audit failure: {0}")]
    Audit(#[from] AuditError),
}

/// Why a predicate could not be evaluated.
///
/// Never surfaced by [`crate::RuleEvaluator::evaluate`], which treats every
/// one of these as `false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleEvaluationError {
    #[error("empty predicate")]
    Empty,

    #[error("unsupported predicate syntax: {0}")]
    UnsupportedSyntax(String),
}
