//! Error types for the runtime.

use idsync_audit::AuditError;
use idsync_policy::PolicyError;
use std::time::Duration;
use thiserror::Error;

/// Failure talking to one target system for one identity.
///
/// Recorded in that employee's result; never aborts a run.
#[derive(Debug, Error)]
pub enum ProvisionerError {
    #[error("{system} unavailable: {reason}")]
    Unavailable { system: String, reason: String },

    #[error("{system} did not respond within {timeout:?}")]
    Timeout { system: String, timeout: Duration },

    #[error("{system} rejected the request: {reason}")]
    Rejected { system: String, reason: String },

    #[error("{system} state error: {source}")]
    State {
        system: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Failure reading the system of record.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("employee directory unavailable: {0}")]
    Unavailable(String),

    #[error("employee '{0}' not found")]
    NotFound(String),
}

/// Failure persisting or reading run records.
#[derive(Debug, Error)]
pub enum RunStoreError {
    #[error("run {0} already exists")]
    Duplicate(uuid::Uuid),

    #[error("run {0} not found")]
    NotFound(uuid::Uuid),

    #[error("run {0} is already complete")]
    AlreadyCompleted(uuid::Uuid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that abort a whole sync run or a management operation.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("policy unavailable: {0}")]
    Policy(#[from] PolicyError),

    #[error("run store unavailable: {0}")]
    RunStore(#[from] RunStoreError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Provisioner(#[from] ProvisionerError),

    #[error("audit failure: {0}")]
    Audit(#[from] AuditError),
}

/// Errors raised at the HR ingestion boundary.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid employee record: {0}")]
    Validation(String),

    #[error("could not read HR records: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse HR records: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("audit failure: {0}")]
    Audit(#[from] AuditError),
}
