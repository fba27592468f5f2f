use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    /// The log file exists but its cache could not be populated.
    #[error("could not open audit log: {0}")]
    Open(String),

    /// An in-memory index lock was poisoned by a panicking writer.
    #[error("audit index unavailable: {0}")]
    Poisoned(String),

    #[error("audit entry encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("audit log I/O: {0}")]
    Io(#[from] std::io::Error),
}
