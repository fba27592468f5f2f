//! Audit logging configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Whether audit logging is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Echo every audit entry to stdout as well.
    #[serde(default)]
    pub stdout: bool,

    /// Directory holding `audit.log` (JSON Lines).
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Mask employee emails inside audit details.
    #[serde(default = "default_enabled")]
    pub mask_emails: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            stdout: false,
            directory: default_directory(),
            mask_emails: default_enabled(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_directory() -> PathBuf {
    PathBuf::from(".idsync/audit")
}
