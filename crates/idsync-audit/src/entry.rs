//! Audit entry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Action names recorded in the audit trail.
pub mod actions {
    // ===== Policy mutations =====
    pub const POLICY_UPDATE: &str = "policy_update";
    pub const POLICY_RELOAD: &str = "policy_reload";
    pub const ROLE_UPSERT: &str = "role_upsert";
    pub const ROLE_DELETE: &str = "role_delete";
    pub const RULE_ADD: &str = "rule_add";
    pub const RULE_DELETE: &str = "rule_delete";

    // ===== Employee data =====
    pub const HR_IMPORT: &str = "hr_import";
    pub const HR_IMPORT_FAILED: &str = "hr_import_failed";
    pub const USER_BULK_UPDATE: &str = "user_bulk_update";
    pub const EMPLOYEE_UPDATE: &str = "employee_update";

    // ===== Reconciliation =====
    pub const SYNC_RUN: &str = "sync_run";
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID.
    pub entry_id: Uuid,

    /// When the change happened.
    pub timestamp: DateTime<Utc>,

    /// Who made the change.
    pub actor: String,

    /// What was done (one of [`actions`]).
    pub action: String,

    /// Kind of entity touched (`policy`, `role`, `rule`, `employee_table`, `run`, ...).
    pub entity_type: String,

    /// Identifier of the entity touched.
    pub entity_id: String,

    /// Free-form details.
    #[serde(default)]
    pub details: serde_json::Value,

    /// Whether the change succeeded.
    pub success: bool,
}

impl AuditEntry {
    /// Create a successful entry with empty details.
    pub fn new(
        actor: impl Into<String>,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: actor.into(),
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            details: serde_json::Value::Null,
            success: true,
        }
    }

    /// Create a builder for an audit entry.
    pub fn builder(
        actor: impl Into<String>,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> AuditEntryBuilder {
        AuditEntryBuilder {
            entry: Self::new(actor, action, entity_type, entity_id),
        }
    }

    /// Format the entry as a human-readable log line.
    ///
    /// Format: `[timestamp] action actor=... entity=type/id success=...`
    pub fn to_log_line(&self) -> String {
        let mut line = format!(
            "[{}] {} actor={} entity={}/{} success={}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.action,
            self.actor,
            self.entity_type,
            self.entity_id,
            self.success,
        );
        if !self.details.is_null() {
            line.push_str(&format!(" details={}", self.details));
        }
        line
    }
}

/// Builder for [`AuditEntry`].
pub struct AuditEntryBuilder {
    entry: AuditEntry,
}

impl AuditEntryBuilder {
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.entry.details = details;
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.entry.success = success;
        self
    }

    pub fn failed(self) -> Self {
        self.success(false)
    }

    pub fn build(self) -> AuditEntry {
        self.entry
    }
}
