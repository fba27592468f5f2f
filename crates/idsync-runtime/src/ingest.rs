//! HR data ingestion.
//!
//! Imports and single-employee updates land in the [`LocalDirectory`], are
//! audited, and request a reconciliation pass through the [`SyncTrigger`].
//! A termination always requests a live pass so access is revoked without
//! waiting for the next schedule.

use crate::directory::{EmployeeUpdate, LocalDirectory, StatusChange};
use crate::error::IngestError;
use crate::trigger::{SyncCommand, SyncTrigger, TriggerReason};
use idsync_audit::{actions, AuditLogger};
use idsync_core::Employee;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Outcome of one import batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub records: usize,
    pub created: usize,
    pub updated: usize,
    pub newly_terminated: Vec<String>,
    /// Whether the follow-up sync request was queued.
    pub sync_requested: bool,
}

pub struct HrIngestService {
    directory: Arc<LocalDirectory>,
    audit: Arc<AuditLogger>,
    trigger: SyncTrigger,
}

impl HrIngestService {
    pub fn new(directory: Arc<LocalDirectory>, audit: Arc<AuditLogger>, trigger: SyncTrigger) -> Self {
        Self {
            directory,
            audit,
            trigger,
        }
    }

    /// Import records from a JSON array file.
    pub async fn import_file(&self, actor: &str, path: &Path) -> Result<ImportReport, IngestError> {
        let source = path.display().to_string();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                let err = IngestError::from(e);
                self.record_failure(actor, &source, &err).await?;
                return Err(err);
            }
        };
        self.import_json(actor, &source, &content).await
    }

    /// Import records from a JSON array of employees.
    pub async fn import_json(&self, actor: &str, source: &str, json: &str) -> Result<ImportReport, IngestError> {
        match serde_json::from_str::<Vec<Employee>>(json) {
            Ok(records) => self.import(actor, source, records).await,
            Err(e) => {
                let err = IngestError::from(e);
                self.record_failure(actor, source, &err).await?;
                Err(err)
            }
        }
    }

    /// Upsert `records` by employee id and request a sync.
    ///
    /// The batch is rejected as a whole if any record is invalid.
    pub async fn import(&self, actor: &str, source: &str, records: Vec<Employee>) -> Result<ImportReport, IngestError> {
        if let Err(err) = validate(&records) {
            self.record_failure(actor, source, &err).await?;
            return Err(err);
        }

        let count = records.len();
        let upserted = match self.directory.upsert_many(records) {
            Ok(report) => report,
            Err(e) => {
                let err = IngestError::from(e);
                self.record_failure(actor, source, &err).await?;
                return Err(err);
            }
        };

        self.audit
            .record(
                actor,
                actions::HR_IMPORT,
                "hr_source",
                source,
                json!({ "records": count }),
                true,
            )
            .await?;

        self.audit
            .record(
                actor,
                actions::USER_BULK_UPDATE,
                "employee",
                "*",
                json!({
                    "created": upserted.created,
                    "updated": upserted.updated,
                    "terminated": upserted.newly_terminated,
                }),
                true,
            )
            .await?;

        // A dry run shows what the import would change; a termination in the
        // batch makes the follow-up pass live.
        let dry_run = upserted.newly_terminated.is_empty();
        let sync_requested = self.request_sync(SyncCommand::new(
            dry_run,
            actor,
            TriggerReason::HrImport { records: count },
        ));

        tracing::info!(
            source,
            records = count,
            created = upserted.created,
            updated = upserted.updated,
            terminated = upserted.newly_terminated.len(),
            "Imported HR records"
        );

        Ok(ImportReport {
            records: count,
            created: upserted.created,
            updated: upserted.updated,
            newly_terminated: upserted.newly_terminated,
            sync_requested,
        })
    }

    /// Patch one employee. Moving an employee to `Terminated` queues a live
    /// sync.
    pub async fn update_employee(
        &self,
        actor: &str,
        employee_id: &str,
        update: &EmployeeUpdate,
    ) -> Result<StatusChange, IngestError> {
        let change = self.directory.update(employee_id, update)?;

        self.audit
            .record(
                actor,
                actions::EMPLOYEE_UPDATE,
                "employee",
                employee_id,
                json!({
                    "identity": self.audit.identity(&change.employee.email),
                    "previous_status": change.previous,
                    "status": change.employee.status,
                }),
                true,
            )
            .await?;

        if change.terminated() {
            tracing::warn!(employee = employee_id, "Employee terminated, requesting live sync");
            self.request_sync(SyncCommand::new(
                false,
                actor,
                TriggerReason::Termination {
                    employee_id: employee_id.to_string(),
                },
            ));
        }

        Ok(change)
    }

    fn request_sync(&self, command: SyncCommand) -> bool {
        match self.trigger.emit(command) {
            Ok(()) => true,
            Err(e) => {
                // The scheduled pass still converges; the request is best effort.
                tracing::warn!(error = %e, "Could not queue sync request");
                false
            }
        }
    }

    async fn record_failure(&self, actor: &str, source: &str, err: &IngestError) -> Result<(), IngestError> {
        tracing::error!(source, error = %err, "HR import failed");
        self.audit
            .record(
                actor,
                actions::HR_IMPORT_FAILED,
                "hr_source",
                source,
                json!({ "error": err.to_string() }),
                false,
            )
            .await?;
        Ok(())
    }
}

fn validate(records: &[Employee]) -> Result<(), IngestError> {
    let mut seen = HashSet::new();
    for (index, record) in records.iter().enumerate() {
        if record.id.trim().is_empty() {
            return Err(IngestError::Validation(format!("record {index} has an empty id")));
        }
        if !record.email.contains('@') {
            return Err(IngestError::Validation(format!(
                "employee '{}' has an invalid email",
                record.id
            )));
        }
        if !seen.insert(record.id.as_str()) {
            return Err(IngestError::Validation(format!(
                "employee '{}' appears more than once",
                record.id
            )));
        }
    }
    Ok(())
}
