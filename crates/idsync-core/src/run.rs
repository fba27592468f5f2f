//! Sync run records.
//!
//! A [`Run`] is created when a sync starts and completed exactly once when
//! every employee has been processed. Runs are never deleted.

use crate::{Action, EmploymentStatus, EntitlementSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How processing went for one employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EmployeeOutcome {
    Succeeded,
    /// Fetch or apply failed for at least one system.
    Failed { error: String },
    /// The run was cancelled before this employee was scheduled.
    Cancelled,
}

impl EmployeeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Per-employee entry in a run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeResult {
    pub employee_id: String,
    /// Identity used against target systems (the employee's email).
    pub identity: String,
    pub status: EmploymentStatus,
    pub desired: EntitlementSet,
    pub current: EntitlementSet,
    pub plan: Vec<Action>,
    /// Actions handed to adapters. Always empty on dry runs.
    #[serde(default)]
    pub applied: Vec<Action>,
    /// Terminated and still holding access when the run observed them.
    pub access_cleared: bool,
    pub outcome: EmployeeOutcome,
}

/// Aggregate counts plus every per-employee result, in directory order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub access_cleared: usize,
    pub terminated_processed: usize,
    pub actions_planned: usize,
    pub actions_applied: usize,
    pub results: Vec<EmployeeResult>,
}

impl RunSummary {
    pub fn from_results(results: Vec<EmployeeResult>) -> Self {
        let mut summary = Self {
            processed: results.len(),
            ..Default::default()
        };

        for result in &results {
            match result.outcome {
                EmployeeOutcome::Succeeded => summary.succeeded += 1,
                EmployeeOutcome::Failed { .. } => summary.failed += 1,
                EmployeeOutcome::Cancelled => summary.cancelled += 1,
            }
            if result.access_cleared {
                summary.access_cleared += 1;
            }
            if result.status.is_terminated() {
                summary.terminated_processed += 1;
            }
            summary.actions_planned += result.plan.len();
            summary.actions_applied += result.applied.len();
        }

        summary.results = results;
        summary
    }

    pub fn result_for(&self, employee_id: &str) -> Option<&EmployeeResult> {
        self.results.iter().find(|r| r.employee_id == employee_id)
    }
}

/// One reconciliation pass over all employees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    /// `None` while the run is in flight.
    pub completed_at: Option<DateTime<Utc>>,
    pub actor: String,
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

impl Run {
    pub fn start(actor: impl Into<String>, dry_run: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            completed_at: None,
            actor: actor.into(),
            dry_run,
            summary: None,
        }
    }

    pub fn complete(&mut self, summary: RunSummary) {
        self.completed_at = Some(Utc::now());
        self.summary = Some(summary);
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}
