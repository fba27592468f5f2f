//! Point-in-time access review for one employee.

use idsync_core::{Action, EmploymentStatus, EntitlementSet};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Compliance {
    Compliant,
    NeedsChanges,
}

impl fmt::Display for Compliance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compliant => write!(f, "compliant"),
            Self::NeedsChanges => write!(f, "needs_changes"),
        }
    }
}

/// Desired versus actual access, without changing anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessReview {
    pub employee_id: String,
    pub identity: String,
    pub status: EmploymentStatus,
    pub desired: EntitlementSet,
    pub current: EntitlementSet,
    /// Actions a live sync would take right now.
    pub changes: Vec<Action>,
    pub compliance: Compliance,
}

impl AccessReview {
    pub fn new(
        employee_id: String,
        identity: String,
        status: EmploymentStatus,
        desired: EntitlementSet,
        current: EntitlementSet,
    ) -> Self {
        let changes = idsync_planner::plan(&desired, &current);
        let compliance = if changes.is_empty() {
            Compliance::Compliant
        } else {
            Compliance::NeedsChanges
        };
        Self {
            employee_id,
            identity,
            status,
            desired,
            current,
            changes,
            compliance,
        }
    }
}
