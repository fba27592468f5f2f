//! What-if analysis for proposed policy changes.

use crate::document::{Policy, PolicyUpdate};
use crate::error::PolicyError;
use crate::resolver::EntitlementResolver;
use idsync_core::{Action, Employee, EmploymentStatus, EntitlementSet};
use idsync_planner::{plan, PlanStats};
use serde::Serialize;

/// Number of employees sampled when no limit is given.
pub const DEFAULT_PREVIEW_SAMPLE: usize = 10;

/// How a proposed change would affect one employee.
#[derive(Debug, Clone, Serialize)]
pub struct EmployeeImpact {
    pub employee_id: String,
    pub email: String,
    pub department: Option<String>,
    pub original: EntitlementSet,
    pub proposed: EntitlementSet,
    /// Actions moving `original` to `proposed`.
    pub changes: Vec<Action>,
}

/// Result of [`preview_impact`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImpactReport {
    pub employees_tested: usize,
    pub employees_affected: usize,
    pub added: usize,
    pub removed: usize,
    pub impacts: Vec<EmployeeImpact>,
}

/// Compare desired entitlements under `current` and under `current` with
/// `update` applied, for up to `limit` active employees.
///
/// Nothing is saved; the proposed policy only lives for this call.
pub fn preview_impact(
    current: &Policy,
    update: &PolicyUpdate,
    employees: &[Employee],
    limit: usize,
) -> Result<ImpactReport, PolicyError> {
    let mut proposed = current.clone();
    update.apply_to(&mut proposed);
    proposed.validate()?;

    let resolver = EntitlementResolver::new();
    let mut report = ImpactReport::default();

    for employee in employees
        .iter()
        .filter(|e| e.status == EmploymentStatus::Active)
        .take(limit)
    {
        report.employees_tested += 1;

        let original = resolver.desired_for(employee, current);
        let new = resolver.desired_for(employee, &proposed);
        let changes = plan(&new, &original);
        if changes.is_empty() {
            continue;
        }

        let stats = PlanStats::of(&changes);
        report.employees_affected += 1;
        report.added += stats.adds;
        report.removed += stats.removes;
        report.impacts.push(EmployeeImpact {
            employee_id: employee.id.clone(),
            email: employee.email.clone(),
            department: employee.department.clone(),
            original,
            proposed: new,
            changes,
        });
    }

    tracing::debug!(
        tested = report.employees_tested,
        affected = report.employees_affected,
        "Previewed policy impact"
    );
    Ok(report)
}
