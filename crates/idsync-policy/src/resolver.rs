//! Desired-entitlement resolution.

use crate::document::Policy;
use crate::rules::{RuleContext, RuleEvaluator};
use idsync_core::{Employee, EntitlementSet};

/// Attributes exposed to rule predicates.
pub const CONTEXT_FIELDS: [&str; 5] = ["location", "employment_type", "department", "title", "status"];

/// Computes an employee's desired entitlements from a policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntitlementResolver {
    evaluator: RuleEvaluator,
}

impl EntitlementResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Desired entitlements for `employee` under `policy`.
    ///
    /// Terminated employees get an empty list for every known system, no
    /// matter what their department or rules would otherwise grant. For
    /// everyone else the department's role grant and every matching rule
    /// are unioned; rules are cumulative and evaluated in declared order.
    pub fn desired_for(&self, employee: &Employee, policy: &Policy) -> EntitlementSet {
        let mut desired = policy.empty_entitlements();

        if employee.is_terminated() {
            return desired;
        }

        if let Some(grant) = employee
            .department
            .as_deref()
            .and_then(|dept| policy.roles.get(dept.trim()))
        {
            grant.apply_to(&mut desired);
        }

        let context = rule_context(employee);
        for (index, rule) in policy.rules.iter().enumerate() {
            if self.evaluator.evaluate(&rule.when, &context) {
                tracing::trace!(employee = %employee.id, rule = index, "Rule matched");
                rule.grant.apply_to(&mut desired);
            }
        }

        desired
    }
}

/// Build the predicate context for an employee.
pub fn rule_context(employee: &Employee) -> RuleContext {
    RuleContext::from([
        ("location".to_string(), employee.location.clone()),
        ("employment_type".to_string(), employee.employment_type.clone()),
        ("department".to_string(), employee.department.clone()),
        ("title".to_string(), employee.title.clone()),
        ("status".to_string(), Some(employee.status.as_str().to_string())),
    ])
}
