//! idsync Policy
//!
//! Maps an employee's HR attributes to the entitlements they should hold:
//!
//! - [`Policy`]: role grants keyed by department plus ordered conditional rules
//! - [`RuleEvaluator`]: the restricted `field == "literal"` predicate language
//! - [`EntitlementResolver`]: role + rule grants into one desired set, with
//!   termination overriding everything
//! - [`PolicyStore`]: the persisted document, updated copy-on-write
//! - [`preview_impact`]: what-if analysis for a proposed update

pub mod document;
pub mod error;
pub mod preview;
pub mod resolver;
pub mod rules;
pub mod store;

pub use document::{ConditionalRule, Grant, Policy, PolicyUpdate};
pub use error::{PolicyError, RuleEvaluationError};
pub use preview::{preview_impact, EmployeeImpact, ImpactReport, DEFAULT_PREVIEW_SAMPLE};
pub use resolver::{rule_context, EntitlementResolver};
pub use rules::{Comparison, Predicate, RuleContext, RuleEvaluator};
pub use store::{load_document, save_document, PolicyStore, UpdateReport};
