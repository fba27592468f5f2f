//! Shared types for idsync.
//!
//! Everything that crosses a crate boundary lives here: the HR-facing
//! [`Employee`] record, the [`EntitlementSet`] shape used for both desired
//! and current state, reconciliation [`Action`]s, and the [`Run`] record a
//! sync produces. The [`config`] module holds the YAML configuration layer.

// Configuration types shared across all idsync crates
pub mod config;

pub mod action;
pub mod employee;
pub mod entitlement;
pub mod run;

pub use action::{Action, ActionKind};
pub use config::{AuditConfig, ConfigError, IdsyncConfig, ProvisionerConfig, SyncConfig};
pub use employee::{Employee, EmploymentStatus, UnknownStatus};
pub use entitlement::EntitlementSet;
pub use run::{EmployeeOutcome, EmployeeResult, Run, RunSummary};
