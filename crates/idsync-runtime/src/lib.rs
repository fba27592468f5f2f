//! idsync Runtime
//!
//! Everything that talks to the outside world during reconciliation:
//!
//! | Module | Role |
//! |--------|------|
//! | [`provisioner`] | [`ProvisionerAdapter`] trait and the local snapshot-backed adapter |
//! | [`directory`] | Employee system of record |
//! | [`ingest`] | HR imports and employee updates, with audit and sync requests |
//! | [`orchestrator`] | Concurrent, fault-isolated sync runs and access reviews |
//! | [`runs`] | Run record persistence |
//! | [`scheduler`] | Timer- and event-driven runs |
//! | [`trigger`] | The sync request queue |

pub mod directory;
pub mod error;
pub mod ingest;
pub mod orchestrator;
pub mod provisioner;
pub mod review;
pub mod runs;
pub mod scheduler;
pub mod trigger;

pub use directory::{EmployeeDirectory, EmployeeUpdate, LocalDirectory, StatusChange, UpsertReport};
pub use error::{DirectoryError, IngestError, ProvisionerError, RunStoreError, SyncError};
pub use ingest::{HrIngestService, ImportReport};
pub use orchestrator::SyncOrchestrator;
pub use provisioner::{LocalProvisioner, ProvisionerAdapter};
pub use review::{AccessReview, Compliance};
pub use runs::{FileRunStore, InMemoryRunStore, RunStore};
pub use scheduler::Scheduler;
pub use trigger::{SyncCommand, SyncTrigger, TriggerReason};
