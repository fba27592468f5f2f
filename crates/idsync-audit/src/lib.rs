//! # idsync-audit
//!
//! Append-only audit trail for idsync.
//!
//! Every policy mutation, every bulk change to employee records and every
//! sync run is recorded as an [`AuditEntry`]:
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `timestamp` | When the change happened (UTC) |
//! | `actor` | Who made it |
//! | `action` | What was done (see [`actions`]) |
//! | `entity_type` / `entity_id` | What it was done to |
//! | `details` | Free-form JSON |
//! | `success` | Whether the change went through |
//!
//! Entries are stored through an [`AuditStorage`] backend. The file backend
//! writes JSON Lines (one entry per line) and never rewrites past lines.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use idsync_audit::{actions, AuditLogger};
//! use idsync_core::AuditConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let logger = AuditLogger::new(AuditConfig::default())?;
//!
//! logger
//!     .record(
//!         "alice",
//!         actions::ROLE_UPSERT,
//!         "role",
//!         "Engineering",
//!         serde_json::json!({ "google": { "groups": ["eng@example.com"] } }),
//!         true,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod error;
pub mod logger;
pub mod mask;
pub mod storage;

pub use entry::{actions, AuditEntry, AuditEntryBuilder};
pub use error::AuditError;
pub use logger::{AuditFilter, AuditLogger};
pub use mask::mask_email;
pub use storage::{AuditStorage, ConsoleStorage, DualStorage, FileStorage, MemoryStorage, NullStorage};
