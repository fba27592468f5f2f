//! Audit logger implementation.
//!
//! Provides the main `AuditLogger` type used by the policy store, the HR
//! ingestion service and the sync orchestrator.

use chrono::{DateTime, Utc};
use idsync_core::AuditConfig;
use std::sync::Arc;

use crate::entry::AuditEntry;
use crate::error::AuditError;
use crate::mask::mask_email;
use crate::storage::{AuditStorage, DualStorage, FileStorage, MemoryStorage, NullStorage};

/// The main audit logger.
pub struct AuditLogger {
    config: AuditConfig,
    storage: Arc<dyn AuditStorage>,
}

impl AuditLogger {
    /// Create a new audit logger with the given configuration.
    pub fn new(config: AuditConfig) -> Result<Self, AuditError> {
        let storage: Arc<dyn AuditStorage> = if !config.enabled {
            Arc::new(NullStorage::new())
        } else {
            let file_path = config.directory.join("audit.log");

            if config.stdout {
                // Dual output: file + console
                Arc::new(DualStorage::new(&file_path)?)
            } else {
                Arc::new(FileStorage::new(&file_path)?)
            }
        };

        Ok(Self { config, storage })
    }

    /// Create a logger with a custom storage backend.
    pub fn with_storage(config: AuditConfig, storage: Arc<dyn AuditStorage>) -> Self {
        Self { config, storage }
    }

    /// Create a disabled (no-op) logger.
    pub fn disabled() -> Self {
        Self {
            config: AuditConfig {
                enabled: false,
                ..Default::default()
            },
            storage: Arc::new(NullStorage::new()),
        }
    }

    /// Create a logger backed by memory. Returns the storage for inspection.
    pub fn in_memory() -> (Self, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let logger = Self {
            config: AuditConfig::default(),
            storage: storage.clone(),
        };
        (logger, storage)
    }

    /// Check if logging is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Mask an email for inclusion in details, if masking is configured.
    pub fn identity(&self, email: &str) -> String {
        if self.config.mask_emails {
            mask_email(email)
        } else {
            email.to_string()
        }
    }

    /// Log an audit entry.
    pub async fn log(&self, entry: AuditEntry) -> Result<(), AuditError> {
        if !self.config.enabled {
            return Ok(());
        }

        // Also log to tracing for structured logging integration
        tracing::debug!(
            entry_id = %entry.entry_id,
            actor = %entry.actor,
            action = %entry.action,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            success = entry.success,
            "Audit entry"
        );

        self.storage.store(entry).await
    }

    /// Build and log an entry in one call.
    pub async fn record(
        &self,
        actor: &str,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        details: serde_json::Value,
        success: bool,
    ) -> Result<(), AuditError> {
        let entry = AuditEntry::builder(actor, action, entity_type, entity_id)
            .details(details)
            .success(success)
            .build();
        self.log(entry).await
    }

    /// Query audit entries with filters.
    pub async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>, AuditError> {
        self.storage.query(filter).await
    }

    /// Count audit entries matching a filter (ignores limit/offset).
    pub async fn count(&self, filter: AuditFilter) -> Result<usize, AuditError> {
        self.storage.count(filter).await
    }

    /// Get an audit entry by ID.
    pub async fn get(&self, entry_id: uuid::Uuid) -> Result<Option<AuditEntry>, AuditError> {
        self.storage.get(entry_id).await
    }

    /// Most recent entries for an action, newest first.
    pub async fn recent(&self, action: &str, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        self.query(AuditFilter {
            action: Some(action.to_string()),
            limit: Some(limit),
            newest_first: true,
            ..Default::default()
        })
        .await
    }
}

/// Filter for querying audit entries.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Filter by actor.
    pub actor: Option<String>,
    /// Filter by action name.
    pub action: Option<String>,
    /// Filter by entity type.
    pub entity_type: Option<String>,
    /// Filter by entity id.
    pub entity_id: Option<String>,
    /// Filter by outcome.
    pub success: Option<bool>,
    /// Filter by start time.
    pub start_time: Option<DateTime<Utc>>,
    /// Filter by end time.
    pub end_time: Option<DateTime<Utc>>,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Offset for pagination.
    pub offset: Option<usize>,
    /// Return newest entries first (default: insertion order).
    pub newest_first: bool,
}

impl AuditFilter {
    /// Whether an entry passes every predicate (limit/offset excluded).
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(ref actor) = self.actor {
            if &entry.actor != actor {
                return false;
            }
        }
        if let Some(ref action) = self.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(ref entity_type) = self.entity_type {
            if &entry.entity_type != entity_type {
                return false;
            }
        }
        if let Some(ref entity_id) = self.entity_id {
            if &entry.entity_id != entity_id {
                return false;
            }
        }
        if let Some(success) = self.success {
            if entry.success != success {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if entry.timestamp > end {
                return false;
            }
        }
        true
    }

    /// Filter, order and paginate `entries`.
    pub fn apply<'a>(&self, entries: impl Iterator<Item = &'a AuditEntry>) -> Vec<AuditEntry> {
        let mut results: Vec<_> = entries.filter(|e| self.matches(e)).cloned().collect();

        if self.newest_first {
            results.reverse();
        }
        if let Some(offset) = self.offset {
            results = results.into_iter().skip(offset).collect();
        }
        if let Some(limit) = self.limit {
            results.truncate(limit);
        }
        results
    }
}
