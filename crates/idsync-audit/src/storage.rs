//! Audit storage backends.

use crate::entry::AuditEntry;
use crate::error::AuditError;
use crate::logger::AuditFilter;
use async_trait::async_trait;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use uuid::Uuid;

/// Trait for audit storage backends.
///
/// Backends only ever append; there is no update or delete.
#[async_trait]
pub trait AuditStorage: Send + Sync {
    /// Store an audit entry.
    async fn store(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// Query audit entries with filters.
    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>, AuditError>;

    /// Count entries matching a filter (ignores limit/offset).
    async fn count(&self, filter: AuditFilter) -> Result<usize, AuditError>;

    /// Get an audit entry by ID.
    async fn get(&self, entry_id: Uuid) -> Result<Option<AuditEntry>, AuditError>;
}

/// Discards everything.
#[derive(Default)]
pub struct NullStorage;

impl NullStorage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditStorage for NullStorage {
    async fn store(&self, _entry: AuditEntry) -> Result<(), AuditError> {
        Ok(())
    }

    async fn query(&self, _filter: AuditFilter) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(vec![])
    }

    async fn count(&self, _filter: AuditFilter) -> Result<usize, AuditError> {
        Ok(0)
    }

    async fn get(&self, _entry_id: Uuid) -> Result<Option<AuditEntry>, AuditError> {
        Ok(None)
    }
}

/// Console storage (human-readable lines on stdout).
#[derive(Default)]
pub struct ConsoleStorage;

impl ConsoleStorage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditStorage for ConsoleStorage {
    async fn store(&self, entry: AuditEntry) -> Result<(), AuditError> {
        println!("{}", entry.to_log_line());
        Ok(())
    }

    async fn query(&self, _filter: AuditFilter) -> Result<Vec<AuditEntry>, AuditError> {
        // Console storage doesn't support querying
        Ok(vec![])
    }

    async fn count(&self, _filter: AuditFilter) -> Result<usize, AuditError> {
        Ok(0)
    }

    async fn get(&self, _entry_id: Uuid) -> Result<Option<AuditEntry>, AuditError> {
        Ok(None)
    }
}

/// In-memory storage, used by tests and embedded setups.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored entry in insertion order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditStorage for MemoryStorage {
    async fn store(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries
            .write()
            .map_err(|e| AuditError::Poisoned(e.to_string()))?
            .push(entry);
        Ok(())
    }

    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.read().map_err(|e| {
            AuditError::Poisoned(e.to_string())
        })?;
        Ok(filter.apply(entries.iter()))
    }

    async fn count(&self, filter: AuditFilter) -> Result<usize, AuditError> {
        let entries = self.entries.read().map_err(|e| {
            AuditError::Poisoned(e.to_string())
        })?;
        Ok(entries.iter().filter(|e| filter.matches(e)).count())
    }

    async fn get(&self, entry_id: Uuid) -> Result<Option<AuditEntry>, AuditError> {
        let entries = self.entries.read().map_err(|e| {
            AuditError::Poisoned(e.to_string())
        })?;
        Ok(entries.iter().find(|e| e.entry_id == entry_id).cloned())
    }
}

/// File storage: appends JSON Lines to `audit.log`.
///
/// Existing entries are loaded on construction so queries cover history
/// written by earlier processes.
pub struct FileStorage {
    path: PathBuf,
    cache: MemoryStorage,
}

impl FileStorage {
    /// Open (or create) the log at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let cache = MemoryStorage::new();
        {
            let mut entries = cache
                .entries
                .write()
                .map_err(|e| AuditError::Open(e.to_string()))?;
            entries.extend(Self::load_from_file(&path)?);
        }

        Ok(Self { path, cache })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_file(path: &Path) -> Result<Vec<AuditEntry>, AuditError> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(path)?);
        let mut entries = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse audit entry on line {} of {}: {}",
                        line_num + 1,
                        path.display(),
                        e
                    );
                }
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl AuditStorage for FileStorage {
    async fn store(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let json = serde_json::to_string(&entry)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", json)?;

        self.cache.store(entry).await
    }

    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>, AuditError> {
        self.cache.query(filter).await
    }

    async fn count(&self, filter: AuditFilter) -> Result<usize, AuditError> {
        self.cache.count(filter).await
    }

    async fn get(&self, entry_id: Uuid) -> Result<Option<AuditEntry>, AuditError> {
        self.cache.get(entry_id).await
    }
}

/// File storage that also echoes every entry to the console.
pub struct DualStorage {
    file: FileStorage,
    console: ConsoleStorage,
}

impl DualStorage {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        Ok(Self {
            file: FileStorage::new(path)?,
            console: ConsoleStorage::new(),
        })
    }
}

#[async_trait]
impl AuditStorage for DualStorage {
    async fn store(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.console.store(entry.clone()).await?;
        self.file.store(entry).await
    }

    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>, AuditError> {
        self.file.query(filter).await
    }

    async fn count(&self, filter: AuditFilter) -> Result<usize, AuditError> {
        self.file.count(filter).await
    }

    async fn get(&self, entry_id: Uuid) -> Result<Option<AuditEntry>, AuditError> {
        self.file.get(entry_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::actions;

    #[tokio::test]
    async fn test_console_storage() {
        let storage = ConsoleStorage;
        let entry = AuditEntry::new("system", actions::SYNC_RUN, "run", "1");

        // Should not error
        storage.store(entry).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_storage_appends_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.log");

        {
            let storage = FileStorage::new(&path).unwrap();
            storage
                .store(AuditEntry::new("alice", actions::ROLE_UPSERT, "role", "Engineering"))
                .await
                .unwrap();
            storage
                .store(AuditEntry::new("bob", actions::RULE_ADD, "rule", "0"))
                .await
                .unwrap();
        }

        let reopened = FileStorage::new(&path).unwrap();
        let all = reopened.query(AuditFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let filter = AuditFilter {
            actor: Some("alice".to_string()),
            ..Default::default()
        };
        let results = reopened.query(filter.clone()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entity_id, "Engineering");
        assert_eq!(reopened.count(filter).await.unwrap(), 1);

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_file_storage_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let good = AuditEntry::new("alice", actions::RULE_ADD, "rule", "0");
        fs::write(
            &path,
            format!("{}\nnot json\n\n", serde_json::to_string(&good).unwrap()),
        )
        .unwrap();

        let storage = FileStorage::new(&path).unwrap();
        assert_eq!(storage.count(AuditFilter::default()).await.unwrap(), 1);
        assert!(storage.get(good.entry_id).await.unwrap().is_some());
    }
}
