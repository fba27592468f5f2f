//! Persistence for sync run records.
//!
//! A run is written once when it starts and once when it completes; a
//! completed run is never written again.

use crate::error::RunStoreError;
use crate::provisioner::write_atomic;
use async_trait::async_trait;
use idsync_core::Run;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Record a run that has just started.
    async fn create(&self, run: &Run) -> Result<(), RunStoreError>;

    /// Record the final state of a run. Fails if the run is unknown or
    /// already complete.
    async fn complete(&self, run: &Run) -> Result<(), RunStoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Run>, RunStoreError>;

    /// Runs newest first.
    async fn list(&self, limit: Option<usize>) -> Result<Vec<Run>, RunStoreError>;
}

fn newest_first(mut runs: Vec<Run>, limit: Option<usize>) -> Vec<Run> {
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    if let Some(limit) = limit {
        runs.truncate(limit);
    }
    runs
}

/// Run store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<Uuid, Run>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create(&self, run: &Run) -> Result<(), RunStoreError> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.id) {
            return Err(RunStoreError::Duplicate(run.id));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn complete(&self, run: &Run) -> Result<(), RunStoreError> {
        let mut runs = self.runs.write().await;
        let existing = runs.get_mut(&run.id).ok_or(RunStoreError::NotFound(run.id))?;
        if existing.is_complete() {
            return Err(RunStoreError::AlreadyCompleted(run.id));
        }
        *existing = run.clone();
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Run>, RunStoreError> {
        Ok(self.runs.read().await.get(&id).cloned())
    }

    async fn list(&self, limit: Option<usize>) -> Result<Vec<Run>, RunStoreError> {
        let runs = self.runs.read().await.values().cloned().collect();
        Ok(newest_first(runs, limit))
    }
}

/// One `<run id>.json` file per run under a directory.
#[derive(Debug)]
pub struct FileRunStore {
    dir: PathBuf,
    // Serializes read-modify-write of a run file.
    lock: tokio::sync::Mutex<()>,
}

impl FileRunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, RunStoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn read(&self, path: &Path) -> Result<Run, RunStoreError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, run: &Run) -> Result<(), RunStoreError> {
        let json = serde_json::to_string_pretty(run)?;
        write_atomic(&self.path_for(run.id), &json)?;
        Ok(())
    }
}

#[async_trait]
impl RunStore for FileRunStore {
    async fn create(&self, run: &Run) -> Result<(), RunStoreError> {
        let _guard = self.lock.lock().await;
        if self.path_for(run.id).exists() {
            return Err(RunStoreError::Duplicate(run.id));
        }
        self.write(run)
    }

    async fn complete(&self, run: &Run) -> Result<(), RunStoreError> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(run.id);
        if !path.exists() {
            return Err(RunStoreError::NotFound(run.id));
        }
        if self.read(&path)?.is_complete() {
            return Err(RunStoreError::AlreadyCompleted(run.id));
        }
        self.write(run)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Run>, RunStoreError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        self.read(&path).map(Some)
    }

    async fn list(&self, limit: Option<usize>) -> Result<Vec<Run>, RunStoreError> {
        let mut runs = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read(&path) {
                Ok(run) => runs.push(run),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable run record");
                }
            }
        }
        Ok(newest_first(runs, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idsync_core::RunSummary;

    async fn exercise(store: &dyn RunStore) {
        let mut first = Run::start("alice", true);
        store.create(&first).await.unwrap();
        assert!(matches!(
            store.create(&first).await,
            Err(RunStoreError::Duplicate(_))
        ));

        let pending = store.get(first.id).await.unwrap().unwrap();
        assert!(!pending.is_complete());

        first.complete(RunSummary::default());
        store.complete(&first).await.unwrap();
        assert!(matches!(
            store.complete(&first).await,
            Err(RunStoreError::AlreadyCompleted(_))
        ));

        let mut second = Run::start("bob", false);
        second.started_at = first.started_at + chrono::Duration::seconds(1);
        store.create(&second).await.unwrap();

        let listed = store.list(None).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert!(listed[1].is_complete());

        assert_eq!(store.list(Some(1)).await.unwrap().len(), 1);
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn in_memory_store_lifecycle() {
        exercise(&InMemoryRunStore::new()).await;
    }

    #[tokio::test]
    async fn file_store_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRunStore::new(dir.path().join("runs")).unwrap();
        exercise(&store).await;

        let reopened = FileRunStore::new(store.dir()).unwrap();
        assert_eq!(reopened.list(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn completing_unknown_run_fails() {
        let store = InMemoryRunStore::new();
        let run = Run::start("alice", true);
        assert!(matches!(
            store.complete(&run).await,
            Err(RunStoreError::NotFound(_))
        ));
    }
}
