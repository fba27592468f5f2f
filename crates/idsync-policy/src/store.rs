//! Versioned policy persistence.
//!
//! The store keeps the active policy behind an `Arc` and never mutates it in
//! place. Every change is made on a cloned draft, written to disk (backup of
//! the previous file first, then an atomic rename), and only then swapped in.
//! A sync run holding a snapshot keeps reading the policy it started with.

use crate::document::{ConditionalRule, Grant, Policy, PolicyUpdate};
use crate::error::PolicyError;
use chrono::Local;
use idsync_audit::{actions, AuditLogger};
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// Outcome of a bulk [`PolicyStore::replace`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub updated_roles: Vec<String>,
    pub rules_count: usize,
    pub backup: Option<PathBuf>,
}

/// File-backed policy document with copy-on-write updates.
pub struct PolicyStore {
    path: PathBuf,
    backup_dir: PathBuf,
    current: RwLock<Arc<Policy>>,
    /// Serializes writers; readers never take it.
    writer: Mutex<()>,
    audit: Arc<AuditLogger>,
}

impl PolicyStore {
    /// Load the document at `path`.
    pub fn open(
        path: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        audit: Arc<AuditLogger>,
    ) -> Result<Self, PolicyError> {
        let path = path.into();
        let policy = load_document(&path)?;
        tracing::info!(
            path = %path.display(),
            roles = policy.roles.len(),
            rules = policy.rules.len(),
            "Loaded policy"
        );
        Ok(Self {
            path,
            backup_dir: backup_dir.into(),
            current: RwLock::new(Arc::new(policy)),
            writer: Mutex::new(()),
            audit,
        })
    }

    /// Load the document at `path`, writing `initial` there first if the
    /// file does not exist yet.
    pub fn open_or_init(
        path: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        initial: Policy,
        audit: Arc<AuditLogger>,
    ) -> Result<Self, PolicyError> {
        let path = path.into();
        if !path.exists() {
            write_atomic(&path, &initial.to_yaml()?)?;
            tracing::info!(path = %path.display(), "Initialized policy document");
        }
        Self::open(path, backup_dir, audit)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The active policy. Cheap; callers keep it for as long as they need a
    /// consistent view.
    pub fn snapshot(&self) -> Result<Arc<Policy>, PolicyError> {
        self.current
            .read()
            .map(|policy| Arc::clone(&policy))
            .map_err(|_| PolicyError::LockPoisoned)
    }

    /// Merge role grants and optionally replace the rule list.
    pub async fn replace(
        &self,
        actor: &str,
        update: PolicyUpdate,
    ) -> Result<UpdateReport, PolicyError> {
        let updated_roles: Vec<String> = update
            .roles
            .as_ref()
            .map(|roles| roles.keys().cloned().collect())
            .unwrap_or_default();
        let details = json!({
            "updated_roles": updated_roles,
            "rules_replaced": update.rules.is_some(),
        });

        let (rules_count, backup) = self
            .mutate(actor, actions::POLICY_UPDATE, "policy", "policy", details, |draft| {
                update.apply_to(draft);
                Ok(draft.rules.len())
            })
            .await?;

        Ok(UpdateReport {
            updated_roles,
            rules_count,
            backup,
        })
    }

    /// Create or replace the grant for one department.
    pub async fn upsert_role(
        &self,
        actor: &str,
        department: &str,
        grant: Grant,
    ) -> Result<(), PolicyError> {
        let details = serde_json::to_value(&grant).unwrap_or_default();
        self.mutate(actor, actions::ROLE_UPSERT, "role", department, details, |draft| {
            draft.roles.insert(department.to_string(), grant);
            Ok(())
        })
        .await
        .map(|_| ())
    }

    /// Remove one department's grant, returning it.
    pub async fn delete_role(&self, actor: &str, department: &str) -> Result<Grant, PolicyError> {
        self.mutate(actor, actions::ROLE_DELETE, "role", department, json!({}), |draft| {
            draft
                .roles
                .remove(department)
                .ok_or_else(|| PolicyError::RoleNotFound(department.to_string()))
        })
        .await
        .map(|(grant, _)| grant)
    }

    /// Append a rule. Returns the number of rules afterwards.
    pub async fn add_rule(&self, actor: &str, rule: ConditionalRule) -> Result<usize, PolicyError> {
        let details = json!({ "when": rule.when, "grant": rule.grant });
        self.mutate(actor, actions::RULE_ADD, "rule", "new", details, |draft| {
            draft.rules.push(rule);
            Ok(draft.rules.len())
        })
        .await
        .map(|(total, _)| total)
    }

    /// Remove the rule at `index`, returning it.
    pub async fn delete_rule(
        &self,
        actor: &str,
        index: usize,
    ) -> Result<ConditionalRule, PolicyError> {
        self.mutate(
            actor,
            actions::RULE_DELETE,
            "rule",
            &index.to_string(),
            json!({}),
            |draft| {
                let len = draft.rules.len();
                if index >= len {
                    return Err(PolicyError::RuleNotFound { index, len });
                }
                Ok(draft.rules.remove(index))
            },
        )
        .await
        .map(|(rule, _)| rule)
    }

    /// Re-read the document from disk and swap it in.
    pub async fn reload(&self, actor: &str) -> Result<Arc<Policy>, PolicyError> {
        let _guard = self.writer.lock().await;
        let entity_id = self.path.display().to_string();

        match load_document(&self.path) {
            Ok(policy) => {
                let policy = Arc::new(policy);
                self.swap(Arc::clone(&policy))?;
                tracing::info!(actor, path = %entity_id, "Policy reloaded");
                self.audit_logged(actor, actions::POLICY_RELOAD, "policy", &entity_id, json!({}), true)
                    .await;
                Ok(policy)
            }
            Err(e) => {
                self.audit_logged(
                    actor,
                    actions::POLICY_RELOAD,
                    "policy",
                    &entity_id,
                    json!({ "error": e.to_string() }),
                    false,
                )
                .await;
                Err(e)
            }
        }
    }

    /// Reload only if the document on disk differs from the active policy,
    /// e.g. after another process saved it. Returns whether it changed.
    pub async fn refresh(&self, actor: &str) -> Result<bool, PolicyError> {
        let on_disk = load_document(&self.path)?;
        if *self.snapshot()? == on_disk {
            return Ok(false);
        }
        self.reload(actor).await?;
        Ok(true)
    }

    /// Apply `change` to a draft copy, persist it, swap it in, audit it.
    ///
    /// A failed change or save leaves the active policy untouched and is
    /// audited with `success = false`.
    async fn mutate<T, F>(
        &self,
        actor: &str,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        mut details: serde_json::Value,
        change: F,
    ) -> Result<(T, Option<PathBuf>), PolicyError>
    where
        F: FnOnce(&mut Policy) -> Result<T, PolicyError>,
    {
        let _guard = self.writer.lock().await;

        let mut draft = (*self.snapshot()?).clone();
        let outcome = change(&mut draft).and_then(|value| {
            draft.validate()?;
            let backup = save_document(&self.path, &self.backup_dir, &draft)?;
            Ok((value, backup))
        });

        match outcome {
            Ok((value, backup)) => {
                self.swap(Arc::new(draft))?;
                tracing::info!(actor, action, entity_id, "Policy updated");
                if let (Some(path), Some(map)) = (&backup, details.as_object_mut()) {
                    map.insert("backup".to_string(), json!(path.display().to_string()));
                }
                self.audit_logged(actor, action, entity_type, entity_id, details, true)
                    .await;
                Ok((value, backup))
            }
            Err(e) => {
                tracing::warn!(actor, action, entity_id, error = %e, "Policy update rejected");
                if let Some(map) = details.as_object_mut() {
                    map.insert("error".to_string(), json!(e.to_string()));
                }
                self.audit_logged(actor, action, entity_type, entity_id, details, false)
                    .await;
                Err(e)
            }
        }
    }

    /// The change (or its rejection) has already happened by the time this
    /// runs, so an audit outage is logged rather than returned.
    async fn audit_logged(
        &self,
        actor: &str,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        details: serde_json::Value,
        success: bool,
    ) {
        if let Err(e) = self
            .audit
            .record(actor, action, entity_type, entity_id, details, success)
            .await
        {
            tracing::error!(actor, action, entity_id, error = %e, "Could not audit policy change");
        }
    }

    fn swap(&self, policy: Arc<Policy>) -> Result<(), PolicyError> {
        let mut current = self.current.write().map_err(|_| PolicyError::LockPoisoned)?;
        *current = policy;
        Ok(())
    }
}

/// Read and validate a policy document.
pub fn load_document(path: &Path) -> Result<Policy, PolicyError> {
    let content = fs::read_to_string(path)?;
    Policy::from_yaml(&content)
}

/// Write `policy` to `path`, first copying any existing file to a
/// timestamped backup in `backup_dir`. Returns the backup path, if any.
pub fn save_document(
    path: &Path,
    backup_dir: &Path,
    policy: &Policy,
) -> Result<Option<PathBuf>, PolicyError> {
    let yaml = policy.to_yaml()?;

    let backup = if path.exists() {
        if !backup_dir.as_os_str().is_empty() {
            fs::create_dir_all(backup_dir)?;
        }
        let target = backup_path(path, backup_dir);
        fs::copy(path, &target)?;
        tracing::debug!(backup = %target.display(), "Backed up policy");
        Some(target)
    } else {
        None
    };

    write_atomic(path, &yaml)?;
    Ok(backup)
}

/// `<dir>/<file>.bak.<YYYYmmdd_HHMMSS>`, with `.N` appended if taken.
fn backup_path(path: &Path, backup_dir: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "policy.yaml".to_string());
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let base = backup_dir.join(format!("{file_name}.bak.{stamp}"));

    let mut candidate = base.clone();
    let mut n = 1;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{}.{n}", base.display()));
        n += 1;
    }
    candidate
}

/// Write to a sibling temp file and rename over `path`, so readers see
/// either the old or the new document, never a partial one.
fn write_atomic(path: &Path, content: &str) -> Result<(), PolicyError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "policy.yaml".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    let mut file = fs::File::create(&tmp)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use idsync_audit::AuditFilter;

    const INITIAL: &str = r#"
roles:
  Engineering:
    google:
      groups: [eng@example.com]
rules:
  - when: location == "Remote"
    grant:
      github:
        teams: [remote-access]
"#;

    fn store_in(dir: &Path) -> (PolicyStore, Arc<idsync_audit::MemoryStorage>) {
        let path = dir.join("policy.yaml");
        fs::write(&path, INITIAL).unwrap();
        let (logger, storage) = AuditLogger::in_memory();
        let store = PolicyStore::open(&path, dir.join("backups"), Arc::new(logger)).unwrap();
        (store, storage)
    }

    fn backups(dir: &Path) -> usize {
        fs::read_dir(dir.join("backups"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn upsert_role_persists_and_backs_up() {
        let dir = tempfile::tempdir().unwrap();
        let (store, audit) = store_in(dir.path());

        store
            .upsert_role(
                "alice",
                "Sales",
                Grant::new().with("google", "groups", &["sales@example.com"]),
            )
            .await
            .unwrap();

        assert!(store.snapshot().unwrap().roles.contains_key("Sales"));
        let on_disk = load_document(store.path()).unwrap();
        assert!(on_disk.roles.contains_key("Sales"));
        assert_eq!(backups(dir.path()), 1);

        let entries = audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, actions::ROLE_UPSERT);
        assert_eq!(entries[0].entity_id, "Sales");
        assert!(entries[0].success);
        assert!(entries[0].details["backup"].is_string());
    }

    #[tokio::test]
    async fn every_save_gets_its_own_backup() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());

        for i in 0..3 {
            store
                .add_rule(
                    "alice",
                    ConditionalRule::new(format!("title == 'T{i}'"), Grant::new()),
                )
                .await
                .unwrap();
        }

        assert_eq!(backups(dir.path()), 3);
        assert_eq!(store.snapshot().unwrap().rules.len(), 4);
    }

    #[tokio::test]
    async fn snapshots_are_not_affected_by_later_writes() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());

        let before = store.snapshot().unwrap();
        store.delete_role("alice", "Engineering").await.unwrap();

        assert!(before.roles.contains_key("Engineering"));
        assert!(!store.snapshot().unwrap().roles.contains_key("Engineering"));
    }

    #[tokio::test]
    async fn deleting_missing_role_fails_and_is_audited() {
        let dir = tempfile::tempdir().unwrap();
        let (store, audit) = store_in(dir.path());

        let err = store.delete_role("alice", "Legal").await.unwrap_err();
        assert!(matches!(err, PolicyError::RoleNotFound(ref d) if d == "Legal"));

        assert_eq!(backups(dir.path()), 0);
        let entries = audit.entries();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].success);
    }

    #[tokio::test]
    async fn delete_rule_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());

        let err = store.delete_rule("alice", 5).await.unwrap_err();
        assert!(matches!(err, PolicyError::RuleNotFound { index: 5, len: 1 }));

        let removed = store.delete_rule("alice", 0).await.unwrap();
        assert_eq!(removed.when, r#"location == "Remote""#);
        assert!(store.snapshot().unwrap().rules.is_empty());
    }

    #[tokio::test]
    async fn replace_merges_roles() {
        let dir = tempfile::tempdir().unwrap();
        let (store, audit) = store_in(dir.path());

        let report = store
            .replace(
                "alice",
                PolicyUpdate {
                    roles: Some(
                        [(
                            "Sales".to_string(),
                            Grant::new().with("google", "groups", &["sales@example.com"]),
                        )]
                        .into(),
                    ),
                    rules: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(report.updated_roles, ["Sales"]);
        assert_eq!(report.rules_count, 1);
        assert!(report.backup.is_some());
        let policy = store.snapshot().unwrap();
        assert!(policy.roles.contains_key("Engineering"));
        assert!(policy.roles.contains_key("Sales"));

        let filter = AuditFilter {
            action: Some(actions::POLICY_UPDATE.to_string()),
            ..Default::default()
        };
        let logged = audit.entries().iter().filter(|e| filter.matches(e)).count();
        assert_eq!(logged, 1);
    }

    #[tokio::test]
    async fn invalid_update_leaves_policy_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());

        let err = store
            .upsert_role("alice", "Ops", Grant::new().with("google", "groups", &[" "]))
            .await
            .unwrap_err();

        assert!(matches!(err, PolicyError::Invalid(_)));
        assert!(!store.snapshot().unwrap().roles.contains_key("Ops"));
        assert!(!load_document(store.path()).unwrap().roles.contains_key("Ops"));
    }

    #[tokio::test]
    async fn reload_picks_up_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());

        fs::write(store.path(), "roles: {}\n").unwrap();
        let policy = store.reload("ops").await.unwrap();
        assert!(policy.roles.is_empty());

        fs::write(store.path(), "roles: [broken").unwrap();
        assert!(store.reload("ops").await.is_err());
        assert!(store.snapshot().unwrap().roles.is_empty());
    }

    #[tokio::test]
    async fn refresh_only_swaps_when_file_changed() {
        let dir = tempfile::tempdir().unwrap();
        let (store, audit) = store_in(dir.path());

        assert!(!store.refresh("scheduler").await.unwrap());
        assert!(audit.entries().is_empty());

        let other = PolicyStore::open(store.path(), dir.path().join("backups"), Arc::new(AuditLogger::disabled()))
            .unwrap();
        other.delete_role("cli", "Engineering").await.unwrap();

        assert!(store.refresh("scheduler").await.unwrap());
        assert!(!store.snapshot().unwrap().roles.contains_key("Engineering"));
        assert_eq!(audit.entries()[0].action, actions::POLICY_RELOAD);
    }

    #[tokio::test]
    async fn audit_outage_does_not_fail_a_saved_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        fs::write(&path, INITIAL).unwrap();

        let audit_dir = dir.path().join("audit");
        let storage = idsync_audit::FileStorage::new(audit_dir.join("audit.log")).unwrap();
        // Replace the log directory with a file so every append fails.
        fs::remove_dir_all(&audit_dir).unwrap();
        fs::write(&audit_dir, "").unwrap();
        let logger = AuditLogger::with_storage(Default::default(), Arc::new(storage));
        let store = PolicyStore::open(&path, dir.path().join("backups"), Arc::new(logger)).unwrap();

        store
            .upsert_role("alice", "Sales", Grant::new().with("google", "groups", &["sales@example.com"]))
            .await
            .unwrap();

        assert!(store.snapshot().unwrap().roles.contains_key("Sales"));
        assert!(load_document(&path).unwrap().roles.contains_key("Sales"));
    }

    #[test]
    fn open_rejects_malformed_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        fs::write(&path, "rules: {not: [a, list").unwrap();

        let result = PolicyStore::open(&path, dir.path(), Arc::new(AuditLogger::disabled()));
        assert!(matches!(result, Err(PolicyError::Yaml(_))));
    }

    #[test]
    fn open_or_init_writes_initial_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("policy.yaml");

        let store = PolicyStore::open_or_init(
            &path,
            dir.path(),
            Policy::default(),
            Arc::new(AuditLogger::disabled()),
        )
        .unwrap();

        assert!(path.exists());
        assert_eq!(*store.snapshot().unwrap(), Policy::default());
    }

    #[test]
    fn backup_names_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        fs::write(&path, "roles: {}\n").unwrap();

        let first = save_document(&path, dir.path(), &Policy::default()).unwrap().unwrap();
        let second = save_document(&path, dir.path(), &Policy::default()).unwrap().unwrap();

        assert_ne!(first, second);
        assert!(first.file_name().unwrap().to_string_lossy().starts_with("policy.yaml.bak."));
    }
}
