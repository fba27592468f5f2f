//! CLI command implementations.

pub mod audit;
pub mod hr;
pub mod policy;
pub mod serve;
pub mod sync;

use anyhow::{Context, Result};
use idsync_audit::AuditLogger;
use idsync_core::IdsyncConfig;
use idsync_policy::{Policy, PolicyStore};
use idsync_runtime::{
    FileRunStore, HrIngestService, LocalDirectory, LocalProvisioner, ProvisionerAdapter, SyncOrchestrator,
    SyncTrigger,
};
use std::sync::Arc;

/// Services shared by every command, built once from configuration.
pub struct App {
    pub config: IdsyncConfig,
    pub audit: Arc<AuditLogger>,
    pub policy: Arc<PolicyStore>,
    pub directory: Arc<LocalDirectory>,
    pub runs: Arc<FileRunStore>,
}

impl App {
    pub fn new(config: IdsyncConfig) -> Result<Self> {
        let audit = Arc::new(AuditLogger::new(config.audit.clone()).context("initializing audit log")?);
        let policy = PolicyStore::open_or_init(
            &config.policy_path,
            config.backup_dir(),
            Policy::default(),
            audit.clone(),
        )
        .with_context(|| format!("opening policy {}", config.policy_path.display()))?;
        let directory = LocalDirectory::open(&config.employees_path)
            .with_context(|| format!("opening employee records {}", config.employees_path.display()))?;
        let runs = FileRunStore::new(&config.runs_dir)
            .with_context(|| format!("opening run store {}", config.runs_dir.display()))?;

        Ok(Self {
            config,
            audit,
            policy: Arc::new(policy),
            directory: Arc::new(directory),
            runs: Arc::new(runs),
        })
    }

    pub fn actor(&self, actor: Option<String>) -> String {
        actor.unwrap_or_else(|| self.config.actor.clone())
    }

    pub fn adapters(&self) -> Result<Vec<Arc<dyn ProvisionerAdapter>>> {
        self.config
            .provisioners
            .iter()
            .map(|p| {
                if p.state_path.is_none() {
                    tracing::debug!(system = %p.system, "No state_path configured, provisioner state is in-memory");
                }
                let adapter = LocalProvisioner::from_config(p)
                    .with_context(|| format!("loading provisioner '{}'", p.system))?;
                Ok(Arc::new(adapter) as Arc<dyn ProvisionerAdapter>)
            })
            .collect()
    }

    pub fn orchestrator(&self) -> Result<SyncOrchestrator> {
        Ok(SyncOrchestrator::new(
            self.policy.clone(),
            self.directory.clone(),
            self.adapters()?,
            self.runs.clone(),
            self.audit.clone(),
            self.config.sync.clone(),
        ))
    }

    pub fn ingest(&self, trigger: SyncTrigger) -> HrIngestService {
        HrIngestService::new(self.directory.clone(), self.audit.clone(), trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idsync_core::AuditConfig;

    #[test]
    fn app_initializes_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = IdsyncConfig {
            policy_path: dir.path().join("policy.yaml"),
            runs_dir: dir.path().join("runs"),
            employees_path: dir.path().join("employees.json"),
            audit: AuditConfig {
                enabled: false,
                ..AuditConfig::default()
            },
            ..IdsyncConfig::default()
        };

        let app = App::new(config).unwrap();

        assert!(dir.path().join("policy.yaml").exists());
        assert!(dir.path().join("runs").is_dir());
        assert_eq!(app.adapters().unwrap().len(), 2);
        assert_eq!(app.actor(None), "system");
        assert_eq!(app.actor(Some("alice".into())), "alice");
    }
}
