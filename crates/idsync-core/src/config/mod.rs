//! Configuration types for idsync.
//!
//! Configuration is loaded from a single YAML file (`idsync.yaml`). Every
//! section has defaults, so an empty file is a valid configuration. Relative
//! paths are resolved against the directory containing the file when loaded
//! through [`IdsyncConfig::load_with_context`].

pub mod audit;
pub mod provisioner;
pub mod sync;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use audit::AuditConfig;
pub use provisioner::ProvisionerConfig;
pub use sync::SyncConfig;

/// Complete idsync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdsyncConfig {
    /// Path to the policy document.
    #[serde(default = "default_policy_path")]
    pub policy_path: PathBuf,

    /// Where policy backups are written (defaults to the policy's directory).
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// Directory holding run records.
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,

    /// HR snapshot read by the CLI (JSON array of employee records).
    #[serde(default = "default_employees_path")]
    pub employees_path: PathBuf,

    /// Actor recorded on runs and audit entries when none is given.
    #[serde(default = "default_actor")]
    pub actor: String,

    /// Default tracing filter (overridden by `RUST_LOG`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Audit logging configuration.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Orchestrator and scheduler tuning.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Target systems.
    #[serde(default = "provisioner::default_provisioners")]
    pub provisioners: Vec<ProvisionerConfig>,
}

impl Default for IdsyncConfig {
    fn default() -> Self {
        Self {
            policy_path: default_policy_path(),
            backup_dir: None,
            runs_dir: default_runs_dir(),
            employees_path: default_employees_path(),
            actor: default_actor(),
            log_level: default_log_level(),
            audit: AuditConfig::default(),
            sync: SyncConfig::default(),
            provisioners: provisioner::default_provisioners(),
        }
    }
}

fn default_policy_path() -> PathBuf {
    PathBuf::from("policy.yaml")
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from(".idsync/runs")
}

fn default_employees_path() -> PathBuf {
    PathBuf::from("employees.json")
}

fn default_actor() -> String {
    "system".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IdsyncConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // serde_yaml reads an empty document as unit, not as an empty mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration and resolve relative paths against the file's directory.
    pub fn load_with_context(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = Self::from_file(path)?;

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        config.policy_path = resolve(&base_dir, &config.policy_path);
        config.runs_dir = resolve(&base_dir, &config.runs_dir);
        config.employees_path = resolve(&base_dir, &config.employees_path);
        config.audit.directory = resolve(&base_dir, &config.audit.directory);
        if let Some(dir) = &config.backup_dir {
            config.backup_dir = Some(resolve(&base_dir, dir));
        }
        for provisioner in &mut config.provisioners {
            if let Some(state) = &provisioner.state_path {
                provisioner.state_path = Some(resolve(&base_dir, state));
            }
        }

        Ok(config)
    }

    /// Directory policy backups go to.
    pub fn backup_dir(&self) -> PathBuf {
        match &self.backup_dir {
            Some(dir) => dir.clone(),
            None => self
                .policy_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    pub fn get_provisioner(&self, system: &str) -> Option<&ProvisionerConfig> {
        self.provisioners.iter().find(|p| p.system == system)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.concurrency == 0 {
            return Err(ConfigError::Config(
                "sync.concurrency must be at least 1".to_string(),
            ));
        }
        if self.sync.schedule_interval_secs == 0 {
            return Err(ConfigError::Config(
                "sync.schedule_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.sync.provisioner_timeout_ms == 0 {
            return Err(ConfigError::Config(
                "sync.provisioner_timeout_ms must be at least 1".to_string(),
            ));
        }
        let mut seen = std::collections::BTreeSet::new();
        for provisioner in &self.provisioners {
            if !seen.insert(provisioner.system.as_str()) {
                return Err(ConfigError::Config(format!(
                    "provisioner '{}' is configured more than once",
                    provisioner.system
                )));
            }
        }
        Ok(())
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
